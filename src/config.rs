//! Start-up configuration.
//!
//! Built once from environment variables, then overridden by command-line
//! flags, and passed down explicitly. Nothing reads the environment after
//! start-up.
//!
//! | variable                        | default                         |
//! |---------------------------------|---------------------------------|
//! | `ENVIRONMENT` / `HEALTH_ENV`    | `development`                   |
//! | `HEALTH_HTTP_PORT` / `PORT`     | `8080`                          |
//! | `HEALTH_STORE`                  | `postgres` if a URL is set, else `memory` |
//! | `HEALTH_DATABASE_URL` / `DATABASE_URL` | unset                    |
//! | `SESSION_DURATION_HOURS`        | `720`                           |
//! | `HEALTH_LOGIN_POLICY`           | `auto_provision`                |
//! | `HEALTH_STORE_TIMEOUT_SECS`     | `5`                             |
//! | `HEALTH_SESSION_SWEEP_SECS`     | `300`                           |
//! | `HEALTH_LOGIN_RATE_LIMIT`       | `10`                            |
//! | `HEALTH_LOGIN_RATE_WINDOW_SECS` | `60`                            |
//! | `HEALTH_FACILITIES_FILE`        | unset                           |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },

    #[error("missing value for flag {0}")]
    MissingFlagValue(String),

    #[error("the postgres store requires DATABASE_URL or --database-url")]
    MissingDatabaseUrl,
}

/// What to do when an unknown phone number logs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginPolicy {
    /// Create a `patient` user on first login.
    #[default]
    AutoProvision,
    /// Only explicitly registered users may log in.
    RequireRegistration,
}

impl FromStr for LoginPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto_provision" | "auto-provision" | "auto" => Ok(LoginPolicy::AutoProvision),
            "require_registration" | "require-registration" | "registered" => Ok(LoginPolicy::RequireRegistration),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub environment: String,
    pub http_port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub session_duration: Duration,
    pub login_policy: LoginPolicy,
    pub store_timeout: Duration,
    pub session_sweep_interval: Duration,
    pub login_rate_limit: u32,
    pub login_rate_window: Duration,
    /// JSON array of facilities loaded into the memory store at start-up.
    pub facilities_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            http_port: 8080,
            store: StoreBackend::Memory,
            database_url: None,
            session_duration: Duration::from_secs(720 * 3600),
            login_policy: LoginPolicy::AutoProvision,
            store_timeout: Duration::from_secs(5),
            session_sweep_interval: Duration::from_secs(300),
            login_rate_limit: 10,
            login_rate_window: Duration::from_secs(60),
            facilities_file: None,
        }
    }
}

/// Upper bound on session lifetime: ten years.
pub const MAX_SESSION_HOURS: u64 = 10 * 365 * 24;

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key: key.to_string(), value: raw.to_string() })
}

/// Value following `flag` in `args`, if the flag is present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, ConfigError> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return match args.get(i + 1) {
                Some(v) if !v.starts_with("--") => Ok(Some(v.as_str())),
                _ => Err(ConfigError::MissingFlagValue(flag.to_string())),
            };
        }
        i += 1;
    }
    Ok(None)
}

pub fn has_flag(args: &[String], flag: &str) -> bool { args.iter().any(|a| a == flag) }

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<(String, String)> {
            keys.iter().find_map(|k| lookup(k).filter(|v| !v.trim().is_empty()).map(|v| (k.to_string(), v)))
        };
        let mut cfg = Config::default();

        if let Some((_, v)) = get(&["HEALTH_ENV", "ENVIRONMENT"]) {
            cfg.environment = v.trim().to_string();
        }
        if let Some((k, v)) = get(&["HEALTH_HTTP_PORT", "PORT"]) {
            cfg.http_port = parse_value(&k, &v)?;
        }
        cfg.database_url = get(&["HEALTH_DATABASE_URL", "DATABASE_URL"]).map(|(_, v)| v);
        cfg.store = match get(&["HEALTH_STORE"]) {
            Some((k, v)) => parse_value(&k, &v)?,
            None if cfg.database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        if let Some((k, v)) = get(&["HEALTH_SESSION_DURATION_HOURS", "SESSION_DURATION_HOURS"]) {
            let hours: u64 = parse_value(&k, &v)?;
            if hours == 0 || hours > MAX_SESSION_HOURS {
                return Err(ConfigError::Invalid { key: k, value: v });
            }
            cfg.session_duration = Duration::from_secs(hours * 3600);
        }
        if let Some((k, v)) = get(&["HEALTH_LOGIN_POLICY"]) {
            cfg.login_policy = parse_value(&k, &v)?;
        }
        if let Some((k, v)) = get(&["HEALTH_STORE_TIMEOUT_SECS"]) {
            let secs: u64 = parse_value(&k, &v)?;
            if secs == 0 {
                return Err(ConfigError::Invalid { key: k, value: v });
            }
            cfg.store_timeout = Duration::from_secs(secs);
        }
        if let Some((k, v)) = get(&["HEALTH_SESSION_SWEEP_SECS"]) {
            cfg.session_sweep_interval = Duration::from_secs(parse_value(&k, &v)?);
        }
        if let Some((k, v)) = get(&["HEALTH_LOGIN_RATE_LIMIT"]) {
            cfg.login_rate_limit = parse_value(&k, &v)?;
        }
        if let Some((k, v)) = get(&["HEALTH_LOGIN_RATE_WINDOW_SECS"]) {
            let secs: u64 = parse_value(&k, &v)?;
            if secs == 0 {
                return Err(ConfigError::Invalid { key: k, value: v });
            }
            cfg.login_rate_window = Duration::from_secs(secs);
        }
        cfg.facilities_file = get(&["HEALTH_FACILITIES_FILE"]).map(|(_, v)| PathBuf::from(v));
        cfg.validate()?;
        Ok(cfg)
    }

    /// Command-line flags override the environment.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        if let Some(v) = flag_value(args, "--http-port")? {
            self.http_port = parse_value("--http-port", v)?;
        }
        if let Some(v) = flag_value(args, "--database-url")? {
            self.database_url = Some(v.to_string());
            self.store = StoreBackend::Postgres;
        }
        if let Some(v) = flag_value(args, "--store")? {
            self.store = parse_value("--store", v)?;
        }
        if let Some(v) = flag_value(args, "--facilities")? {
            self.facilities_file = Some(PathBuf::from(v));
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store == StoreBackend::Postgres && self.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool { self.environment.eq_ignore_ascii_case("production") }
}

pub const USAGE: &str = "health_referral\n\nUSAGE:\n  health_referral [--http-port N] [--store memory|postgres] [--database-url URL] [--facilities FILE]\n\nOPTIONS:\n  --http-port N         HTTP API port (env: HEALTH_HTTP_PORT or PORT, default 8080)\n  --store KIND          memory or postgres (env: HEALTH_STORE)\n  --database-url URL    PostgreSQL connection string (env: DATABASE_URL); selects postgres\n  --facilities FILE     JSON facilities to load into the memory store (env: HEALTH_FACILITIES_FILE)\n";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    fn args(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn defaults() {
        let c = cfg_from(&[]).unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.session_duration, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(c.login_policy, LoginPolicy::AutoProvision);
        assert!(!c.is_production());
    }

    #[test]
    fn env_values() {
        let c = cfg_from(&[
            ("ENVIRONMENT", "production"),
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://u:p@localhost/health"),
            ("SESSION_DURATION_HOURS", "24"),
            ("HEALTH_LOGIN_POLICY", "require_registration"),
            ("HEALTH_LOGIN_RATE_LIMIT", "3"),
        ])
        .unwrap();
        assert!(c.is_production());
        assert_eq!(c.http_port, 9000);
        assert_eq!(c.store, StoreBackend::Postgres);
        assert_eq!(c.session_duration, Duration::from_secs(24 * 3600));
        assert_eq!(c.login_policy, LoginPolicy::RequireRegistration);
        assert_eq!(c.login_rate_limit, 3);
    }

    #[test]
    fn prefixed_port_wins_and_empty_is_unset() {
        let c = cfg_from(&[("HEALTH_HTTP_PORT", "7000"), ("PORT", "9000"), ("DATABASE_URL", " ")]).unwrap();
        assert_eq!(c.http_port, 7000);
        assert_eq!(c.store, StoreBackend::Memory);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert_eq!(
            cfg_from(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT".into(), value: "eighty".into() })
        );
        assert!(matches!(cfg_from(&[("SESSION_DURATION_HOURS", "0")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(cfg_from(&[("SESSION_DURATION_HOURS", "100000000000")]), Err(ConfigError::Invalid { .. })));
        let max = MAX_SESSION_HOURS.to_string();
        assert_eq!(cfg_from(&[("SESSION_DURATION_HOURS", max.as_str())]).unwrap().session_duration.as_secs(), MAX_SESSION_HOURS * 3600);
        assert!(matches!(
            cfg_from(&[("SESSION_DURATION_HOURS", (MAX_SESSION_HOURS + 1).to_string().as_str())]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(cfg_from(&[("HEALTH_LOGIN_POLICY", "sometimes")]), Err(ConfigError::Invalid { .. })));
        assert_eq!(cfg_from(&[("HEALTH_STORE", "postgres")]), Err(ConfigError::MissingDatabaseUrl));
    }

    #[test]
    fn flags_override_env() {
        let mut c = cfg_from(&[("PORT", "9000")]).unwrap();
        c.apply_args(&args(&["bin", "--http-port", "8181", "--database-url", "postgres://x/y"])).unwrap();
        assert_eq!(c.http_port, 8181);
        assert_eq!(c.store, StoreBackend::Postgres);

        c.apply_args(&args(&["bin", "--store", "memory"])).unwrap();
        assert_eq!(c.store, StoreBackend::Memory);

        assert_eq!(
            c.apply_args(&args(&["bin", "--http-port"])),
            Err(ConfigError::MissingFlagValue("--http-port".into()))
        );
        assert!(has_flag(&args(&["bin", "--help"]), "--help"));
    }
}
