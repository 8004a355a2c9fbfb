use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use health_referral::config::{has_flag, Config, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print!("{USAGE}");
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let mut config = Config::from_env()?;
    config.apply_args(&args)?;

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "health_referral starting: RUST_LOG='{}', http_port={}, store={:?}, production={}",
        rust_log, config.http_port, config.store, config.is_production()
    );

    health_referral::server::run(config).await
}
