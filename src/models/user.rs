use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ParseEnumError;

/// Closed set of roles a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    /// Community health volunteer.
    Chv,
    Clinician,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Chv => "chv",
            Role::Clinician => "clinician",
            Role::Admin => "admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "chv" | "community_health_volunteer" => Ok(Role::Chv),
            "clinician" => Ok(Role::Clinician),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError { kind: "role", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted login session. The token is the bearer credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Read-time expiry check, no grace period.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

/// Insert shape for [`Session`]; the store assigns id and creation time.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring(at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: "t".into(),
            expires_at: at,
            user_agent: None,
            ip_address: None,
            created_at: at - Duration::days(30),
        }
    }

    #[test]
    fn session_expiry_boundaries() {
        let now = Utc::now();
        assert!(!session_expiring(now + Duration::hours(24)).is_expired_at(now));
        assert!(!session_expiring(now + Duration::minutes(1)).is_expired_at(now));
        assert!(session_expiring(now - Duration::hours(24)).is_expired_at(now));
        // expiry instant itself is already expired
        assert!(session_expiring(now).is_expired_at(now));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Patient, Role::Chv, Role::Clinician, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("CHV".parse::<Role>().unwrap(), Role::Chv);
        assert_eq!(serde_json::to_value(Role::Clinician).unwrap(), serde_json::json!("clinician"));
    }

    #[test]
    fn unknown_role_reports_kind_and_value() {
        let err = "Nurse".parse::<Role>().unwrap_err();
        assert_eq!(err, ParseEnumError { kind: "role", value: "nurse".to_string() });
        assert_eq!(err.to_string(), "invalid role 'nurse'");
        let _: &dyn std::error::Error = &err;
    }
}
