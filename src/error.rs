//! Unified application error model and the HTTP mapping.
//! Component errors convert into [`AppError`] with `From`; handlers return
//! `AppResult<T>` and axum renders the failure envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::error;

use crate::facility::FacilityError;
use crate::identity::AuthError;
use crate::patients::PatientError;
use crate::store::StoreError;
use crate::triage::TriageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    RateLimited { code: String, message: String },
    Store { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::RateLimited { code, .. }
            | AppError::Store { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::RateLimited { message, .. }
            | AppError::Store { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn rate_limited<S: Into<String>>(code: S, msg: S) -> Self { AppError::RateLimited { code: code.into(), message: msg.into() } }
    pub fn store<S: Into<String>>(code: S, msg: S) -> Self { AppError::Store { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::RateLimited { .. } => 429,
            AppError::Store { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }

    /// Failure envelope sent to clients.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": { "code": self.code_str(), "message": self.message() },
        })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.envelope())).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        // detail stays in the log; clients only see the code
        error!(target: "http", "store failure: {err}");
        match err {
            StoreError::Timeout(_) => AppError::store("STORE_TIMEOUT", "storage did not respond in time"),
            StoreError::Conflict(_)
            | StoreError::MissingReference(_)
            | StoreError::Decode(_)
            | StoreError::Backend(_) => {
                AppError::store("STORE_ERROR", "storage failure")
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let msg = err.to_string();
        match err {
            AuthError::MissingToken => AppError::auth("MISSING_TOKEN", msg.as_str()),
            AuthError::MalformedHeader => AppError::auth("INVALID_TOKEN_FORMAT", msg.as_str()),
            AuthError::SessionNotFound => AppError::auth("SESSION_NOT_FOUND", msg.as_str()),
            AuthError::SessionExpired => AppError::auth("SESSION_EXPIRED", msg.as_str()),
            AuthError::UserInactive => AppError::auth("USER_INACTIVE", msg.as_str()),
            AuthError::UserNotFound => AppError::not_found("USER_NOT_FOUND", msg.as_str()),
            AuthError::AlreadyRegistered => AppError::conflict("USER_EXISTS", msg.as_str()),
            AuthError::InvalidPhone(_) => AppError::user("INVALID_PHONE", msg.as_str()),
            AuthError::Forbidden => AppError::forbidden("FORBIDDEN", msg.as_str()),
            AuthError::RateLimited => AppError::rate_limited("RATE_LIMITED", msg.as_str()),
            AuthError::ExpiryOutOfRange => {
                error!(target: "auth", "{msg}");
                AppError::internal("INTERNAL", "could not issue session")
            }
            AuthError::TokenGeneration(_) => {
                error!(target: "auth", "{msg}");
                AppError::internal("INTERNAL", "could not issue session")
            }
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<TriageError> for AppError {
    fn from(err: TriageError) -> Self {
        let msg = err.to_string();
        match err {
            TriageError::InvalidSymptoms => AppError::user("INVALID_SYMPTOMS", msg.as_str()),
            TriageError::InvalidChannel(_) => AppError::user("INVALID_CHANNEL", msg.as_str()),
            TriageError::InvalidResult(_) => AppError::user("INVALID_RESULT", msg.as_str()),
            TriageError::NotFound(_) => AppError::not_found("NOT_FOUND", msg.as_str()),
            TriageError::PatientNotFound(_) => AppError::not_found("PATIENT_NOT_FOUND", msg.as_str()),
            TriageError::TerminalStatus(_) => AppError::conflict("TERMINAL_STATUS", msg.as_str()),
            TriageError::InvalidTransition { .. } => AppError::conflict("INVALID_TRANSITION", msg.as_str()),
            TriageError::Contention(_) => AppError::conflict("CONCURRENT_UPDATE", msg.as_str()),
            TriageError::Store(e) => e.into(),
        }
    }
}

impl From<FacilityError> for AppError {
    fn from(err: FacilityError) -> Self {
        let msg = err.to_string();
        match err {
            FacilityError::InvalidCoordinates { .. } | FacilityError::InvalidRadius(_) => {
                AppError::user("INVALID_REQUEST", msg.as_str())
            }
            FacilityError::NotFound(_) => AppError::not_found("NOT_FOUND", msg.as_str()),
            FacilityError::Store(e) => e.into(),
        }
    }
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        let msg = err.to_string();
        match err {
            PatientError::InvalidPhone(_) => AppError::user("INVALID_PHONE", msg.as_str()),
            PatientError::AlreadyExists => AppError::conflict("PATIENT_EXISTS", msg.as_str()),
            PatientError::NotFound(_) => AppError::not_found("NOT_FOUND", msg.as_str()),
            PatientError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "role").http_status(), 403);
        assert_eq!(AppError::rate_limited("slow", "down").http_status(), 429);
        assert_eq!(AppError::store("STORE_ERROR", "down").http_status(), 500);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn component_errors_map_to_codes() {
        let e: AppError = AuthError::MissingToken.into();
        assert_eq!((e.code_str(), e.http_status()), ("MISSING_TOKEN", 401));
        let e: AppError = AuthError::MalformedHeader.into();
        assert_eq!((e.code_str(), e.http_status()), ("INVALID_TOKEN_FORMAT", 401));
        let e: AppError = AuthError::Forbidden.into();
        assert_eq!((e.code_str(), e.http_status()), ("FORBIDDEN", 403));
        let e: AppError = TriageError::InvalidSymptoms.into();
        assert_eq!((e.code_str(), e.http_status()), ("INVALID_SYMPTOMS", 400));
        let e: AppError = TriageError::InvalidChannel("fax".into()).into();
        assert_eq!((e.code_str(), e.http_status()), ("INVALID_CHANNEL", 400));
        let e: AppError = StoreError::Timeout(Duration::from_secs(5)).into();
        assert_eq!((e.code_str(), e.http_status()), ("STORE_TIMEOUT", 500));
        let e: AppError = StoreError::Decode("bad role".into()).into();
        assert_eq!((e.code_str(), e.http_status()), ("STORE_ERROR", 500));
    }

    #[test]
    fn envelope_shape() {
        let v = AppError::not_found("NOT_FOUND", "triage session not found").envelope();
        assert_eq!(v["success"], serde_json::json!(false));
        assert_eq!(v["error"]["code"], "NOT_FOUND");
        assert_eq!(v["error"]["message"], "triage session not found");
    }
}
