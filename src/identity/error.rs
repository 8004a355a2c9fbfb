use thiserror::Error;

use crate::store::StoreError;

/// Failures raised by login, session handling and the request gates.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header, or its value is not valid header text.
    #[error("authorization header required")]
    MissingToken,

    #[error("authorization header must be in format: Bearer <token>")]
    MalformedHeader,

    /// Unknown token, or the owning user no longer exists.
    #[error("session not found")]
    SessionNotFound,

    #[error("session expired")]
    SessionExpired,

    #[error("user account is inactive")]
    UserInactive,

    #[error("user not registered")]
    UserNotFound,

    #[error("phone number already registered")]
    AlreadyRegistered,

    #[error("invalid phone number '{0}'")]
    InvalidPhone(String),

    #[error("insufficient permissions")]
    Forbidden,

    #[error("too many login attempts, try again later")]
    RateLimited,

    /// Now plus the configured lifetime is outside the representable range.
    #[error("session expiry out of range")]
    ExpiryOutOfRange,

    /// The OS random source failed.
    #[error("token generation failed: {0}")]
    TokenGeneration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
