use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::AuthError;
use super::phone::canonical_phone;
use super::session::SessionManager;
use crate::cache::LoginRateLimiter;
use crate::models::User;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub phone: String,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError>;
}

/// Phone-number login: rate limit, resolve the user, issue a session.
#[derive(Clone)]
pub struct PhoneAuthProvider {
    pub sm: SessionManager,
    pub limiter: LoginRateLimiter,
}

impl PhoneAuthProvider {
    pub fn new(sm: SessionManager, limiter: LoginRateLimiter) -> Self { Self { sm, limiter } }
}

#[async_trait]
impl AuthProvider for PhoneAuthProvider {
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let phone = canonical_phone(&req.phone).ok_or_else(|| AuthError::InvalidPhone(req.phone.clone()))?;
        if !self.limiter.check(&phone) {
            return Err(AuthError::RateLimited);
        }
        let user = self.sm.login(&phone).await?;
        let session = self.sm.create_session(user.id, req.user_agent.clone(), req.ip.clone()).await?;
        Ok(LoginResponse { session_token: session.token, expires_at: session.expires_at, user })
    }
}
