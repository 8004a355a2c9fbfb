use std::sync::Arc;

use base64::Engine;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::phone::canonical_phone;
use crate::config::LoginPolicy;
use crate::models::{NewSession, Role, Session, User};
use crate::store::{Deadline, SessionStore, StoreError, UserStore};

pub type SessionToken = String;

/// Attempts at minting a token before giving up on uniqueness conflicts.
const TOKEN_ATTEMPTS: usize = 3;

fn gen_token() -> Result<SessionToken, AuthError> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AuthError::TokenGeneration(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// First characters of a token, safe to log.
pub fn token_prefix(token: &str) -> String { token.chars().take(8).collect() }

/// Owns user resolution at login and the session-token lifecycle.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    ttl: Duration,
    policy: LoginPolicy,
    deadline: Deadline,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        ttl: Duration,
        policy: LoginPolicy,
        deadline: Deadline,
    ) -> Self {
        Self { users, sessions, ttl, policy, deadline }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn policy(&self) -> LoginPolicy { self.policy }

    /// Resolve the user for `phone`, provisioning one when the policy allows.
    pub async fn login(&self, phone: &str) -> Result<User, AuthError> {
        let phone = canonical_phone(phone).ok_or_else(|| AuthError::InvalidPhone(phone.to_string()))?;
        let existing = self.deadline.run(self.users.user_by_phone(&phone)).await?;
        let user = match existing {
            Some(u) => u,
            None => match self.policy {
                LoginPolicy::RequireRegistration => return Err(AuthError::UserNotFound),
                LoginPolicy::AutoProvision => self.provision(&phone).await?,
            },
        };
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        let now = Utc::now();
        self.deadline.run(self.users.touch_last_login(user.id, now)).await?;
        info!(target: "auth", user_id = %user.id, role = %user.role, "login");
        Ok(User { last_login_at: Some(now), ..user })
    }

    async fn provision(&self, phone: &str) -> Result<User, AuthError> {
        match self.deadline.run(self.users.create_user(phone, Role::Patient)).await {
            Ok(u) => {
                info!(target: "auth", user_id = %u.id, "auto-provisioned patient user");
                Ok(u)
            }
            // lost a race with a concurrent first login for the same phone
            Err(StoreError::Conflict(_)) => {
                self.deadline.run(self.users.user_by_phone(phone)).await?.ok_or(AuthError::UserNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Explicit registration; the role defaults to `patient`.
    pub async fn register(&self, phone: &str, role: Option<Role>) -> Result<User, AuthError> {
        let phone = canonical_phone(phone).ok_or_else(|| AuthError::InvalidPhone(phone.to_string()))?;
        let role = role.unwrap_or(Role::Patient);
        match self.deadline.run(self.users.create_user(&phone, role)).await {
            Ok(u) => {
                info!(target: "auth", user_id = %u.id, role = %u.role, "user registered");
                Ok(u)
            }
            Err(StoreError::Conflict(_)) => Err(AuthError::AlreadyRegistered),
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a new session for `user_id`. Sessions are unlimited per user.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<Session, AuthError> {
        let expires_at = Utc::now().checked_add_signed(self.ttl).ok_or(AuthError::ExpiryOutOfRange)?;
        let mut last_conflict = None;
        for _ in 0..TOKEN_ATTEMPTS {
            let new = NewSession {
                user_id,
                token: gen_token()?,
                expires_at,
                user_agent: user_agent.clone(),
                ip_address: ip_address.clone(),
            };
            match self.deadline.run(self.sessions.create_session(new)).await {
                Ok(s) => {
                    info!(
                        target: "auth",
                        user_id = %user_id,
                        token = %token_prefix(&s.token),
                        expires_at = %s.expires_at,
                        "session issued"
                    );
                    return Ok(s);
                }
                Err(StoreError::Conflict(msg)) => {
                    warn!(target: "auth", "session token collision, retrying");
                    last_conflict = Some(msg);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(last_conflict.unwrap_or_default()).into())
    }

    /// Resolve a bearer token to its active user.
    pub async fn validate_session(&self, token: &str) -> Result<User, AuthError> {
        let session = self
            .deadline
            .run(self.sessions.session_by_token(token))
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if session.is_expired_at(Utc::now()) {
            debug!(target: "auth", token = %token_prefix(token), "session expired");
            return Err(AuthError::SessionExpired);
        }
        let user = self
            .deadline
            .run(self.users.user_by_id(session.user_id))
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        Ok(user)
    }

    /// Idempotent: deleting an unknown token succeeds.
    pub async fn delete_session(&self, token: &str) -> Result<(), AuthError> {
        let removed = self.deadline.run(self.sessions.delete_session(token)).await?;
        info!(target: "auth", token = %token_prefix(token), removed, "session deleted");
        Ok(())
    }

    /// Drop every session whose expiry has passed. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let n = self.deadline.run(self.sessions.delete_expired_sessions(Utc::now())).await?;
        if n > 0 {
            debug!(target: "auth", removed = n, "expired sessions purged");
        }
        Ok(n)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
