//! Request-time guard: bearer token to authenticated user.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::error::AuthError;
use super::request_context::RequestContext;
use super::session::{token_prefix, SessionManager};
use crate::error::AppError;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The value must be exactly two space-separated parts, the scheme spelled
/// `Bearer`, with a non-empty token.
pub fn parse_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let raw = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MissingToken)?;
    let mut parts = raw.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Middleware: validate the bearer session and attach a [`RequestContext`].
pub async fn require_session(
    State(sm): State<SessionManager>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = parse_bearer(req.headers())?.to_string();
    let user = match sm.validate_session(&token).await {
        Ok(u) => u,
        Err(e) => {
            debug!(target: "auth", token = %token_prefix(&token), "rejected: {e}");
            return Err(e.into());
        }
    };
    req.extensions_mut().insert(RequestContext::new(user));
    Ok(next.run(req).await)
}
