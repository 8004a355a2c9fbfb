use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::error::AuthError;
use super::request_context::RequestContext;
use crate::error::AppError;
use crate::models::{Role, User};

/// Roles allowed to drive the triage lifecycle (the classification worker's identity).
pub const CLINICAL_ROLES: &[Role] = &[Role::Clinician, Role::Admin];

/// Membership check over the closed role set.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Middleware layered after the session gate; rejects users outside `allowed`.
pub async fn role_guard(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ctx) = req.extensions().get::<RequestContext>() else {
        return Err(AuthError::MissingToken.into());
    };
    if let Err(e) = require_role(&ctx.user, allowed) {
        warn!(target: "auth", user_id = %ctx.user.id, role = %ctx.user.role, path = %req.uri().path(), "forbidden");
        return Err(e.into());
    }
    Ok(next.run(req).await)
}
