use crate::models::User;

/// Per-request identity attached by the session gate.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(user: User) -> Self { Self { user, request_id: uuid::Uuid::new_v4().to_string() } }
}
