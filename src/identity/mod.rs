//! Phone-number login, session tokens and the request gates.
//! Keep the public surface thin and split implementation across sub-modules.

mod authorizer;
mod error;
mod gate;
mod phone;
mod provider;
mod request_context;
mod session;

pub use authorizer::{require_role, role_guard, CLINICAL_ROLES};
pub use error::AuthError;
pub use gate::{parse_bearer, require_session};
pub use phone::canonical_phone;
pub use provider::{AuthProvider, LoginRequest, LoginResponse, PhoneAuthProvider};
pub use request_context::RequestContext;
pub use session::{token_prefix, SessionManager, SessionToken};
