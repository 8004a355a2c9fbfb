use super::*;
use crate::store::{MemoryStore, Stores};

fn manager(policy: LoginPolicy) -> (SessionManager, Arc<MemoryStore>) {
    let (stores, mem) = Stores::in_memory();
    let sm = SessionManager::new(stores.users, stores.sessions, Duration::hours(720), policy, Deadline::default());
    (sm, mem)
}

#[test]
fn tokens_are_urlsafe_256_bit() {
    let a = gen_token().unwrap();
    let b = gen_token().unwrap();
    assert_ne!(a, b);
    // 32 bytes -> 43 base64 chars without padding
    assert_eq!(a.len(), 43);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    assert_eq!(token_prefix(&a).len(), 8);
}

#[tokio::test]
async fn create_then_validate_returns_same_user() {
    let (sm, _) = manager(LoginPolicy::AutoProvision);
    let user = sm.login("+254700000001").await.unwrap();
    assert_eq!(user.role, Role::Patient);
    assert!(user.last_login_at.is_some());

    let s = sm.create_session(user.id, Some("curl/8".into()), Some("10.0.0.1".into())).await.unwrap();
    assert!(s.expires_at > s.created_at);
    let resolved = sm.validate_session(&s.token).await.unwrap();
    assert_eq!(resolved.id, user.id);
}

#[tokio::test]
async fn unrepresentable_expiry_is_an_error() {
    let (stores, _) = Stores::in_memory();
    let sm =
        SessionManager::new(stores.users, stores.sessions, Duration::MAX, LoginPolicy::AutoProvision, Deadline::default());
    let user = sm.login("+254700000001").await.unwrap();
    assert!(matches!(sm.create_session(user.id, None, None).await, Err(AuthError::ExpiryOutOfRange)));
}

#[tokio::test]
async fn login_reuses_existing_user() {
    let (sm, _) = manager(LoginPolicy::AutoProvision);
    let a = sm.login("+254700000001").await.unwrap();
    let b = sm.login("00254 700 000 001").await.unwrap();
    assert_eq!(a.id, b.id);
}

#[tokio::test]
async fn require_registration_policy() {
    let (sm, _) = manager(LoginPolicy::RequireRegistration);
    assert!(matches!(sm.login("+254700000001").await, Err(AuthError::UserNotFound)));
    let reg = sm.register("+254700000001", None).await.unwrap();
    let logged = sm.login("+254700000001").await.unwrap();
    assert_eq!(reg.id, logged.id);
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_phones() {
    let (sm, _) = manager(LoginPolicy::AutoProvision);
    let u = sm.register("+254700000009", Some(Role::Clinician)).await.unwrap();
    assert_eq!(u.role, Role::Clinician);
    assert!(matches!(sm.register("+254700000009", None).await, Err(AuthError::AlreadyRegistered)));
    assert!(matches!(sm.register("0700", None).await, Err(AuthError::InvalidPhone(_))));
    assert!(matches!(sm.login("not-a-phone").await, Err(AuthError::InvalidPhone(_))));
}

#[tokio::test]
async fn expired_session_is_rejected_at_and_after_expiry() {
    let (sm, mem) = manager(LoginPolicy::AutoProvision);
    let user = sm.login("+254700000002").await.unwrap();
    let now = Utc::now();
    for (token, expires_at) in [("past", now - Duration::hours(24)), ("edge", now)] {
        mem.insert_session(Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            token: token.into(),
            expires_at,
            user_agent: None,
            ip_address: None,
            created_at: now - Duration::days(31),
        });
        assert!(matches!(sm.validate_session(token).await, Err(AuthError::SessionExpired)));
    }
    // still expired on a second read
    assert!(matches!(sm.validate_session("past").await, Err(AuthError::SessionExpired)));
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let (sm, _) = manager(LoginPolicy::AutoProvision);
    assert!(matches!(sm.validate_session("nope").await, Err(AuthError::SessionNotFound)));
}

#[tokio::test]
async fn inactive_user_cannot_login_or_validate() {
    let (sm, mem) = manager(LoginPolicy::AutoProvision);
    let user = sm.login("+254700000003").await.unwrap();
    let s = sm.create_session(user.id, None, None).await.unwrap();
    mem.set_user_active(user.id, false).await.unwrap();
    assert!(matches!(sm.validate_session(&s.token).await, Err(AuthError::UserInactive)));
    assert!(matches!(sm.login("+254700000003").await, Err(AuthError::UserInactive)));
}

#[tokio::test]
async fn delete_session_is_idempotent() {
    let (sm, _) = manager(LoginPolicy::AutoProvision);
    let user = sm.login("+254700000004").await.unwrap();
    let s = sm.create_session(user.id, None, None).await.unwrap();
    sm.delete_session(&s.token).await.unwrap();
    sm.delete_session(&s.token).await.unwrap();
    assert!(matches!(sm.validate_session(&s.token).await, Err(AuthError::SessionNotFound)));
}

#[tokio::test]
async fn sessions_are_unlimited_per_user() {
    let (sm, mem) = manager(LoginPolicy::AutoProvision);
    let user = sm.login("+254700000005").await.unwrap();
    let a = sm.create_session(user.id, None, None).await.unwrap();
    let b = sm.create_session(user.id, None, None).await.unwrap();
    assert_ne!(a.token, b.token);
    assert_eq!(mem.session_count(), 2);
    assert_eq!(sm.validate_session(&a.token).await.unwrap().id, user.id);
    assert_eq!(sm.validate_session(&b.token).await.unwrap().id, user.id);
}

#[tokio::test]
async fn purge_removes_only_expired() {
    let (sm, mem) = manager(LoginPolicy::AutoProvision);
    let user = sm.login("+254700000006").await.unwrap();
    let live = sm.create_session(user.id, None, None).await.unwrap();
    let now = Utc::now();
    mem.insert_session(Session {
        id: Uuid::new_v4(),
        user_id: user.id,
        token: "old".into(),
        expires_at: now - Duration::minutes(1),
        user_agent: None,
        ip_address: None,
        created_at: now - Duration::days(30),
    });
    assert_eq!(sm.purge_expired().await.unwrap(), 1);
    assert_eq!(mem.session_count(), 1);
    assert!(sm.validate_session(&live.token).await.is_ok());
}
