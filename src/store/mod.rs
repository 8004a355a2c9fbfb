//! Persistence interfaces for the credential store.
//!
//! Lookups return `Option` when the row is absent; absence is never an error at
//! this layer. Components decide what a missing row means for their callers.
//!
//! Two backends are provided: [`MemoryStore`] (development, tests) and
//! [`PgStore`] (PostgreSQL with PostGIS). Both are wired through [`Stores`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Facility, FacilityFilter, NewPatient, NewSession, NewTriageSession, Patient, PatientUpdate, Role,
    Session, TriageResult, TriageSession, TriageStatus, User,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store call exceeded {0:?}")]
    Timeout(Duration),

    /// The write references a row that does not exist.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// Stored data could not be mapped back into a domain value.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, phone: &str, role: Role) -> StoreResult<User>;

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn user_by_phone(&self, phone: &str) -> StoreResult<Option<User>>;

    /// Returns false when no user matched.
    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    async fn set_user_active(&self, id: Uuid, active: bool) -> StoreResult<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Must reject a duplicate token with [`StoreError::Conflict`].
    async fn create_session(&self, new: NewSession) -> StoreResult<Session>;

    async fn session_by_token(&self, token: &str) -> StoreResult<Option<Session>>;

    /// No-op if the token doesn't exist; returns whether a row was removed.
    async fn delete_session(&self, token: &str) -> StoreResult<bool>;

    /// Delete every session whose expiry is at or before `now`.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn create_patient(&self, new: NewPatient) -> StoreResult<Patient>;

    async fn patient_by_id(&self, id: Uuid) -> StoreResult<Option<Patient>>;

    async fn patient_by_phone(&self, phone: &str) -> StoreResult<Option<Patient>>;

    async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> StoreResult<Option<Patient>>;
}

/// Field changes applied together with a status transition.
#[derive(Debug, Clone)]
pub enum TriagePatch {
    Status(TriageStatus),
    /// Attach the classification and mark the session completed.
    Result(TriageResult),
}

impl TriagePatch {
    pub fn target_status(&self) -> TriageStatus {
        match self {
            TriagePatch::Status(s) => *s,
            TriagePatch::Result(_) => TriageStatus::Completed,
        }
    }
}

/// Outcome of a compare-and-set on the triage status column.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    Applied(TriageSession),
    /// The row exists but its status no longer equals the expected one.
    Stale,
    Missing,
}

#[async_trait]
pub trait TriageStore: Send + Sync {
    async fn create_triage(&self, new: NewTriageSession) -> StoreResult<TriageSession>;

    async fn triage_by_id(&self, id: Uuid) -> StoreResult<Option<TriageSession>>;

    /// Newest first, at most `limit` rows.
    async fn triage_by_patient(&self, patient_id: Uuid, limit: usize) -> StoreResult<Vec<TriageSession>>;

    /// Apply `patch` only if the stored status is still `expected`.
    async fn apply_triage(&self, id: Uuid, expected: TriageStatus, patch: TriagePatch) -> StoreResult<CasOutcome>;
}

/// Inclusive latitude/longitude window used to pre-filter proximity queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    pub fn spans_all_longitudes(&self) -> bool { self.min_lng <= -180.0 && self.max_lng >= 180.0 }
}

#[async_trait]
pub trait FacilityStore: Send + Sync {
    async fn facility_by_id(&self, id: Uuid) -> StoreResult<Option<Facility>>;

    /// Name ascending, at most `limit` rows.
    async fn list_facilities(&self, filter: &FacilityFilter, limit: usize) -> StoreResult<Vec<Facility>>;

    /// Referral-accepting facilities with a location inside `bbox`, unordered.
    async fn referral_candidates(&self, bbox: BoundingBox) -> StoreResult<Vec<Facility>>;
}

/// Bounded wait for a single store call.
///
/// Dropping the returned future (e.g. the client went away and axum dropped the
/// handler) cancels the wrapped call as well.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Duration);

impl Deadline {
    pub async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.0, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout(self.0)),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self { Self(Duration::from_secs(5)) }
}

/// Handles to every store the core needs, usually backed by one object.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub patients: Arc<dyn PatientStore>,
    pub triage: Arc<dyn TriageStore>,
    pub facilities: Arc<dyn FacilityStore>,
}

impl Stores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + SessionStore + PatientStore + TriageStore + FacilityStore + 'static,
    {
        Self {
            users: backend.clone(),
            sessions: backend.clone(),
            patients: backend.clone(),
            triage: backend.clone(),
            facilities: backend,
        }
    }

    pub fn in_memory() -> (Self, Arc<MemoryStore>) {
        let mem = Arc::new(MemoryStore::new());
        (Self::from_backend(mem.clone()), mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_times_out_slow_calls() {
        let d = Deadline(Duration::from_millis(10));
        let res: StoreResult<()> = d
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn deadline_passes_through_results() {
        let d = Deadline::default();
        assert_eq!(d.run(async { Ok(7) }).await.unwrap(), 7);
        let err = d.run(async { Err::<(), _>(StoreError::Backend("down".into())) }).await;
        assert!(matches!(err, Err(StoreError::Backend(_))));
    }

    #[test]
    fn bounding_box_is_inclusive() {
        let b = BoundingBox { min_lat: -1.0, max_lat: 1.0, min_lng: 36.0, max_lng: 37.0 };
        assert!(b.contains(1.0, 36.0));
        assert!(!b.contains(1.0001, 36.5));
    }
}
