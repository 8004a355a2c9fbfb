//! In-process store used for development runs and tests.
//! Each table is a map behind its own `parking_lot::RwLock`; no lock is held
//! across an await point.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    BoundingBox, CasOutcome, FacilityStore, PatientStore, SessionStore, StoreError, StoreResult, TriagePatch,
    TriageStore, UserStore,
};
use crate::models::{
    Facility, FacilityFilter, NewPatient, NewSession, NewTriageSession, Patient, PatientUpdate, Role, Session,
    TriageSession, TriageStatus, User,
};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    /// token -> session
    sessions: RwLock<HashMap<String, Session>>,
    patients: RwLock<HashMap<Uuid, Patient>>,
    triage: RwLock<HashMap<Uuid, TriageSession>>,
    facilities: RwLock<HashMap<Uuid, Facility>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Facilities are reference data maintained outside the core; this is the
    /// seeding hook for development runs and tests.
    pub fn insert_facility(&self, facility: Facility) {
        self.facilities.write().insert(facility.id, facility);
    }

    /// Write a session row as-is, bypassing token generation.
    pub fn insert_session(&self, session: Session) {
        self.sessions.write().insert(session.token.clone(), session);
    }

    pub fn session_count(&self) -> usize { self.sessions.read().len() }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, phone: &str, role: Role) -> StoreResult<User> {
        let mut users = self.users.write();
        if users.values().any(|u| u.phone == phone) {
            return Err(StoreError::Conflict(format!("user phone {phone} already exists")));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            phone: phone.to_string(),
            name: None,
            email: None,
            role,
            patient_id: None,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn user_by_phone(&self, phone: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().values().find(|u| u.phone == phone).cloned())
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.users.write().get_mut(&id).map(|u| u.last_login_at = Some(at)).is_some())
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> StoreResult<bool> {
        Ok(self
            .users
            .write()
            .get_mut(&id)
            .map(|u| {
                u.is_active = active;
                u.updated_at = Utc::now();
            })
            .is_some())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&new.token) {
            return Err(StoreError::Conflict("session token already issued".into()));
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            token: new.token,
            expires_at: new.expires_at,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            created_at: Utc::now(),
        };
        sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.read().get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        Ok(self.sessions.write().remove(token).is_some())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn create_patient(&self, new: NewPatient) -> StoreResult<Patient> {
        let mut patients = self.patients.write();
        if patients.values().any(|p| p.phone == new.phone) {
            return Err(StoreError::Conflict(format!("patient phone {} already exists", new.phone)));
        }
        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            phone: new.phone,
            name: new.name,
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            preferred_language: new.preferred_language.unwrap_or_else(|| "en".to_string()),
            consent_flags: new.consent_flags,
            created_at: now,
            updated_at: now,
        };
        patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn patient_by_id(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        Ok(self.patients.read().get(&id).cloned())
    }

    async fn patient_by_phone(&self, phone: &str) -> StoreResult<Option<Patient>> {
        Ok(self.patients.read().values().find(|p| p.phone == phone).cloned())
    }

    async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> StoreResult<Option<Patient>> {
        let mut patients = self.patients.write();
        let Some(p) = patients.get_mut(&id) else { return Ok(None) };
        if let Some(v) = update.name { p.name = Some(v); }
        if let Some(v) = update.date_of_birth { p.date_of_birth = Some(v); }
        if let Some(v) = update.gender { p.gender = Some(v); }
        if let Some(v) = update.preferred_language { p.preferred_language = v; }
        if let Some(v) = update.consent_flags { p.consent_flags = v; }
        p.updated_at = Utc::now();
        Ok(Some(p.clone()))
    }
}

#[async_trait]
impl TriageStore for MemoryStore {
    async fn create_triage(&self, new: NewTriageSession) -> StoreResult<TriageSession> {
        if let Some(pid) = new.patient_id {
            if !self.patients.read().contains_key(&pid) {
                return Err(StoreError::MissingReference(format!("patient {pid}")));
            }
        }
        let now = Utc::now();
        let session = TriageSession {
            id: Uuid::new_v4(),
            patient_id: new.patient_id,
            symptoms: new.symptoms,
            context: new.context,
            summary_text: None,
            triage_level: None,
            triage_code: None,
            confidence: None,
            recommended_action: None,
            llm_response: None,
            channel: new.channel,
            status: TriageStatus::Queued,
            created_at: now,
            updated_at: now,
        };
        self.triage.write().insert(session.id, session.clone());
        Ok(session)
    }

    async fn triage_by_id(&self, id: Uuid) -> StoreResult<Option<TriageSession>> {
        Ok(self.triage.read().get(&id).cloned())
    }

    async fn triage_by_patient(&self, patient_id: Uuid, limit: usize) -> StoreResult<Vec<TriageSession>> {
        let mut rows: Vec<TriageSession> = self
            .triage
            .read()
            .values()
            .filter(|t| t.patient_id == Some(patient_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn apply_triage(&self, id: Uuid, expected: TriageStatus, patch: TriagePatch) -> StoreResult<CasOutcome> {
        let mut map = self.triage.write();
        let Some(row) = map.get_mut(&id) else { return Ok(CasOutcome::Missing) };
        if row.status != expected {
            return Ok(CasOutcome::Stale);
        }
        row.status = patch.target_status();
        if let TriagePatch::Result(r) = patch {
            row.triage_level = Some(r.level);
            row.triage_code = Some(r.code);
            row.confidence = Some(r.confidence);
            row.recommended_action = Some(r.recommended_action);
            row.llm_response = Some(r.response);
        }
        row.updated_at = Utc::now();
        Ok(CasOutcome::Applied(row.clone()))
    }
}

#[async_trait]
impl FacilityStore for MemoryStore {
    async fn facility_by_id(&self, id: Uuid) -> StoreResult<Option<Facility>> {
        Ok(self.facilities.read().get(&id).cloned())
    }

    async fn list_facilities(&self, filter: &FacilityFilter, limit: usize) -> StoreResult<Vec<Facility>> {
        let mut rows: Vec<Facility> = self
            .facilities
            .read()
            .values()
            .filter(|f| filter.county.as_ref().map_or(true, |c| f.county.as_ref() == Some(c)))
            .filter(|f| filter.facility_type.map_or(true, |t| f.facility_type == t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn referral_candidates(&self, bbox: BoundingBox) -> StoreResult<Vec<Facility>> {
        Ok(self
            .facilities
            .read()
            .values()
            .filter(|f| f.accepts_referrals)
            .filter(|f| f.location.map_or(false, |p| bbox.contains(p.latitude, p.longitude)))
            .cloned()
            .collect())
    }
}
