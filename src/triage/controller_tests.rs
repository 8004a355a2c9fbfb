use super::*;
use crate::models::{NewPatient, TriageLevel};
use crate::store::{MemoryStore, PatientStore, StoreResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

fn doc(v: serde_json::Value) -> Document {
    match v {
        serde_json::Value::Object(m) => m,
        _ => Document::new(),
    }
}

fn controller() -> TriageController {
    TriageController::new(Arc::new(MemoryStore::new()), Deadline::default())
}

fn intake(channel: &str) -> CreateTriage {
    CreateTriage { symptoms: doc(json!({"fever": true, "duration": 3})), channel: channel.into(), ..Default::default() }
}

fn red_result() -> TriageResult {
    TriageResult {
        level: TriageLevel::Red,
        code: "EMERG-01".into(),
        confidence: 0.92,
        recommended_action: "Go to the nearest hospital now".into(),
        response: doc(json!({"model": "triage-v1", "reasons": ["fever", "stiff neck"]})),
    }
}

#[tokio::test]
async fn fresh_sessions_are_queued() {
    let tc = controller();
    let s = tc.create(intake("web")).await.unwrap();
    assert_eq!(s.status, TriageStatus::Queued);
    assert_eq!(s.channel, Channel::Web);
    assert_eq!(s.triage_level, None);
    let fetched = tc.get_by_id(s.id).await.unwrap();
    assert_eq!(fetched, s);
}

#[tokio::test]
async fn empty_symptoms_rejected_regardless_of_channel() {
    let tc = controller();
    for channel in ["sms", "ussd", "web", "fax", ""] {
        let req = CreateTriage { channel: channel.into(), ..Default::default() };
        assert!(matches!(tc.create(req).await, Err(TriageError::InvalidSymptoms)), "{channel}");
    }
}

#[tokio::test]
async fn unknown_channel_rejected() {
    let tc = controller();
    match tc.create(intake("whatsapp")).await {
        Err(TriageError::InvalidChannel(c)) => assert_eq!(c, "whatsapp"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn missing_session_is_not_found() {
    let tc = controller();
    let id = Uuid::new_v4();
    assert!(matches!(tc.get_by_id(id).await, Err(TriageError::NotFound(x)) if x == id));
    assert!(matches!(tc.update_status(id, TriageStatus::Processing).await, Err(TriageError::NotFound(_))));
    assert!(matches!(tc.update_result(id, red_result()).await, Err(TriageError::NotFound(_))));
}

#[tokio::test]
async fn full_lifecycle() {
    let tc = controller();
    let s = tc.create(intake("sms")).await.unwrap();
    let s = tc.update_status(s.id, TriageStatus::Processing).await.unwrap();
    assert_eq!(s.status, TriageStatus::Processing);
    let result = red_result();
    let s = tc.update_result(s.id, result.clone()).await.unwrap();
    assert_eq!(s.status, TriageStatus::Completed);
    assert_eq!(s.triage_level, Some(TriageLevel::Red));
    assert_eq!(s.triage_code.as_deref(), Some("EMERG-01"));
    assert_eq!(s.confidence, Some(0.92));
    assert_eq!(s.recommended_action.as_deref(), Some(result.recommended_action.as_str()));
    assert_eq!(s.llm_response.as_ref(), Some(&result.response));
}

#[tokio::test]
async fn result_directly_from_queued() {
    let tc = controller();
    let s = tc.create(intake("ussd")).await.unwrap();
    let s = tc.update_result(s.id, red_result()).await.unwrap();
    assert_eq!(s.status, TriageStatus::Completed);
}

#[tokio::test]
async fn terminal_states_never_revert() {
    let tc = controller();
    let s = tc.create(intake("web")).await.unwrap();
    tc.update_status(s.id, TriageStatus::Failed).await.unwrap();
    for next in [TriageStatus::Queued, TriageStatus::Processing, TriageStatus::Completed] {
        assert!(matches!(
            tc.update_status(s.id, next).await,
            Err(TriageError::TerminalStatus(TriageStatus::Failed))
        ));
    }
    assert!(matches!(tc.update_result(s.id, red_result()).await, Err(TriageError::TerminalStatus(_))));
    // same terminal status again is a no-op
    assert_eq!(tc.update_status(s.id, TriageStatus::Failed).await.unwrap().status, TriageStatus::Failed);
    assert_eq!(tc.get_by_id(s.id).await.unwrap().status, TriageStatus::Failed);
}

#[tokio::test]
async fn processing_cannot_go_back_to_queued() {
    let tc = controller();
    let s = tc.create(intake("web")).await.unwrap();
    tc.update_status(s.id, TriageStatus::Processing).await.unwrap();
    assert!(matches!(
        tc.update_status(s.id, TriageStatus::Queued).await,
        Err(TriageError::InvalidTransition { from: TriageStatus::Processing, to: TriageStatus::Queued })
    ));
}

#[tokio::test]
async fn identical_result_is_idempotent_but_different_is_rejected() {
    let tc = controller();
    let s = tc.create(intake("web")).await.unwrap();
    let first = tc.update_result(s.id, red_result()).await.unwrap();
    let again = tc.update_result(s.id, red_result()).await.unwrap();
    assert_eq!(first, again);

    let mut other = red_result();
    other.level = TriageLevel::Green;
    assert!(matches!(
        tc.update_result(s.id, other).await,
        Err(TriageError::TerminalStatus(TriageStatus::Completed))
    ));
}

#[tokio::test]
async fn confidence_must_be_a_probability() {
    let tc = controller();
    let s = tc.create(intake("web")).await.unwrap();
    for c in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
        let mut r = red_result();
        r.confidence = c;
        assert!(matches!(tc.update_result(s.id, r).await, Err(TriageError::InvalidResult(_))));
    }
    assert_eq!(tc.get_by_id(s.id).await.unwrap().status, TriageStatus::Queued);
}

/// Controller over a store that already holds one patient.
async fn controller_with_patient() -> (TriageController, Uuid) {
    let mem = Arc::new(MemoryStore::new());
    let new = NewPatient { phone: "+254711000222".into(), ..Default::default() };
    let patient = mem.create_patient(new).await.unwrap();
    (TriageController::new(mem, Deadline::default()), patient.id)
}

#[tokio::test]
async fn unknown_patient_reference_is_rejected() {
    let (tc, patient) = controller_with_patient().await;
    let stranger = Uuid::new_v4();
    let req = CreateTriage { patient_id: Some(stranger), ..intake("sms") };
    assert!(matches!(tc.create(req).await, Err(TriageError::PatientNotFound(id)) if id == stranger));

    let ok = tc.create(CreateTriage { patient_id: Some(patient), ..intake("sms") }).await.unwrap();
    assert_eq!(ok.patient_id, Some(patient));
    assert_eq!(tc.get_by_patient(stranger, None).await.unwrap().len(), 0);
}

#[tokio::test]
async fn history_is_newest_first_and_clamped() {
    let (tc, patient) = controller_with_patient().await;
    let mut ids = Vec::new();
    for _ in 0..12 {
        let req = CreateTriage { patient_id: Some(patient), ..intake("sms") };
        ids.push(tc.create(req).await.unwrap().id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    tc.create(intake("web")).await.unwrap();

    let default = tc.get_by_patient(patient, None).await.unwrap();
    assert_eq!(default.len(), DEFAULT_HISTORY_LIMIT);
    assert_eq!(default[0].id, ids[11]);
    assert!(default.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    assert_eq!(tc.get_by_patient(patient, Some(0)).await.unwrap().len(), 1);
    assert_eq!(tc.get_by_patient(patient, Some(500)).await.unwrap().len(), 12);
    assert!(tc.get_by_patient(Uuid::new_v4(), None).await.unwrap().is_empty());
}

/// Moves the row to `failed` right before the first conditional update lands.
struct RacingStore {
    inner: MemoryStore,
    raced: AtomicBool,
}

#[async_trait]
impl TriageStore for RacingStore {
    async fn create_triage(&self, new: NewTriageSession) -> StoreResult<TriageSession> {
        self.inner.create_triage(new).await
    }

    async fn triage_by_id(&self, id: Uuid) -> StoreResult<Option<TriageSession>> { self.inner.triage_by_id(id).await }

    async fn triage_by_patient(&self, patient_id: Uuid, limit: usize) -> StoreResult<Vec<TriageSession>> {
        self.inner.triage_by_patient(patient_id, limit).await
    }

    async fn apply_triage(&self, id: Uuid, expected: TriageStatus, patch: TriagePatch) -> StoreResult<CasOutcome> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.apply_triage(id, expected, TriagePatch::Status(TriageStatus::Failed)).await?;
        }
        self.inner.apply_triage(id, expected, patch).await
    }
}

#[tokio::test]
async fn lost_race_is_re_decided() {
    let store = Arc::new(RacingStore { inner: MemoryStore::new(), raced: AtomicBool::new(false) });
    let tc = TriageController::new(store, Deadline::default());
    let s = tc.create(intake("web")).await.unwrap();
    // the concurrent writer failed the session first, so completing it must be refused
    assert!(matches!(
        tc.update_status(s.id, TriageStatus::Completed).await,
        Err(TriageError::TerminalStatus(TriageStatus::Failed))
    ));
    assert_eq!(tc.get_by_id(s.id).await.unwrap().status, TriageStatus::Failed);
}

#[tokio::test]
async fn concurrent_writers_cannot_both_win() {
    let tc = controller();
    let s = tc.create(intake("web")).await.unwrap();
    let (a, b) = tokio::join!(
        tc.update_status(s.id, TriageStatus::Completed),
        tc.update_status(s.id, TriageStatus::Failed)
    );
    let final_status = tc.get_by_id(s.id).await.unwrap().status;
    match (a, b) {
        (Ok(x), Err(TriageError::TerminalStatus(_))) => assert_eq!(x.status, final_status),
        (Err(TriageError::TerminalStatus(_)), Ok(y)) => assert_eq!(y.status, final_status),
        other => panic!("exactly one writer must win: {other:?}"),
    }
}
