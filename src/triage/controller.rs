use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::TriageError;
use crate::models::{Channel, Document, NewTriageSession, TriageResult, TriageSession, TriageStatus};
use crate::store::{CasOutcome, Deadline, StoreError, TriagePatch, TriageStore};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Re-reads allowed after losing a conditional update.
const CAS_ATTEMPTS: usize = 4;

/// Intake request. Channel stays a raw string until validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTriage {
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub symptoms: Document,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub context: Option<Document>,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Apply,
    NoOp,
}

fn decide_status(current: TriageStatus, next: TriageStatus) -> Result<Decision, TriageError> {
    if current == next {
        return Ok(Decision::NoOp);
    }
    if current.is_terminal() {
        return Err(TriageError::TerminalStatus(current));
    }
    if current.can_transition_to(next) {
        Ok(Decision::Apply)
    } else {
        Err(TriageError::InvalidTransition { from: current, to: next })
    }
}

fn decide_result(session: &TriageSession, result: &TriageResult) -> Result<Decision, TriageError> {
    if session.status == TriageStatus::Completed && session.has_result(result) {
        return Ok(Decision::NoOp);
    }
    if session.status.is_terminal() {
        return Err(TriageError::TerminalStatus(session.status));
    }
    Ok(Decision::Apply)
}

fn validate_result(result: &TriageResult) -> Result<(), TriageError> {
    if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
        return Err(TriageError::InvalidResult(format!("confidence {} outside [0, 1]", result.confidence)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct TriageController {
    store: Arc<dyn TriageStore>,
    deadline: Deadline,
}

impl TriageController {
    pub fn new(store: Arc<dyn TriageStore>, deadline: Deadline) -> Self { Self { store, deadline } }

    /// Validate and persist a new session in `queued`.
    pub async fn create(&self, req: CreateTriage) -> Result<TriageSession, TriageError> {
        // symptoms are checked before the channel
        if req.symptoms.is_empty() {
            return Err(TriageError::InvalidSymptoms);
        }
        let channel: Channel = req.channel.parse().map_err(|_| TriageError::InvalidChannel(req.channel.clone()))?;
        let patient_id = req.patient_id;
        let new = NewTriageSession { patient_id, symptoms: req.symptoms, context: req.context, channel };
        let session = match self.deadline.run(self.store.create_triage(new)).await {
            Ok(s) => s,
            Err(StoreError::MissingReference(detail)) => {
                return Err(match patient_id {
                    Some(pid) => TriageError::PatientNotFound(pid),
                    None => StoreError::MissingReference(detail).into(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            target: "triage",
            session_id = %session.id,
            channel = channel.as_str(),
            symptoms = session.symptoms.len(),
            "triage session queued"
        );
        Ok(session)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<TriageSession, TriageError> {
        self.deadline.run(self.store.triage_by_id(id)).await?.ok_or(TriageError::NotFound(id))
    }

    /// Newest first. `limit` is clamped to 1..=100 and defaults to 10.
    pub async fn get_by_patient(&self, patient_id: Uuid, limit: Option<usize>) -> Result<Vec<TriageSession>, TriageError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.deadline.run(self.store.triage_by_patient(patient_id, limit)).await?)
    }

    pub async fn update_status(&self, id: Uuid, status: TriageStatus) -> Result<TriageSession, TriageError> {
        self.transition(id, TriagePatch::Status(status), |current| decide_status(current.status, status)).await
    }

    /// Attach the classification and complete the session.
    pub async fn update_result(&self, id: Uuid, result: TriageResult) -> Result<TriageSession, TriageError> {
        validate_result(&result)?;
        let patch = TriagePatch::Result(result.clone());
        self.transition(id, patch, |current| decide_result(current, &result)).await
    }

    async fn transition<F>(&self, id: Uuid, patch: TriagePatch, decide: F) -> Result<TriageSession, TriageError>
    where
        F: Fn(&TriageSession) -> Result<Decision, TriageError>,
    {
        let target = patch.target_status();
        for attempt in 0..CAS_ATTEMPTS {
            let current = self.get_by_id(id).await?;
            if decide(&current)? == Decision::NoOp {
                debug!(target: "triage", session_id = %id, status = %current.status, "transition is a no-op");
                return Ok(current);
            }
            let outcome = self.deadline.run(self.store.apply_triage(id, current.status, patch.clone())).await?;
            match outcome {
                CasOutcome::Applied(updated) => {
                    info!(
                        target: "triage",
                        session_id = %id,
                        from = %current.status,
                        to = %target,
                        "triage status changed"
                    );
                    return Ok(updated);
                }
                CasOutcome::Stale => {
                    debug!(target: "triage", session_id = %id, attempt, "status changed underneath, re-reading");
                }
                CasOutcome::Missing => return Err(TriageError::NotFound(id)),
            }
        }
        Err(TriageError::Contention(id))
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
