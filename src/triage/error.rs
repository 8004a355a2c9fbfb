use thiserror::Error;
use uuid::Uuid;

use crate::models::TriageStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("symptoms cannot be empty")]
    InvalidSymptoms,

    #[error("channel must be one of sms, ussd, web (got '{0}')")]
    InvalidChannel(String),

    /// Classification payload failed validation.
    #[error("invalid triage result: {0}")]
    InvalidResult(String),

    #[error("triage session {0} not found")]
    NotFound(Uuid),

    /// `patient_id` on intake names no patient record.
    #[error("patient {0} not found")]
    PatientNotFound(Uuid),

    /// The session already reached this terminal status.
    #[error("triage session is already {0}")]
    TerminalStatus(TriageStatus),

    #[error("cannot move triage session from {from} to {to}")]
    InvalidTransition { from: TriageStatus, to: TriageStatus },

    /// Conditional update kept losing to concurrent writers.
    #[error("triage session {0} is being updated concurrently, retry")]
    Contention(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
