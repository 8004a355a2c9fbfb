use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Document;

/// Unrecognised text for one of the closed model enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageLevel {
    Red,
    Yellow,
    Green,
}

impl TriageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageLevel::Red => "red",
            TriageLevel::Yellow => "yellow",
            TriageLevel::Green => "green",
        }
    }
}

impl FromStr for TriageLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(TriageLevel::Red),
            "yellow" => Ok(TriageLevel::Yellow),
            "green" => Ok(TriageLevel::Green),
            other => Err(ParseEnumError { kind: "triage level", value: other.to_string() }),
        }
    }
}

/// Lifecycle of a triage session.
///
/// `queued` is set by intake; the classification worker moves a session to
/// `processing` and then to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TriageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageStatus::Queued => "queued",
            TriageStatus::Processing => "processing",
            TriageStatus::Completed => "completed",
            TriageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TriageStatus::Completed | TriageStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    /// Self-loops are not edges; callers treat them as no-ops.
    pub fn can_transition_to(&self, next: TriageStatus) -> bool {
        use TriageStatus::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Queued, Completed) | (Queued, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl Display for TriageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TriageStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TriageStatus::Queued),
            "processing" => Ok(TriageStatus::Processing),
            "completed" => Ok(TriageStatus::Completed),
            "failed" => Ok(TriageStatus::Failed),
            other => Err(ParseEnumError { kind: "triage status", value: other.to_string() }),
        }
    }
}

/// Intake channel the symptom report arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Ussd,
    Web,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Ussd => "ussd",
            Channel::Web => "web",
        }
    }
}

impl FromStr for Channel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Channel::Sms),
            "ussd" => Ok(Channel::Ussd),
            "web" => Ok(Channel::Web),
            other => Err(ParseEnumError { kind: "channel", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageSession {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub symptoms: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Document>,
    pub summary_text: Option<String>,
    pub triage_level: Option<TriageLevel>,
    pub triage_code: Option<String>,
    pub confidence: Option<f64>,
    pub recommended_action: Option<String>,
    pub llm_response: Option<Document>,
    pub channel: Channel,
    pub status: TriageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TriageSession {
    /// True when the stored classification equals `result` field for field.
    pub fn has_result(&self, result: &TriageResult) -> bool {
        self.triage_level == Some(result.level)
            && self.triage_code.as_deref() == Some(result.code.as_str())
            && self.confidence == Some(result.confidence)
            && self.recommended_action.as_deref() == Some(result.recommended_action.as_str())
            && self.llm_response.as_ref() == Some(&result.response)
    }
}

/// Validated intake record; status is always `queued` on insert.
#[derive(Debug, Clone)]
pub struct NewTriageSession {
    pub patient_id: Option<Uuid>,
    pub symptoms: Document,
    pub context: Option<Document>,
    pub channel: Channel,
}

/// Classification outcome supplied by the external worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub level: TriageLevel,
    pub code: String,
    pub confidence: f64,
    pub recommended_action: String,
    #[serde(default)]
    pub response: Document,
}
