//! Domain records shared by the identity, triage and facility modules.
//! Keep these plain data types; behaviour lives in the owning component.

mod user;
mod patient;
mod triage;
mod facility;

pub use user::{User, Role, Session, NewSession};
pub use patient::{Patient, NewPatient, PatientUpdate};
pub use triage::{
    TriageSession, NewTriageSession, TriageLevel, TriageStatus, TriageResult, Channel, ParseEnumError,
};
pub use facility::{Facility, FacilityType, GeoPoint, NearbyFacility, FacilityFilter};

/// Free-form structured payload (symptoms, context, classifier response).
///
/// Stored as an opaque JSON object; the only schema rule the core enforces is
/// "non-empty" for symptoms.
pub type Document = serde_json::Map<String, serde_json::Value>;
