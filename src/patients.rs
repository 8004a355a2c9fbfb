//! Patient records keyed by canonical phone.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::identity::canonical_phone;
use crate::models::{NewPatient, Patient, PatientUpdate};
use crate::store::{Deadline, PatientStore, StoreError};

#[derive(Debug, Error)]
pub enum PatientError {
    #[error("invalid phone number '{0}'")]
    InvalidPhone(String),

    #[error("a patient with this phone number already exists")]
    AlreadyExists,

    #[error("patient {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PatientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => PatientError::AlreadyExists,
            other => PatientError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct PatientRegistry {
    store: Arc<dyn PatientStore>,
    deadline: Deadline,
}

impl PatientRegistry {
    pub fn new(store: Arc<dyn PatientStore>, deadline: Deadline) -> Self { Self { store, deadline } }

    pub async fn create(&self, mut new: NewPatient) -> Result<Patient, PatientError> {
        new.phone = canonical_phone(&new.phone).ok_or_else(|| PatientError::InvalidPhone(new.phone.clone()))?;
        let patient = self.deadline.run(self.store.create_patient(new)).await?;
        info!(target: "patients", patient_id = %patient.id, "patient created");
        Ok(patient)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Patient, PatientError> {
        self.deadline.run(self.store.patient_by_id(id)).await?.ok_or_else(|| PatientError::NotFound(id.to_string()))
    }

    pub async fn get_by_phone(&self, phone: &str) -> Result<Patient, PatientError> {
        let phone = canonical_phone(phone).ok_or_else(|| PatientError::InvalidPhone(phone.to_string()))?;
        self.deadline.run(self.store.patient_by_phone(&phone)).await?.ok_or(PatientError::NotFound(phone))
    }

    /// Apply the present fields; phone cannot change.
    pub async fn update(&self, id: Uuid, update: PatientUpdate) -> Result<Patient, PatientError> {
        let patient = self
            .deadline
            .run(self.store.update_patient(id, update))
            .await?
            .ok_or_else(|| PatientError::NotFound(id.to_string()))?;
        info!(target: "patients", patient_id = %id, "patient updated");
        Ok(patient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn registry() -> PatientRegistry { PatientRegistry::new(Arc::new(MemoryStore::new()), Deadline::default()) }

    fn new_patient(phone: &str) -> NewPatient {
        NewPatient {
            phone: phone.into(),
            name: Some("Achieng Otieno".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12),
            gender: Some("female".into()),
            preferred_language: None,
            consent_flags: BTreeMap::from([("sms_followup".to_string(), true)]),
        }
    }

    #[tokio::test]
    async fn create_canonicalises_and_defaults_language() {
        let reg = registry();
        let p = reg.create(new_patient("+254 711 000 111")).await.unwrap();
        assert_eq!(p.phone, "+254711000111");
        assert_eq!(p.preferred_language, "en");
        assert_eq!(p.consent_flags.get("sms_followup"), Some(&true));
        assert_eq!(reg.get_by_phone("00254711000111").await.unwrap().id, p.id);
        assert_eq!(reg.get_by_id(p.id).await.unwrap(), p);
    }

    #[tokio::test]
    async fn duplicate_and_invalid_phones() {
        let reg = registry();
        reg.create(new_patient("+254711000111")).await.unwrap();
        assert!(matches!(reg.create(new_patient("+254711000111")).await, Err(PatientError::AlreadyExists)));
        assert!(matches!(reg.create(new_patient("12")).await, Err(PatientError::InvalidPhone(_))));
    }

    #[tokio::test]
    async fn update_keeps_phone_and_unset_fields() {
        let reg = registry();
        let p = reg.create(new_patient("+254711000111")).await.unwrap();
        let upd = PatientUpdate { preferred_language: Some("sw".into()), ..Default::default() };
        let after = reg.update(p.id, upd).await.unwrap();
        assert_eq!(after.preferred_language, "sw");
        assert_eq!(after.phone, p.phone);
        assert_eq!(after.name, p.name);
        assert!(after.updated_at >= p.updated_at);
        assert!(matches!(reg.update(Uuid::new_v4(), PatientUpdate::default()).await, Err(PatientError::NotFound(_))));
    }
}
