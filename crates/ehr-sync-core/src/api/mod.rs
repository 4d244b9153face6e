//! Record service client.
//!
//! Resources (relative to the configured base URL):
//!
//! ```text
//! GET    /patients/                      -> [Patient]
//! POST   /patients/                      -> Patient
//! GET    /patients/{id}                  -> Patient
//! PUT    /patients/{id}                  -> Patient
//! DELETE /patients/{id}                  -> 2xx
//! GET    /patients/{id}/diagnoses/       -> [Diagnosis]
//! POST   /patients/{id}/diagnoses/       -> Diagnosis
//! DELETE /patients/{id}/diagnoses/{did}  -> 2xx
//! ```

mod http;
mod mock;

pub use http::*;
pub use mock::*;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Diagnosis, DiagnosisId, Patient, PatientId};

/// Record service errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Server returned status {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Status code for server errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if e.is_builder() {
            ApiError::InvalidUrl(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operations offered by the record service.
///
/// Id-dependent operations take typed ids, so they can only be issued for
/// entities the server has already stored.
#[async_trait]
pub trait RecordsApi: Send + Sync + 'static {
    async fn list_patients(&self) -> ApiResult<Vec<Patient>>;

    async fn get_patient(&self, id: PatientId) -> ApiResult<Patient>;

    /// Store a new patient. The body is sent with an unassigned id.
    async fn create_patient(&self, patient: &Patient) -> ApiResult<Patient>;

    /// Full replacement of a stored patient.
    async fn update_patient(&self, id: PatientId, patient: &Patient) -> ApiResult<Patient>;

    async fn delete_patient(&self, id: PatientId) -> ApiResult<()>;

    async fn list_diagnoses(&self, patient_id: PatientId) -> ApiResult<Vec<Diagnosis>>;

    async fn create_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis: &Diagnosis,
    ) -> ApiResult<Diagnosis>;

    async fn delete_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis_id: DiagnosisId,
    ) -> ApiResult<()>;
}

#[async_trait]
impl<T: RecordsApi> RecordsApi for Arc<T> {
    async fn list_patients(&self) -> ApiResult<Vec<Patient>> {
        (**self).list_patients().await
    }

    async fn get_patient(&self, id: PatientId) -> ApiResult<Patient> {
        (**self).get_patient(id).await
    }

    async fn create_patient(&self, patient: &Patient) -> ApiResult<Patient> {
        (**self).create_patient(patient).await
    }

    async fn update_patient(&self, id: PatientId, patient: &Patient) -> ApiResult<Patient> {
        (**self).update_patient(id, patient).await
    }

    async fn delete_patient(&self, id: PatientId) -> ApiResult<()> {
        (**self).delete_patient(id).await
    }

    async fn list_diagnoses(&self, patient_id: PatientId) -> ApiResult<Vec<Diagnosis>> {
        (**self).list_diagnoses(patient_id).await
    }

    async fn create_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis: &Diagnosis,
    ) -> ApiResult<Diagnosis> {
        (**self).create_diagnosis(patient_id, diagnosis).await
    }

    async fn delete_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis_id: DiagnosisId,
    ) -> ApiResult<()> {
        (**self).delete_diagnosis(patient_id, diagnosis_id).await
    }
}

/// Resource paths.
pub mod paths {
    use crate::models::{DiagnosisId, PatientId};

    pub fn patients() -> String {
        "/patients/".to_string()
    }

    pub fn patient(id: PatientId) -> String {
        format!("/patients/{}", id)
    }

    pub fn diagnoses(patient_id: PatientId) -> String {
        format!("/patients/{}/diagnoses/", patient_id)
    }

    pub fn diagnosis(patient_id: PatientId, diagnosis_id: DiagnosisId) -> String {
        format!("/patients/{}/diagnoses/{}", patient_id, diagnosis_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(paths::patients(), "/patients/");
        assert_eq!(paths::patient(PatientId(7)), "/patients/7");
        assert_eq!(paths::diagnoses(PatientId(7)), "/patients/7/diagnoses/");
        assert_eq!(
            paths::diagnosis(PatientId(7), DiagnosisId(2)),
            "/patients/7/diagnoses/2"
        );
    }

    #[test]
    fn test_server_status() {
        let err = ApiError::Server {
            status: 404,
            body: "Patient not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(ApiError::Transport("refused".into()).status(), None);
    }
}
