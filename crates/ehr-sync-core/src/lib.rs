//! EHR Sync Core Library
//!
//! Client-side synchronization layer for a patient/diagnosis record service.
//!
//! # Architecture
//!
//! ```text
//!   UI (Swift via UniFFI, or the CLI)
//!        │ intents                         ▲ SyncEvent / snapshots
//!        ▼                                 │
//!   ┌───────────────────────────────────────────────┐
//!   │                  SyncGateway                  │
//!   │  op() → task → RecordsApi → update queue      │
//!   │                         │                     │
//!   │                  single writer                │
//!   │                         ▼                     │
//!   │                   RecordStore                 │
//!   │        (patients, diagnoses per patient)      │
//!   └───────────────────────────────────────────────┘
//!        │ HTTP/JSON
//!        ▼
//!   record service  (/patients/, /patients/{id}/diagnoses/)
//! ```
//!
//! # Core Principle
//!
//! **The store only reflects what the server confirmed.** Creates append the
//! server's copy, deletes remove only after a success status, and failures
//! leave the store untouched.
//!
//! # Modules
//!
//! - [`models`]: Domain types (Patient, Diagnosis, DiagnosisDraft, ids)
//! - [`api`]: Record service client (HTTP and in-memory)
//! - [`store`]: Owned in-memory state and its update rules
//! - [`gateway`]: Asynchronous operations merged through a single writer
//! - [`config`]: Startup configuration

pub mod api;
pub mod config;
pub mod gateway;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use api::{ApiError, ApiResult, HttpRecordsApi, MockRecordsApi, RecordsApi};
pub use config::{ClientConfig, ConfigError};
pub use gateway::{Operation, Pending, SyncError, SyncEvent, SyncGateway, SyncResult};
pub use models::{
    Diagnosis, DiagnosisDraft, DiagnosisId, DraftSource, EntityId, Patient, PatientId,
};
pub use store::{RecordStore, StoreChange, StoreUpdate};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum EhrSyncError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<ConfigError> for EhrSyncError {
    fn from(e: ConfigError) -> Self {
        EhrSyncError::ConfigError(e.to_string())
    }
}

impl From<ApiError> for EhrSyncError {
    fn from(e: ApiError) -> Self {
        EhrSyncError::RuntimeError(e.to_string())
    }
}

impl From<std::io::Error> for EhrSyncError {
    fn from(e: std::io::Error) -> Self {
        EhrSyncError::RuntimeError(e.to_string())
    }
}

// =========================================================================
// Observer (foreign callback)
// =========================================================================

/// Receives store notifications on a background thread.
///
/// Implementations on the UI side must hop to their UI thread before
/// touching views.
#[uniffi::export(callback_interface)]
pub trait SyncObserver: Send + Sync {
    /// The store changed; re-read snapshots.
    fn on_change(&self, change: String);

    /// An operation failed; the store is unchanged.
    fn on_error(&self, operation: String, message: String);
}

// =========================================================================
// Main API Object
// =========================================================================

/// Gateway owning its own runtime, for callers without one.
#[derive(uniffi::Object)]
pub struct EhrSyncClient {
    runtime: tokio::runtime::Runtime,
    gateway: SyncGateway<HttpRecordsApi>,
}

#[uniffi::export]
impl EhrSyncClient {
    /// Connect to the record service at `base_url`.
    #[uniffi::constructor]
    pub fn new(base_url: String) -> Result<Arc<Self>, EhrSyncError> {
        let config = ClientConfig::new(&base_url, config::DEFAULT_TIMEOUT)?;
        let api = HttpRecordsApi::new(config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let gateway = SyncGateway::with_runtime(api, runtime.handle().clone());
        Ok(Arc::new(Self { runtime, gateway }))
    }

    /// Forward gateway events to a foreign observer.
    pub fn observe(&self, observer: Box<dyn SyncObserver>) {
        let mut events = self.gateway.subscribe();
        self.runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SyncEvent::Changed(change)) => observer.on_change(format!("{:?}", change)),
                    Ok(SyncEvent::Failed { operation, error }) => {
                        observer.on_error(operation.to_string(), error.to_string())
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        observer.on_change(format!("Lagged({})", skipped))
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn patients(&self) -> Vec<FfiPatient> {
        self.gateway.patients().into_iter().map(Into::into).collect()
    }

    pub fn diagnoses_for(&self, patient_id: i64) -> Vec<FfiDiagnosis> {
        self.gateway
            .diagnoses_for(PatientId(patient_id))
            .into_iter()
            .map(Into::into)
            .collect()
    }

    // =========================================================================
    // Operations (fire-and-forget; observe the result via SyncObserver)
    // =========================================================================

    pub fn fetch_patients(&self) {
        drop(self.gateway.fetch_patients());
    }

    pub fn refresh_all(&self) {
        drop(self.gateway.refresh_all());
    }

    pub fn create_patient(&self, name: String, age: Option<i64>, ssn: String) {
        drop(self.gateway.create_patient(&name, age, &ssn));
    }

    /// Update a stored patient. Fails immediately if the patient has no id.
    pub fn update_patient(&self, patient: FfiPatient) -> Result<(), EhrSyncError> {
        let id = patient
            .id
            .map(PatientId)
            .ok_or_else(|| EhrSyncError::InvalidInput("patient has no id".into()))?;
        drop(self.gateway.update_patient(id, patient.into()));
        Ok(())
    }

    pub fn delete_patient(&self, patient_id: i64) {
        drop(self.gateway.delete_patient(PatientId(patient_id)));
    }

    pub fn fetch_diagnoses(&self, patient_id: i64) {
        drop(self.gateway.fetch_diagnoses(PatientId(patient_id)));
    }

    pub fn add_diagnosis(&self, patient_id: i64, name: String) {
        drop(self.gateway.add_diagnosis(PatientId(patient_id), &name));
    }

    pub fn delete_diagnosis(&self, patient_id: i64, diagnosis_id: i64) {
        drop(
            self.gateway
                .delete_diagnosis(PatientId(patient_id), DiagnosisId(diagnosis_id)),
        );
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: Option<i64>,
    pub name: String,
    pub age: Option<i64>,
    pub ssn: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id().map(|id| id.0),
            name: patient.name,
            age: patient.age,
            ssn: patient.ssn,
        }
    }
}

impl From<FfiPatient> for Patient {
    fn from(patient: FfiPatient) -> Self {
        Patient {
            id: patient.id.map(PatientId).into(),
            name: patient.name,
            age: patient.age,
            ssn: patient.ssn,
        }
    }
}

/// FFI-safe diagnosis.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDiagnosis {
    pub id: Option<i64>,
    pub name: String,
    pub patient_id: Option<i64>,
}

impl From<Diagnosis> for FfiDiagnosis {
    fn from(diagnosis: Diagnosis) -> Self {
        Self {
            id: diagnosis.id().map(|id| id.0),
            name: diagnosis.name,
            patient_id: diagnosis.patient_id.map(|id| id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_patient_roundtrip_keeps_id() {
        let patient = Patient::new("Jane Doe", Some(40), "000-00-0000").with_id(PatientId(7));
        let ffi: FfiPatient = patient.clone().into();
        assert_eq!(ffi.id, Some(7));
        let back: Patient = ffi.into();
        assert_eq!(back, patient);
    }

    #[test]
    fn test_ffi_diagnosis_flattens_ids() {
        let diagnosis = Diagnosis::new(PatientId(7), "J45 Asthma");
        let ffi: FfiDiagnosis = diagnosis.into();
        assert_eq!(ffi.id, None);
        assert_eq!(ffi.patient_id, Some(7));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(matches!(
            EhrSyncClient::new("nope".into()),
            Err(EhrSyncError::ConfigError(_))
        ));
    }
}
