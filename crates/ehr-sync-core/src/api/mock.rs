//! In-memory record service for testing and offline demos.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiError, ApiResult, RecordsApi};
use crate::models::{Diagnosis, DiagnosisId, EntityId, Patient, PatientId};

/// Record service operations, used to target injected failures and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    ListPatients,
    GetPatient,
    CreatePatient,
    UpdatePatient,
    DeletePatient,
    ListDiagnoses,
    CreateDiagnosis,
    DeleteDiagnosis,
}

#[derive(Default)]
struct MockState {
    patients: Vec<Patient>,
    diagnoses: Vec<Diagnosis>,
    next_patient_id: i64,
    next_diagnosis_id: i64,
    failures: HashMap<ApiOperation, VecDeque<ApiError>>,
    delays: HashMap<ApiOperation, VecDeque<Duration>>,
    calls: HashMap<ApiOperation, usize>,
}

/// Stand-in for the record service.
///
/// Behaves like the real backend: ids come from counters starting at 1,
/// deleting a patient deletes its diagnoses, and unknown ids yield 404.
pub struct MockRecordsApi {
    state: Mutex<MockState>,
}

impl Default for MockRecordsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRecordsApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_patient_id: 1,
                next_diagnosis_id: 1,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Id the server will assign to the next created patient.
    pub fn with_next_patient_id(self, id: i64) -> Self {
        self.state().next_patient_id = id;
        self
    }

    /// Store a patient directly, assigning an id.
    pub fn seed_patient(&self, patient: Patient) -> Patient {
        let mut state = self.state();
        let stored = assign_patient(&mut state, patient);
        state.patients.push(stored.clone());
        stored
    }

    /// Store a diagnosis directly, assigning an id.
    pub fn seed_diagnosis(&self, patient_id: PatientId, name: &str) -> Diagnosis {
        let mut state = self.state();
        let stored = assign_diagnosis(&mut state, Diagnosis::new(patient_id, name));
        state.diagnoses.push(stored.clone());
        stored
    }

    /// Replace the server-side diagnoses of one patient.
    pub fn set_diagnoses(&self, patient_id: PatientId, names: &[&str]) -> Vec<Diagnosis> {
        let mut state = self.state();
        state.diagnoses.retain(|d| !d.belongs_to(patient_id));
        let mut stored = Vec::with_capacity(names.len());
        for name in names {
            let diagnosis = assign_diagnosis(&mut state, Diagnosis::new(patient_id, *name));
            state.diagnoses.push(diagnosis.clone());
            stored.push(diagnosis);
        }
        stored
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: ApiOperation, error: ApiError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make the next call of `operation` wait before answering.
    pub fn delay_next(&self, operation: ApiOperation, delay: Duration) {
        self.state()
            .delays
            .entry(operation)
            .or_default()
            .push_back(delay);
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: ApiOperation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Server-side patients.
    pub fn patients(&self) -> Vec<Patient> {
        self.state().patients.clone()
    }

    /// Server-side diagnoses of one patient.
    pub fn diagnoses_of(&self, patient_id: PatientId) -> Vec<Diagnosis> {
        self.state()
            .diagnoses
            .iter()
            .filter(|d| d.belongs_to(patient_id))
            .cloned()
            .collect()
    }

    /// Record the call, wait for any injected delay, then surface any injected failure.
    async fn enter(&self, operation: ApiOperation) -> ApiResult<()> {
        let delay = {
            let mut state = self.state();
            *state.calls.entry(operation).or_insert(0) += 1;
            state.delays.get_mut(&operation).and_then(|q| q.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .state()
            .failures
            .get_mut(&operation)
            .and_then(|q| q.pop_front());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn assign_patient(state: &mut MockState, patient: Patient) -> Patient {
    let id = PatientId(state.next_patient_id);
    state.next_patient_id += 1;
    patient.with_id(id)
}

fn assign_diagnosis(state: &mut MockState, diagnosis: Diagnosis) -> Diagnosis {
    let id = DiagnosisId(state.next_diagnosis_id);
    state.next_diagnosis_id += 1;
    Diagnosis {
        id: EntityId::Assigned(id),
        ..diagnosis
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Server {
        status: 404,
        body: format!(r#"{{"detail":"{} not found"}}"#, what),
    }
}

#[async_trait]
impl RecordsApi for MockRecordsApi {
    async fn list_patients(&self) -> ApiResult<Vec<Patient>> {
        self.enter(ApiOperation::ListPatients).await?;
        Ok(self.state().patients.clone())
    }

    async fn get_patient(&self, id: PatientId) -> ApiResult<Patient> {
        self.enter(ApiOperation::GetPatient).await?;
        self.state()
            .patients
            .iter()
            .find(|p| p.id() == Some(id))
            .cloned()
            .ok_or_else(|| not_found("Patient"))
    }

    async fn create_patient(&self, patient: &Patient) -> ApiResult<Patient> {
        self.enter(ApiOperation::CreatePatient).await?;
        let mut state = self.state();
        let stored = assign_patient(&mut state, patient.clone());
        state.patients.push(stored.clone());
        Ok(stored)
    }

    async fn update_patient(&self, id: PatientId, patient: &Patient) -> ApiResult<Patient> {
        self.enter(ApiOperation::UpdatePatient).await?;
        let mut state = self.state();
        let existing = state
            .patients
            .iter_mut()
            .find(|p| p.id() == Some(id))
            .ok_or_else(|| not_found("Patient"))?;
        existing.name = patient.name.clone();
        existing.age = patient.age;
        existing.ssn = patient.ssn.clone();
        Ok(existing.clone())
    }

    async fn delete_patient(&self, id: PatientId) -> ApiResult<()> {
        self.enter(ApiOperation::DeletePatient).await?;
        let mut state = self.state();
        let before = state.patients.len();
        state.patients.retain(|p| p.id() != Some(id));
        if state.patients.len() == before {
            return Err(not_found("Patient"));
        }
        state.diagnoses.retain(|d| !d.belongs_to(id));
        Ok(())
    }

    async fn list_diagnoses(&self, patient_id: PatientId) -> ApiResult<Vec<Diagnosis>> {
        self.enter(ApiOperation::ListDiagnoses).await?;
        Ok(self.diagnoses_of(patient_id))
    }

    async fn create_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis: &Diagnosis,
    ) -> ApiResult<Diagnosis> {
        self.enter(ApiOperation::CreateDiagnosis).await?;
        let mut state = self.state();
        if !state.patients.iter().any(|p| p.id() == Some(patient_id)) {
            return Err(not_found("Patient"));
        }
        let stored = assign_diagnosis(
            &mut state,
            Diagnosis::new(patient_id, diagnosis.name.clone()),
        );
        state.diagnoses.push(stored.clone());
        Ok(stored)
    }

    async fn delete_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis_id: DiagnosisId,
    ) -> ApiResult<()> {
        self.enter(ApiOperation::DeleteDiagnosis).await?;
        let mut state = self.state();
        let before = state.diagnoses.len();
        state
            .diagnoses
            .retain(|d| !(d.id() == Some(diagnosis_id) && d.belongs_to(patient_id)));
        if state.diagnoses.len() == before {
            return Err(not_found("Diagnosis"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let api = MockRecordsApi::new();
        let a = api.create_patient(&Patient::new("A", None, "1")).await.unwrap();
        let b = api.create_patient(&Patient::new("B", None, "2")).await.unwrap();
        assert_eq!(a.id(), Some(PatientId(1)));
        assert_eq!(b.id(), Some(PatientId(2)));
    }

    #[tokio::test]
    async fn test_delete_patient_cascades() {
        let api = MockRecordsApi::new();
        let patient = api.seed_patient(Patient::new("A", None, "1"));
        let id = patient.id().unwrap();
        api.seed_diagnosis(id, "J45 Asthma");

        api.delete_patient(id).await.unwrap();
        assert!(api.patients().is_empty());
        assert!(api.diagnoses_of(id).is_empty());
    }

    #[tokio::test]
    async fn test_delete_diagnosis_checks_owner() {
        let api = MockRecordsApi::new();
        let p1 = api.seed_patient(Patient::new("A", None, "1")).id().unwrap();
        let p2 = api.seed_patient(Patient::new("B", None, "2")).id().unwrap();
        let diagnosis = api.seed_diagnosis(p1, "J45 Asthma");

        let err = api
            .delete_diagnosis(p2, diagnosis.id().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(api.diagnoses_of(p1).len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let api = MockRecordsApi::new();
        api.fail_next(
            ApiOperation::ListPatients,
            ApiError::Transport("connection refused".into()),
        );

        assert!(api.list_patients().await.is_err());
        assert!(api.list_patients().await.is_ok());
        assert_eq!(api.calls(ApiOperation::ListPatients), 2);
    }
}
