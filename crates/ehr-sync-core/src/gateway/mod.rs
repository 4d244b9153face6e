//! Remote data gateway.
//!
//! Mediates between the record service and the in-memory [`RecordStore`].
//!
//! ```text
//! caller ──op()──► spawn task ──► RecordsApi (HTTP)
//!    ▲                                  │
//!    │ Pending                          ▼ Completion
//!    │                          ┌───────────────┐
//!    └──────── ack ◄────────────│ update queue  │──► single writer ──► RecordStore
//!                               └───────────────┘           │
//!                                                           ▼
//!                                                   SyncEvent broadcast
//! ```
//!
//! No operation blocks the caller. Every operation returns a [`Pending`]
//! handle immediately: drop it for fire-and-forget, or await it to learn
//! when the result has been merged into the store. Failures never escape as
//! panics; they are logged, published as [`SyncEvent::Failed`] and returned
//! through the handle, and the store is left unchanged.

mod writer;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::api::{ApiError, RecordsApi};
use crate::models::{Diagnosis, DiagnosisDraft, DiagnosisId, Patient, PatientId};
use crate::store::{RecordStore, StoreChange, StoreUpdate};
use writer::{run_writer, Completion, FetchScope};

/// Capacity of the event broadcast buffer. Slow subscribers lag rather than block the writer.
const EVENT_CAPACITY: usize = 256;

/// Gateway errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Result superseded by a newer fetch")]
    Superseded,

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Gateway shut down before the operation completed")]
    Shutdown,
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Gateway operations, as reported in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchPatients,
    FetchPatient,
    CreatePatient,
    UpdatePatient,
    DeletePatient,
    FetchDiagnoses,
    AddDiagnosis,
    DeleteDiagnosis,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::FetchPatients => "fetch_patients",
            Operation::FetchPatient => "fetch_patient",
            Operation::CreatePatient => "create_patient",
            Operation::UpdatePatient => "update_patient",
            Operation::DeletePatient => "delete_patient",
            Operation::FetchDiagnoses => "fetch_diagnoses",
            Operation::AddDiagnosis => "add_diagnosis",
            Operation::DeleteDiagnosis => "delete_diagnosis",
        };
        f.write_str(name)
    }
}

/// Notification published after the writer handles a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The store changed
    Changed(StoreChange),
    /// An operation failed; the store is unchanged
    Failed {
        operation: Operation,
        error: SyncError,
    },
}

/// Handle to an in-flight operation.
///
/// Dropping it does not cancel the operation.
#[derive(Debug)]
pub struct Pending {
    handle: JoinHandle<SyncResult<()>>,
}

impl Pending {
    /// Wait until the result has been merged into the store (or rejected).
    pub async fn wait(self) -> SyncResult<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Gateway task ended abnormally: {}", e);
                Err(SyncError::Shutdown)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct Inner<A> {
    api: A,
    store: Arc<RwLock<RecordStore>>,
    updates: mpsc::UnboundedSender<Completion>,
    events: broadcast::Sender<SyncEvent>,
    issued: Arc<AtomicU64>,
    runtime: Handle,
}

impl<A: RecordsApi> Inner<A> {
    fn next_issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Hand a result to the writer and wait for it to be applied.
    async fn commit(
        &self,
        operation: Operation,
        outcome: SyncResult<StoreUpdate>,
        fetch: Option<(FetchScope, u64)>,
    ) -> SyncResult<()> {
        let (ack, applied) = oneshot::channel();
        self.updates
            .send(Completion {
                operation,
                outcome,
                fetch,
                ack,
            })
            .map_err(|_| SyncError::Shutdown)?;
        applied.await.unwrap_or(Err(SyncError::Shutdown))
    }

    async fn fetch_patients(&self, issued: u64) -> SyncResult<()> {
        let outcome = self
            .api
            .list_patients()
            .await
            .map(StoreUpdate::ReplacePatients)
            .map_err(SyncError::from);
        self.commit(
            Operation::FetchPatients,
            outcome,
            Some((FetchScope::Patients, issued)),
        )
        .await
    }

    async fn fetch_diagnoses(
        &self,
        operation: Operation,
        patient_id: PatientId,
        issued: u64,
    ) -> SyncResult<()> {
        let outcome = self
            .api
            .list_diagnoses(patient_id)
            .await
            .map(|diagnoses| StoreUpdate::ReplaceDiagnoses {
                patient_id,
                diagnoses,
            })
            .map_err(SyncError::from);
        self.commit(
            operation,
            outcome,
            Some((FetchScope::Diagnoses(patient_id), issued)),
        )
        .await
    }

    async fn add_diagnosis(&self, patient_id: PatientId, name: String) -> SyncResult<()> {
        let outcome = self
            .api
            .create_diagnosis(patient_id, &Diagnosis::new(patient_id, name))
            .await
            .map(StoreUpdate::AppendDiagnosis)
            .map_err(SyncError::from);
        self.commit(Operation::AddDiagnosis, outcome, None).await
    }
}

/// Client-side synchronization layer over a [`RecordsApi`].
pub struct SyncGateway<A: RecordsApi> {
    inner: Arc<Inner<A>>,
}

impl<A: RecordsApi> Clone for SyncGateway<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: RecordsApi> SyncGateway<A> {
    /// Create a gateway on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(api: A) -> Self {
        Self::with_runtime(api, Handle::current())
    }

    /// Create a gateway whose tasks run on the given runtime.
    pub fn with_runtime(api: A, runtime: Handle) -> Self {
        let store = Arc::new(RwLock::new(RecordStore::new()));
        let (updates, queue) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let issued = Arc::new(AtomicU64::new(0));

        runtime.spawn(run_writer(
            queue,
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&issued),
        ));

        Self {
            inner: Arc::new(Inner {
                api,
                store,
                updates,
                events,
                issued,
                runtime,
            }),
        }
    }

    /// The underlying record service client.
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// Subscribe to store changes and failures.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    fn run<F, Fut>(&self, op: F) -> Pending
    where
        F: FnOnce(Arc<Inner<A>>) -> Fut,
        Fut: std::future::Future<Output = SyncResult<()>> + Send + 'static,
    {
        let handle = self.inner.runtime.spawn(op(Arc::clone(&self.inner)));
        Pending { handle }
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordStore> {
        self.inner.store.read().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn patients(&self) -> Vec<Patient> {
        self.read().patients().to_vec()
    }

    pub fn patient(&self, id: PatientId) -> Option<Patient> {
        self.read().patient(id).cloned()
    }

    /// All diagnoses, mixed across patients.
    pub fn diagnoses(&self) -> Vec<Diagnosis> {
        self.read().diagnoses().to_vec()
    }

    /// Diagnoses of one patient only.
    pub fn diagnoses_for(&self, patient_id: PatientId) -> Vec<Diagnosis> {
        self.read().diagnoses_for(patient_id)
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Replace the patient list with the server's.
    pub fn fetch_patients(&self) -> Pending {
        let issued = self.inner.next_issue();
        self.run(move |inner| async move { inner.fetch_patients(issued).await })
    }

    /// Refresh one patient from the server.
    pub fn fetch_patient(&self, id: PatientId) -> Pending {
        self.run(move |inner| async move {
            let outcome = inner
                .api
                .get_patient(id)
                .await
                .map(StoreUpdate::UpsertPatient)
                .map_err(SyncError::from);
            inner.commit(Operation::FetchPatient, outcome, None).await
        })
    }

    /// Create a patient; the server-assigned record is appended on success.
    pub fn create_patient(&self, name: &str, age: Option<i64>, ssn: &str) -> Pending {
        let patient = Patient::new(name, age, ssn);
        self.run(move |inner| async move {
            let outcome = inner
                .api
                .create_patient(&patient)
                .await
                .map(StoreUpdate::UpsertPatient)
                .map_err(SyncError::from);
            inner.commit(Operation::CreatePatient, outcome, None).await
        })
    }

    /// Send a full replacement for a stored patient.
    ///
    /// The matching entry is replaced on success; if it has since left the
    /// store nothing happens.
    pub fn update_patient(&self, id: PatientId, patient: Patient) -> Pending {
        self.run(move |inner| async move {
            let outcome = inner
                .api
                .update_patient(id, &patient)
                .await
                .map(StoreUpdate::ReplacePatient)
                .map_err(SyncError::from);
            inner.commit(Operation::UpdatePatient, outcome, None).await
        })
    }

    /// Delete a patient; removed locally only after the server confirms.
    pub fn delete_patient(&self, id: PatientId) -> Pending {
        self.run(move |inner| async move {
            let outcome = inner
                .api
                .delete_patient(id)
                .await
                .map(|()| StoreUpdate::RemovePatient(id))
                .map_err(SyncError::from);
            inner.commit(Operation::DeletePatient, outcome, None).await
        })
    }

    // =========================================================================
    // Diagnosis Operations
    // =========================================================================

    /// Replace the diagnoses of one patient with the server's.
    pub fn fetch_diagnoses(&self, patient_id: PatientId) -> Pending {
        let issued = self.inner.next_issue();
        self.run(move |inner| async move {
            inner
                .fetch_diagnoses(Operation::FetchDiagnoses, patient_id, issued)
                .await
        })
    }

    pub fn add_diagnosis(&self, patient_id: PatientId, name: &str) -> Pending {
        let name = name.to_string();
        self.run(move |inner| async move { inner.add_diagnosis(patient_id, name).await })
    }

    /// Delete a diagnosis, then refetch the patient's diagnoses so the store
    /// matches the server exactly.
    pub fn delete_diagnosis(&self, patient_id: PatientId, diagnosis_id: DiagnosisId) -> Pending {
        self.run(move |inner| async move {
            if let Err(error) = inner.api.delete_diagnosis(patient_id, diagnosis_id).await {
                return inner
                    .commit(Operation::DeleteDiagnosis, Err(error.into()), None)
                    .await;
            }
            let issued = inner.next_issue();
            inner
                .fetch_diagnoses(Operation::DeleteDiagnosis, patient_id, issued)
                .await
        })
    }

    /// Persist a diagnosis draft.
    pub fn submit_draft(&self, draft: &DiagnosisDraft) -> Pending {
        if draft.is_submittable() {
            return self.add_diagnosis(draft.patient_id, draft.name.trim());
        }
        let draft_id = draft.draft_id.clone();
        self.run(move |inner| async move {
            let error = SyncError::Rejected(format!("draft {} has no diagnosis name", draft_id));
            inner.commit(Operation::AddDiagnosis, Err(error), None).await
        })
    }

    /// Fetch all patients, then the diagnoses of every patient in the store.
    ///
    /// A step superseded by newer data counts as done. Resolves with the
    /// first failure, after every fetch has finished.
    pub fn refresh_all(&self) -> Pending {
        let issued = self.inner.next_issue();
        self.run(move |inner| async move {
            settled(inner.fetch_patients(issued).await)?;

            let ids: Vec<PatientId> = {
                let store = inner.store.read().unwrap_or_else(|e| e.into_inner());
                store.patients().iter().filter_map(Patient::id).collect()
            };

            let mut first_error = None;
            for id in ids {
                let issued = inner.next_issue();
                let result = inner
                    .fetch_diagnoses(Operation::FetchDiagnoses, id, issued)
                    .await;
                if let Err(error) = settled(result) {
                    first_error.get_or_insert(error);
                }
            }
            match first_error {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }
}

/// Treat a superseded result as success; the store already holds newer data.
fn settled(result: SyncResult<()>) -> SyncResult<()> {
    match result {
        Err(SyncError::Superseded) => Ok(()),
        other => other,
    }
}
