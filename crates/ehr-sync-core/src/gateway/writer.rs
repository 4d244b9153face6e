//! Single writer for the record store.
//!
//! Operation tasks never touch the store. They send a [`Completion`] down the
//! update queue and the writer applies completions one at a time, so every
//! mutation is serialized through one place.
//!
//! Fetches and confirmed mutations share one issue sequence. Applying either
//! raises the watermark of the scopes it touches, and a fetch issued below a
//! scope's watermark is discarded as superseded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{Operation, SyncError, SyncEvent, SyncResult};
use crate::models::PatientId;
use crate::store::{RecordStore, StoreUpdate};

/// State a fetch replaces wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FetchScope {
    Patients,
    Diagnoses(PatientId),
}

impl FetchScope {
    /// Scopes whose fetched snapshots a confirmed mutation invalidates.
    fn touched_by(update: &StoreUpdate) -> Vec<FetchScope> {
        match update {
            StoreUpdate::UpsertPatient(_) | StoreUpdate::ReplacePatient(_) => {
                vec![FetchScope::Patients]
            }
            StoreUpdate::RemovePatient(id) => {
                vec![FetchScope::Patients, FetchScope::Diagnoses(*id)]
            }
            StoreUpdate::AppendDiagnosis(diagnosis) => diagnosis
                .patient_id
                .map(FetchScope::Diagnoses)
                .into_iter()
                .collect(),
            StoreUpdate::ReplacePatients(_) | StoreUpdate::ReplaceDiagnoses { .. } => Vec::new(),
        }
    }
}

/// Result of one network round trip, on its way to the writer.
pub(crate) struct Completion {
    pub operation: Operation,
    pub outcome: SyncResult<StoreUpdate>,
    /// Scope and issue sequence number, for fetches
    pub fetch: Option<(FetchScope, u64)>,
    pub ack: oneshot::Sender<SyncResult<()>>,
}

pub(crate) async fn run_writer(
    mut updates: mpsc::UnboundedReceiver<Completion>,
    store: Arc<RwLock<RecordStore>>,
    events: broadcast::Sender<SyncEvent>,
    issued: Arc<AtomicU64>,
) {
    let mut writer = Writer {
        store,
        events,
        issued,
        watermarks: HashMap::new(),
    };
    while let Some(completion) = updates.recv().await {
        let ack = completion.ack;
        let result = writer.apply(completion.operation, completion.outcome, completion.fetch);
        // The issuing task may have been dropped; the store is updated either way.
        let _ = ack.send(result);
    }
    debug!("Update queue closed, writer exiting");
}

struct Writer {
    store: Arc<RwLock<RecordStore>>,
    events: broadcast::Sender<SyncEvent>,
    /// Issue sequence shared with the gateway
    issued: Arc<AtomicU64>,
    /// Highest issue sequence applied per fetch scope
    watermarks: HashMap<FetchScope, u64>,
}

impl Writer {
    fn apply(
        &mut self,
        operation: Operation,
        outcome: SyncResult<StoreUpdate>,
        fetch: Option<(FetchScope, u64)>,
    ) -> SyncResult<()> {
        let update = match outcome {
            Ok(update) => update,
            Err(error) => {
                warn!("{} failed: {}", operation, error);
                let _ = self.events.send(SyncEvent::Failed {
                    operation,
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        match fetch {
            Some((scope, issued)) => {
                let last = self.watermarks.entry(scope).or_insert(0);
                if issued < *last {
                    debug!(
                        "{} result #{} superseded by #{} for {:?}",
                        operation, issued, last, scope
                    );
                    return Err(SyncError::Superseded);
                }
                *last = issued;
            }
            None => {
                let scopes = FetchScope::touched_by(&update);
                if !scopes.is_empty() {
                    // Fetches already in flight were issued below this number.
                    let mark = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                    for scope in scopes {
                        self.watermarks.insert(scope, mark);
                    }
                }
            }
        }

        let change = {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            store.apply(update)
        };

        match change {
            Some(change) => {
                info!("{} applied: {:?}", operation, change);
                let _ = self.events.send(SyncEvent::Changed(change));
            }
            None => debug!("{} left the store unchanged", operation),
        }
        Ok(())
    }
}
