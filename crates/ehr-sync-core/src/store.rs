//! In-memory reflection of server state.
//!
//! The store holds the two published collections and is only ever mutated
//! through [`RecordStore::apply`], which reports what changed so observers
//! can be notified.

use serde::{Deserialize, Serialize};

use crate::models::{Diagnosis, Patient, PatientId};

/// A mutation derived from a completed server round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    /// Full patient list from the server; diagnoses of absent patients are dropped
    ReplacePatients(Vec<Patient>),
    /// Newly created (or freshly fetched) patient
    UpsertPatient(Patient),
    /// Server-confirmed replacement; ignored when the id is unknown
    ReplacePatient(Patient),
    /// Server-confirmed deletion
    RemovePatient(PatientId),
    /// Fresh diagnosis list for one patient
    ReplaceDiagnoses {
        patient_id: PatientId,
        diagnoses: Vec<Diagnosis>,
    },
    /// Newly created diagnosis
    AppendDiagnosis(Diagnosis),
}

/// What an applied update changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreChange {
    PatientsReplaced { count: usize },
    PatientAdded(PatientId),
    PatientUpdated(PatientId),
    PatientRemoved(PatientId),
    DiagnosesReplaced { patient_id: PatientId, count: usize },
    DiagnosisAdded(PatientId),
}

/// Owned state for patients and their diagnoses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    patients: Vec<Patient>,
    diagnoses: Vec<Diagnosis>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    /// All diagnoses, mixed across patients.
    pub fn diagnoses(&self) -> &[Diagnosis] {
        &self.diagnoses
    }

    pub fn patient(&self, id: PatientId) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id() == Some(id))
    }

    /// Diagnoses belonging to one patient, in arrival order.
    pub fn diagnoses_for(&self, patient_id: PatientId) -> Vec<Diagnosis> {
        self.diagnoses
            .iter()
            .filter(|d| d.belongs_to(patient_id))
            .cloned()
            .collect()
    }

    /// Apply an update. Returns `None` if nothing changed.
    pub fn apply(&mut self, update: StoreUpdate) -> Option<StoreChange> {
        match update {
            StoreUpdate::ReplacePatients(patients) => {
                self.patients.clear();
                for patient in patients {
                    self.upsert_patient(patient);
                }
                let kept = &self.patients;
                self.diagnoses.retain(|d| {
                    d.patient_id
                        .map_or(false, |pid| kept.iter().any(|p| p.id() == Some(pid)))
                });
                Some(StoreChange::PatientsReplaced {
                    count: self.patients.len(),
                })
            }
            StoreUpdate::UpsertPatient(patient) => {
                let id = patient.id()?;
                if self.upsert_patient(patient) {
                    Some(StoreChange::PatientUpdated(id))
                } else {
                    Some(StoreChange::PatientAdded(id))
                }
            }
            StoreUpdate::ReplacePatient(patient) => {
                let id = patient.id()?;
                let slot = self.patients.iter_mut().find(|p| p.id() == Some(id))?;
                *slot = patient;
                Some(StoreChange::PatientUpdated(id))
            }
            StoreUpdate::RemovePatient(id) => {
                let index = self.patients.iter().position(|p| p.id() == Some(id))?;
                self.patients.remove(index);
                self.diagnoses.retain(|d| !d.belongs_to(id));
                Some(StoreChange::PatientRemoved(id))
            }
            StoreUpdate::ReplaceDiagnoses {
                patient_id,
                diagnoses,
            } => {
                self.diagnoses.retain(|d| !d.belongs_to(patient_id));
                let fresh: Vec<Diagnosis> = diagnoses
                    .into_iter()
                    .filter(|d| d.belongs_to(patient_id))
                    .collect();
                let count = fresh.len();
                self.diagnoses.extend(fresh);
                Some(StoreChange::DiagnosesReplaced { patient_id, count })
            }
            StoreUpdate::AppendDiagnosis(diagnosis) => {
                let patient_id = diagnosis.patient_id?;
                if let Some(id) = diagnosis.id() {
                    if self.diagnoses.iter().any(|d| d.id() == Some(id)) {
                        return None;
                    }
                }
                self.diagnoses.push(diagnosis);
                Some(StoreChange::DiagnosisAdded(patient_id))
            }
        }
    }

    /// Insert or replace by id. Returns true if an existing entry was replaced.
    fn upsert_patient(&mut self, patient: Patient) -> bool {
        if let Some(slot) = self.patients.iter_mut().find(|p| p.same_entity(&patient)) {
            *slot = patient;
            true
        } else {
            self.patients.push(patient);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiagnosisId, EntityId};

    fn patient(id: i64, name: &str) -> Patient {
        Patient::new(name, Some(30), "000-00-0000").with_id(PatientId(id))
    }

    fn diagnosis(id: i64, patient_id: i64, name: &str) -> Diagnosis {
        Diagnosis {
            id: EntityId::Assigned(DiagnosisId(id)),
            name: name.to_string(),
            patient_id: Some(PatientId(patient_id)),
        }
    }

    #[test]
    fn test_replace_patients_dedupes_ids() {
        let mut store = RecordStore::new();
        let change = store.apply(StoreUpdate::ReplacePatients(vec![
            patient(1, "A"),
            patient(2, "B"),
            patient(1, "A2"),
        ]));
        assert_eq!(change, Some(StoreChange::PatientsReplaced { count: 2 }));
        assert_eq!(store.patient(PatientId(1)).unwrap().name, "A2");
    }

    #[test]
    fn test_upsert_known_id_replaces_in_place() {
        let mut store = RecordStore::new();
        store.apply(StoreUpdate::UpsertPatient(patient(1, "A")));
        let change = store.apply(StoreUpdate::UpsertPatient(patient(1, "A2")));
        assert_eq!(change, Some(StoreChange::PatientUpdated(PatientId(1))));
        assert_eq!(store.patients().len(), 1);
    }

    #[test]
    fn test_upsert_without_id_ignored() {
        let mut store = RecordStore::new();
        let change = store.apply(StoreUpdate::UpsertPatient(Patient::new("A", None, "1")));
        assert_eq!(change, None);
        assert!(store.patients().is_empty());
    }

    #[test]
    fn test_replace_unknown_patient_is_noop() {
        let mut store = RecordStore::new();
        store.apply(StoreUpdate::UpsertPatient(patient(1, "A")));
        let change = store.apply(StoreUpdate::ReplacePatient(patient(9, "Z")));
        assert_eq!(change, None);
        assert_eq!(store.patients(), &[patient(1, "A")]);
    }

    #[test]
    fn test_remove_patient_drops_its_diagnoses() {
        let mut store = RecordStore::new();
        store.apply(StoreUpdate::ReplacePatients(vec![patient(1, "A"), patient(2, "B")]));
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(10, 1, "J45 Asthma")));
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(11, 2, "I10 Hypertension")));

        let change = store.apply(StoreUpdate::RemovePatient(PatientId(1)));
        assert_eq!(change, Some(StoreChange::PatientRemoved(PatientId(1))));
        assert!(store.diagnoses_for(PatientId(1)).is_empty());
        assert_eq!(store.diagnoses_for(PatientId(2)).len(), 1);
    }

    #[test]
    fn test_replace_patients_drops_orphaned_diagnoses() {
        let mut store = RecordStore::new();
        store.apply(StoreUpdate::ReplacePatients(vec![patient(1, "A"), patient(2, "B")]));
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(10, 1, "J45 Asthma")));
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(11, 2, "I10 Hypertension")));

        store.apply(StoreUpdate::ReplacePatients(vec![patient(2, "B")]));

        assert!(store.diagnoses_for(PatientId(1)).is_empty());
        assert_eq!(store.diagnoses(), &[diagnosis(11, 2, "I10 Hypertension")]);
    }

    #[test]
    fn test_replace_diagnoses_only_touches_one_patient() {
        let mut store = RecordStore::new();
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(10, 1, "J45 Asthma")));
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(11, 2, "I10 Hypertension")));

        store.apply(StoreUpdate::ReplaceDiagnoses {
            patient_id: PatientId(1),
            diagnoses: vec![diagnosis(12, 1, "E11.9 Type 2 diabetes mellitus")],
        });
        store.apply(StoreUpdate::ReplaceDiagnoses {
            patient_id: PatientId(1),
            diagnoses: vec![diagnosis(12, 1, "E11.9 Type 2 diabetes mellitus")],
        });

        assert_eq!(store.diagnoses_for(PatientId(1)).len(), 1);
        assert_eq!(
            store.diagnoses_for(PatientId(2)),
            vec![diagnosis(11, 2, "I10 Hypertension")]
        );
    }

    #[test]
    fn test_replace_diagnoses_filters_foreign_entries() {
        let mut store = RecordStore::new();
        let change = store.apply(StoreUpdate::ReplaceDiagnoses {
            patient_id: PatientId(1),
            diagnoses: vec![diagnosis(10, 1, "J45 Asthma"), diagnosis(11, 2, "I10 Hypertension")],
        });
        assert_eq!(
            change,
            Some(StoreChange::DiagnosesReplaced {
                patient_id: PatientId(1),
                count: 1
            })
        );
        assert!(store.diagnoses_for(PatientId(2)).is_empty());
    }

    #[test]
    fn test_append_duplicate_diagnosis_ignored() {
        let mut store = RecordStore::new();
        store.apply(StoreUpdate::AppendDiagnosis(diagnosis(10, 1, "J45 Asthma")));
        let change = store.apply(StoreUpdate::AppendDiagnosis(diagnosis(10, 1, "J45 Asthma")));
        assert_eq!(change, None);
        assert_eq!(store.diagnoses().len(), 1);
    }
}
