//! Diagnosis models for stored diagnoses and pending drafts.

use serde::{Deserialize, Serialize};

use super::ids::{DiagnosisId, EntityId, PatientId};

/// A diagnosis record attached to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    /// Server ID - unassigned until the server has stored the diagnosis
    #[serde(default)]
    pub id: EntityId<DiagnosisId>,
    /// Diagnosis text, typically "<ICD-10 code> <name>"
    pub name: String,
    /// Owning patient
    #[serde(default)]
    pub patient_id: Option<PatientId>,
}

impl Diagnosis {
    /// Create an unsaved diagnosis for a patient.
    pub fn new(patient_id: PatientId, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::Unassigned,
            name: name.into(),
            patient_id: Some(patient_id),
        }
    }

    /// The server-assigned id, if the diagnosis has been stored.
    pub fn id(&self) -> Option<DiagnosisId> {
        self.id.get()
    }

    /// Check if this diagnosis is associated with the given patient.
    pub fn belongs_to(&self, patient_id: PatientId) -> bool {
        self.patient_id == Some(patient_id)
    }
}

/// Where the name of a draft came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DraftSource {
    /// Typed in by the user
    Manual,
    /// Filled from the suggestion service
    Suggested,
}

/// A diagnosis being composed before it is sent to the server.
///
/// The user describes the condition, may ask the suggestion service for a
/// coded name, may edit that name, and finally submits the draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisDraft {
    /// Unique draft ID
    pub draft_id: String,
    /// Patient the diagnosis will be attached to
    pub patient_id: PatientId,
    /// Free-text description of the condition
    pub condition: String,
    /// Diagnosis name that will be stored
    pub name: String,
    /// Origin of `name`
    pub source: DraftSource,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl DiagnosisDraft {
    /// Create an empty draft for a patient.
    pub fn new(patient_id: PatientId) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            draft_id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            condition: String::new(),
            name: String::new(),
            source: DraftSource::Manual,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn set_condition(&mut self, condition: impl Into<String>) {
        self.condition = condition.into();
        self.touch();
    }

    /// Set the name by hand.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.source = DraftSource::Manual;
        self.touch();
    }

    /// Merge a suggestion into the draft, replacing the current name.
    pub fn apply_suggestion(&mut self, suggestion: impl Into<String>) {
        self.name = suggestion.into();
        self.source = DraftSource::Suggested;
        self.touch();
    }

    /// A draft can be submitted once it has a non-blank name.
    pub fn is_submittable(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// The diagnosis to send to the server.
    pub fn to_diagnosis(&self) -> Diagnosis {
        Diagnosis::new(self.patient_id, self.name.trim())
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
