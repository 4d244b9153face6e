//! Patient models.

use serde::{Deserialize, Serialize};

use super::ids::{EntityId, PatientId};

/// A patient record as exchanged with the record service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Server ID - unassigned until the server has stored the patient
    #[serde(default)]
    pub id: EntityId<PatientId>,
    /// Patient name
    pub name: String,
    /// Age in years
    #[serde(default)]
    pub age: Option<i64>,
    /// Social security number
    pub ssn: String,
}

impl Patient {
    /// Create a patient that has not been sent to the server yet.
    pub fn new(name: impl Into<String>, age: Option<i64>, ssn: impl Into<String>) -> Self {
        Self {
            id: EntityId::Unassigned,
            name: name.into(),
            age,
            ssn: ssn.into(),
        }
    }

    /// The server-assigned id, if the patient has been stored.
    pub fn id(&self) -> Option<PatientId> {
        self.id.get()
    }

    /// Copy of this patient carrying the given id.
    pub fn with_id(mut self, id: PatientId) -> Self {
        self.id = EntityId::Assigned(id);
        self
    }

    /// Same entity as `other` (both stored under the same id).
    pub fn same_entity(&self, other: &Patient) -> bool {
        matches!((self.id(), other.id()), (Some(a), Some(b)) if a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("Jane Doe", Some(40), "000-00-0000");
        assert_eq!(patient.name, "Jane Doe");
        assert_eq!(patient.age, Some(40));
        assert_eq!(patient.id(), None);
    }

    #[test]
    fn test_create_body_sends_null_id() {
        let patient = Patient::new("Jane Doe", Some(40), "000-00-0000");
        let json = serde_json::to_value(&patient).unwrap();
        assert!(json["id"].is_null());
        assert_eq!(json["ssn"], "000-00-0000");
    }

    #[test]
    fn test_decode_server_patient() {
        let json = r#"{"id":7,"name":"Jane Doe","age":null,"ssn":"000-00-0000"}"#;
        let patient: Patient = serde_json::from_str(json).unwrap();
        assert_eq!(patient.id(), Some(PatientId(7)));
        assert_eq!(patient.age, None);
    }

    #[test]
    fn test_same_entity_requires_assigned_ids() {
        let a = Patient::new("A", None, "1");
        let b = Patient::new("B", None, "2");
        assert!(!a.same_entity(&b));

        let a = a.with_id(PatientId(3));
        let b = b.with_id(PatientId(3));
        assert!(a.same_entity(&b));
    }
}
