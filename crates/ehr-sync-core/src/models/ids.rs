//! Server-assigned identifiers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Server-assigned patient identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub i64);

/// Server-assigned diagnosis identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosisId(pub i64);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DiagnosisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an entity: unassigned until the server has stored it.
///
/// On the wire this is `null` (or a missing key) versus an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId<I> {
    Unassigned,
    Assigned(I),
}

impl<I: Copy> EntityId<I> {
    /// The assigned id, if any.
    pub fn get(&self) -> Option<I> {
        match self {
            EntityId::Unassigned => None,
            EntityId::Assigned(id) => Some(*id),
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, EntityId::Assigned(_))
    }
}

impl<I> Default for EntityId<I> {
    fn default() -> Self {
        EntityId::Unassigned
    }
}

impl<I> From<Option<I>> for EntityId<I> {
    fn from(value: Option<I>) -> Self {
        match value {
            Some(id) => EntityId::Assigned(id),
            None => EntityId::Unassigned,
        }
    }
}

impl<I: Serialize> Serialize for EntityId<I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EntityId::Unassigned => serializer.serialize_none(),
            EntityId::Assigned(id) => serializer.serialize_some(id),
        }
    }
}

impl<'de, I: Deserialize<'de>> Deserialize<'de> for EntityId<I> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<I>::deserialize(deserializer)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_serializes_as_null() {
        let id: EntityId<PatientId> = EntityId::Unassigned;
        assert_eq!(serde_json::to_string(&id).unwrap(), "null");
    }

    #[test]
    fn test_assigned_serializes_as_integer() {
        let id = EntityId::Assigned(PatientId(7));
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }

    #[test]
    fn test_deserialize_null_and_integer() {
        let none: EntityId<DiagnosisId> = serde_json::from_str("null").unwrap();
        assert_eq!(none, EntityId::Unassigned);

        let some: EntityId<DiagnosisId> = serde_json::from_str("12").unwrap();
        assert_eq!(some.get(), Some(DiagnosisId(12)));
        assert!(some.is_assigned());
    }
}
