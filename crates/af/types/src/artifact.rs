use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AfError;
use crate::id;
use crate::node::NodeId;

/// A named definition available to every node in the proof.
///
/// Content-addressed: the id is derived from `name` and `statement`, so the
/// same content always maps to the same id and duplicates are detectable
/// before they reach the ledger. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: String,
    pub name: String,
    pub statement: String,
    pub created_at: DateTime<Utc>,
}

impl Definition {
    pub fn new(
        name: impl Into<String>,
        statement: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AfError> {
        let name = name.into();
        let statement = statement.into();
        if name.trim().is_empty() {
            return Err(AfError::Validation("definition name is empty".into()));
        }
        if statement.trim().is_empty() {
            return Err(AfError::Validation(format!(
                "definition {name:?} statement is empty"
            )));
        }
        let id = id::definition_id(&name, &statement);
        Ok(Definition {
            id,
            name,
            statement,
            created_at,
        })
    }
}

/// A reusable result extracted from a finished subtree.
///
/// Carries the node it was extracted from. Ids are freshly generated, so two
/// extractions of the same statement from different nodes never collide.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: String,
    pub statement: String,
    pub source_node: NodeId,
    pub created_at: DateTime<Utc>,
}

impl Lemma {
    pub fn new(
        statement: impl Into<String>,
        source_node: NodeId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AfError> {
        let statement = statement.into();
        if statement.trim().is_empty() {
            return Err(AfError::Validation("lemma statement is empty".into()));
        }
        Ok(Lemma {
            id: id::lemma_id(),
            statement,
            source_node,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_id_is_content_addressed() {
        let now = Utc::now();
        let a = Definition::new("even", "n = 2k for some integer k", now).unwrap();
        let b = Definition::new("even", "n = 2k for some integer k", now).unwrap();
        let c = Definition::new("odd", "n = 2k + 1 for some integer k", now).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.id.starts_with("DEF-"));
    }

    #[test]
    fn definition_rejects_blank_fields() {
        let now = Utc::now();
        assert!(Definition::new(" ", "x", now).is_err());
        assert!(Definition::new("x", "\t", now).is_err());
    }

    #[test]
    fn lemma_ids_are_fresh() {
        let now = Utc::now();
        let a = Lemma::new("n + 1 is odd", NodeId::root(), now).unwrap();
        let b = Lemma::new("n + 1 is odd", "1.2".parse().unwrap(), now).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("LEM-"));
    }

    #[test]
    fn lemma_rejects_blank_statement() {
        assert!(Lemma::new("  ", NodeId::root(), Utc::now()).is_err());
    }
}
