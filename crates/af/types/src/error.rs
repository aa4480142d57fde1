use thiserror::Error;

use crate::node::NodeId;

/// Errors surfaced by the Agentfield core.
///
/// `SequenceMismatch` is a normal, retriable outcome of a CAS append and is
/// recovered internally by the service retry loop; every other kind
/// propagates to the caller.
#[derive(Debug, Error)]
pub enum AfError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("node {node} is locked by {owner}, not by {caller}")]
    NotOwner {
        node: NodeId,
        owner: String,
        caller: String,
    },

    #[error("node {node} is already locked by {owner}")]
    AlreadyLocked { node: NodeId, owner: String },

    #[error("node {node} has {open_critical} open critical challenge(s)")]
    BlockingChallenges { node: NodeId, open_critical: usize },

    #[error("concurrent modification: ledger advanced during all {attempts} attempts")]
    ConcurrentModification { attempts: u32 },

    #[error("sequence mismatch: expected latest seq {expected}, found {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },

    #[error("dependency cycle: {}", format_path(.path))]
    Cycle { path: Vec<NodeId> },

    #[error("scope unbalanced: {assumes} local_assume vs {discharges} local_discharge")]
    ScopeUnbalanced { assumes: usize, discharges: usize },

    #[error("scope already discharged: {0}")]
    ScopeClosed(String),

    #[error("scope still open: {0}")]
    ScopeOpen(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger corruption: {0}")]
    Corruption(String),
}

impl AfError {
    /// True for outcomes the service retry loop may recover from.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AfError::SequenceMismatch { .. })
    }
}

impl From<serde_json::Error> for AfError {
    fn from(e: serde_json::Error) -> Self {
        AfError::Serialization(e.to_string())
    }
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_mismatch_is_retriable() {
        let err = AfError::SequenceMismatch {
            expected: 4,
            actual: 5,
        };
        assert!(err.is_retriable());
        assert!(!AfError::NotFound("1.2".into()).is_retriable());
    }

    #[test]
    fn cycle_message_renders_path() {
        let path = vec![
            "1.1".parse().unwrap(),
            "1.2".parse().unwrap(),
            "1.1".parse().unwrap(),
        ];
        let err = AfError::Cycle { path };
        assert_eq!(err.to_string(), "dependency cycle: 1.1 -> 1.2 -> 1.1");
    }
}
