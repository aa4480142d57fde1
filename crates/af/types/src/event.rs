use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{Definition, Lemma};
use crate::challenge::{ChallengeFacet, Severity};
use crate::error::AfError;
use crate::node::{Node, NodeId, TaintState};

/// The closed union of ledger events.
///
/// The encoded form is stable: every record carries a `type` discriminator,
/// and replay of an unknown type fails loudly rather than skipping the
/// record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AfEvent {
    ProofInitialized {
        conjecture: String,
        author: String,
        timestamp: DateTime<Utc>,
    },
    /// Full node snapshot at birth.
    NodeCreated { node: Node },
    NodesClaimed {
        node_ids: Vec<NodeId>,
        owner: String,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    NodesReleased {
        node_ids: Vec<NodeId>,
        timestamp: DateTime<Utc>,
    },
    NodeValidated {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeAdmitted {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeRefuted {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeArchived {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    ChallengeRaised {
        id: String,
        node_id: NodeId,
        facet: ChallengeFacet,
        reason: String,
        #[serde(default)]
        severity: Severity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raised_by: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ChallengeResolved {
        challenge_id: String,
        timestamp: DateTime<Utc>,
    },
    ChallengeWithdrawn {
        challenge_id: String,
        timestamp: DateTime<Utc>,
    },
    DefAdded { def: Definition },
    LemmaExtracted { lemma: Lemma },
    TaintRecomputed {
        node_id: NodeId,
        new_taint: TaintState,
        timestamp: DateTime<Utc>,
    },
    LockReaped {
        node_id: NodeId,
        owner: String,
        timestamp: DateTime<Utc>,
    },
}

impl AfEvent {
    /// Snake-case discriminator, as written to the ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            AfEvent::ProofInitialized { .. } => "proof_initialized",
            AfEvent::NodeCreated { .. } => "node_created",
            AfEvent::NodesClaimed { .. } => "nodes_claimed",
            AfEvent::NodesReleased { .. } => "nodes_released",
            AfEvent::NodeValidated { .. } => "node_validated",
            AfEvent::NodeAdmitted { .. } => "node_admitted",
            AfEvent::NodeRefuted { .. } => "node_refuted",
            AfEvent::NodeArchived { .. } => "node_archived",
            AfEvent::ChallengeRaised { .. } => "challenge_raised",
            AfEvent::ChallengeResolved { .. } => "challenge_resolved",
            AfEvent::ChallengeWithdrawn { .. } => "challenge_withdrawn",
            AfEvent::DefAdded { .. } => "def_added",
            AfEvent::LemmaExtracted { .. } => "lemma_extracted",
            AfEvent::TaintRecomputed { .. } => "taint_recomputed",
            AfEvent::LockReaped { .. } => "lock_reaped",
        }
    }

    /// The node this event primarily concerns, when there is exactly one.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            AfEvent::NodeCreated { node } => Some(&node.id),
            AfEvent::NodeValidated { node_id, .. }
            | AfEvent::NodeAdmitted { node_id, .. }
            | AfEvent::NodeRefuted { node_id, .. }
            | AfEvent::NodeArchived { node_id, .. }
            | AfEvent::ChallengeRaised { node_id, .. }
            | AfEvent::TaintRecomputed { node_id, .. }
            | AfEvent::LockReaped { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// One ledger line: the event plus the sequence number the ledger assigned
/// on append. Sequence numbers are dense, start at 1, and are the sole
/// source of ordering truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub event: AfEvent,
}

impl EventRecord {
    /// Encode as a single newline-terminated JSON line.
    pub fn encode_line(&self) -> Result<String, AfError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one ledger line. Unknown event types and malformed records
    /// are `Corruption`: replay must fail loudly, never skip.
    pub fn decode_line(line: &str) -> Result<Self, AfError> {
        serde_json::from_str(line)
            .map_err(|e| AfError::Corruption(format!("undecodable ledger record: {e}")))
    }
}
