use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_types::{AfEvent, EpistemicState, EventRecord, NodeId, TaintState, WorkflowState};

use crate::state::State;

/// One row of the audit index: a human-scannable summary of a ledger
/// record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub summary: String,
}

/// Immutable sequence of record summaries, for audit and review tooling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditIndex {
    pub entries: Vec<AuditEntry>,
}

impl AuditIndex {
    /// Summarize every record, in sequence order. Deterministic: two
    /// builds over the same records are equal.
    pub fn build(records: &[EventRecord]) -> Self {
        let entries = records
            .iter()
            .map(|record| AuditEntry {
                seq: record.seq,
                kind: record.event.kind().to_string(),
                node_id: record.event.node_id().cloned(),
                challenge_id: challenge_id_of(&record.event),
                timestamp: timestamp_of(&record.event),
                summary: summarize(&record.event),
            })
            .collect();
        AuditIndex { entries }
    }
}

fn challenge_id_of(event: &AfEvent) -> Option<String> {
    match event {
        AfEvent::ChallengeRaised { id, .. } => Some(id.clone()),
        AfEvent::ChallengeResolved { challenge_id, .. }
        | AfEvent::ChallengeWithdrawn { challenge_id, .. } => Some(challenge_id.clone()),
        _ => None,
    }
}

fn timestamp_of(event: &AfEvent) -> Option<DateTime<Utc>> {
    match event {
        AfEvent::ProofInitialized { timestamp, .. }
        | AfEvent::NodesClaimed { timestamp, .. }
        | AfEvent::NodesReleased { timestamp, .. }
        | AfEvent::NodeValidated { timestamp, .. }
        | AfEvent::NodeAdmitted { timestamp, .. }
        | AfEvent::NodeRefuted { timestamp, .. }
        | AfEvent::NodeArchived { timestamp, .. }
        | AfEvent::ChallengeRaised { timestamp, .. }
        | AfEvent::ChallengeResolved { timestamp, .. }
        | AfEvent::ChallengeWithdrawn { timestamp, .. }
        | AfEvent::TaintRecomputed { timestamp, .. }
        | AfEvent::LockReaped { timestamp, .. } => Some(*timestamp),
        AfEvent::NodeCreated { node } => Some(node.created_at),
        AfEvent::DefAdded { def } => Some(def.created_at),
        AfEvent::LemmaExtracted { lemma } => Some(lemma.created_at),
    }
}

fn summarize(event: &AfEvent) -> String {
    match event {
        AfEvent::ProofInitialized { conjecture, author, .. } => {
            format!("{author} opened proof of {conjecture:?}")
        }
        AfEvent::NodeCreated { node } => {
            format!("{} created as {}", node.id, node.node_type)
        }
        AfEvent::NodesClaimed { node_ids, owner, .. } => {
            format!("{owner} claimed {}", join_ids(node_ids))
        }
        AfEvent::NodesReleased { node_ids, .. } => {
            format!("released {}", join_ids(node_ids))
        }
        AfEvent::NodeValidated { node_id, .. } => format!("{node_id} validated"),
        AfEvent::NodeAdmitted { node_id, .. } => format!("{node_id} admitted"),
        AfEvent::NodeRefuted { node_id, .. } => format!("{node_id} refuted"),
        AfEvent::NodeArchived { node_id, .. } => format!("{node_id} archived"),
        AfEvent::ChallengeRaised {
            id,
            node_id,
            severity,
            reason,
            ..
        } => format!("{id} ({severity:?}) on {node_id}: {reason}"),
        AfEvent::ChallengeResolved { challenge_id, .. } => format!("{challenge_id} resolved"),
        AfEvent::ChallengeWithdrawn { challenge_id, .. } => {
            format!("{challenge_id} withdrawn")
        }
        AfEvent::DefAdded { def } => format!("definition {} ({})", def.name, def.id),
        AfEvent::LemmaExtracted { lemma } => {
            format!("lemma {} from {}", lemma.id, lemma.source_node)
        }
        AfEvent::TaintRecomputed {
            node_id, new_taint, ..
        } => format!("{node_id} taint -> {new_taint:?}"),
        AfEvent::LockReaped { node_id, owner, .. } => {
            format!("reaped {owner}'s lease on {node_id}")
        }
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Aggregate counts over the current tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub pending: usize,
    pub validated: usize,
    pub admitted: usize,
    pub refuted: usize,
    pub archived: usize,
    pub claimed: usize,
    pub tainted: usize,
    pub open_challenges: usize,
    pub active_scopes: usize,
    pub max_depth: usize,
}

impl TreeStats {
    pub fn of(state: &State) -> Self {
        let mut stats = TreeStats {
            total_nodes: state.nodes.len(),
            open_challenges: state.challenges.values().filter(|c| c.is_open()).count(),
            active_scopes: state.active_scopes().len(),
            ..TreeStats::default()
        };
        for node in state.nodes.values() {
            match node.epistemic_state {
                EpistemicState::Pending => stats.pending += 1,
                EpistemicState::Validated => stats.validated += 1,
                EpistemicState::Admitted => stats.admitted += 1,
                EpistemicState::Refuted => stats.refuted += 1,
                EpistemicState::Archived => stats.archived += 1,
            }
            if node.workflow_state == WorkflowState::Claimed {
                stats.claimed += 1;
            }
            if matches!(
                node.taint_state,
                TaintState::Tainted | TaintState::SelfAdmitted
            ) {
                stats.tainted += 1;
            }
            stats.max_depth = stats.max_depth.max(node.id.depth());
        }
        stats
    }

    /// Fraction of settled (non-pending) nodes, 0.0..=1.0.
    pub fn settled_ratio(&self) -> f64 {
        if self.total_nodes == 0 {
            return 0.0;
        }
        let settled = self.total_nodes - self.pending;
        settled as f64 / self.total_nodes as f64
    }
}
