use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use af_types::{Challenge, EpistemicState, Node, NodeId, TaintState, WorkflowState};

/// Who should pick a node up next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// An open challenge needs answering.
    Prover,
    /// The node awaits verification.
    Verifier,
}

/// One unit of available work, tagged with the node's current taint so
/// agents see "unresolved" on pending nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub node_id: NodeId,
    pub kind: JobKind,
    pub taint: TaintState,
}

/// Classify one node by purely local rules: non-pending or claimed nodes
/// carry no job; an open challenge makes a prover job; otherwise the node
/// awaits a verifier. Siblings and descendants never influence the result.
pub fn classify(node: &Node, open_challenges: usize) -> Option<JobKind> {
    if node.epistemic_state != EpistemicState::Pending
        || node.workflow_state == WorkflowState::Claimed
    {
        return None;
    }
    if open_challenges > 0 {
        Some(JobKind::Prover)
    } else {
        Some(JobKind::Verifier)
    }
}

/// Classify every node in the map, in id order.
pub fn detect_jobs(
    nodes: &BTreeMap<NodeId, Node>,
    challenges: &BTreeMap<String, Challenge>,
) -> Vec<Job> {
    nodes
        .values()
        .filter_map(|node| {
            let open = challenges
                .values()
                .filter(|c| c.is_open() && c.target_node == node.id)
                .count();
            classify(node, open).map(|kind| Job {
                node_id: node.id.clone(),
                kind,
                taint: node.taint_state,
            })
        })
        .collect()
}
