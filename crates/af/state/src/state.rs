use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_types::{
    AfError, Challenge, ClaimLock, Definition, Lemma, Node, NodeId, ScopeEntry, Severity,
};

/// Proof-level metadata recorded by `ProofInitialized`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofMeta {
    pub conjecture: String,
    pub author: String,
    pub initialized_at: DateTime<Utc>,
}

/// The projected world: everything the ledger says, as of `latest_seq`.
///
/// Produced only by replay. Structural equality over all fields is the
/// definition of replay determinism.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub meta: Option<ProofMeta>,
    pub nodes: BTreeMap<NodeId, Node>,
    pub challenges: BTreeMap<String, Challenge>,
    pub definitions: BTreeMap<String, Definition>,
    pub lemmas: BTreeMap<String, Lemma>,
    /// Scope entries keyed by the `local_assume` node that opened them.
    pub scopes: BTreeMap<NodeId, ScopeEntry>,
    pub locks: BTreeMap<NodeId, ClaimLock>,
    pub latest_seq: u64,
}

impl State {
    pub fn node(&self, id: &NodeId) -> Result<&Node, AfError> {
        self.nodes
            .get(id)
            .ok_or_else(|| AfError::NotFound(format!("node {id}")))
    }

    pub fn challenge(&self, id: &str) -> Result<&Challenge, AfError> {
        self.challenges
            .get(id)
            .ok_or_else(|| AfError::NotFound(format!("challenge {id}")))
    }

    /// Open challenges targeting `id`.
    pub fn open_challenges_for(&self, id: &NodeId) -> Vec<&Challenge> {
        self.challenges
            .values()
            .filter(|c| c.is_open() && &c.target_node == id)
            .collect()
    }

    /// Count of open critical challenges targeting `id`.
    pub fn open_critical_count(&self, id: &NodeId) -> usize {
        self.open_challenges_for(id)
            .iter()
            .filter(|c| c.severity == Severity::Critical)
            .count()
    }

    /// Direct children of `parent` present in the tree.
    pub fn children_of(&self, parent: &NodeId) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.id.parent().as_ref() == Some(parent))
            .collect()
    }

    /// Strict descendants of `root`, ordered by id (hence by depth within
    /// each branch).
    pub fn descendants_of(&self, root: &NodeId) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| root.is_ancestor_of(&n.id))
            .collect()
    }

    /// Scope entries still active (not discharged).
    pub fn active_scopes(&self) -> Vec<&ScopeEntry> {
        self.scopes.values().filter(|s| s.is_active()).collect()
    }

    /// The lock table is secondary to the node records and must never
    /// contradict them: every claimed node has a matching lease and every
    /// lease points at a claimed node with the same owner and expiry.
    pub fn check_lock_consistency(&self) -> Result<(), AfError> {
        for node in self.nodes.values() {
            match node.workflow_state {
                af_types::WorkflowState::Claimed => {
                    let lock = self.locks.get(&node.id).ok_or_else(|| {
                        AfError::Corruption(format!(
                            "node {} is claimed but has no lease",
                            node.id
                        ))
                    })?;
                    if node.claimed_by.as_deref() != Some(lock.owner.as_str())
                        || node.claim_expires_at != Some(lock.expires_at)
                    {
                        return Err(AfError::Corruption(format!(
                            "lease on {} disagrees with the node record",
                            node.id
                        )));
                    }
                }
                af_types::WorkflowState::Available => {
                    if self.locks.contains_key(&node.id) {
                        return Err(AfError::Corruption(format!(
                            "node {} is available but still has a lease",
                            node.id
                        )));
                    }
                }
            }
        }
        for node_id in self.locks.keys() {
            if !self.nodes.contains_key(node_id) {
                return Err(AfError::Corruption(format!(
                    "lease on unknown node {node_id}"
                )));
            }
        }
        Ok(())
    }
}
