use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AfError;

/// Hierarchical proof-node identifier, e.g. `1.2.3`.
///
/// A `NodeId` is a non-empty sequence of positive integers whose first
/// element is always `1` (the root). Ancestry follows the prefix relation
/// and ordering is lexicographic by parts, so `1 < 1.1 < 1.2 < 1.10 < 2`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Vec<u32>);

impl NodeId {
    /// The root identifier, `1`.
    pub fn root() -> Self {
        NodeId(vec![1])
    }

    /// Parse a canonical dot-separated identifier.
    ///
    /// Rejects empty/whitespace input, empty parts (leading, trailing, or
    /// doubled dots), non-numeric or non-positive parts, and any identifier
    /// whose first part is not `1`.
    pub fn parse(s: &str) -> Result<Self, AfError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AfError::Validation("node id is empty".into()));
        }
        let mut parts = Vec::new();
        for piece in trimmed.split('.') {
            if piece.is_empty() {
                return Err(AfError::Validation(format!(
                    "node id {trimmed:?} contains an empty part"
                )));
            }
            let n: u32 = piece.parse().map_err(|_| {
                AfError::Validation(format!("node id part {piece:?} is not a positive integer"))
            })?;
            if n == 0 {
                return Err(AfError::Validation(format!(
                    "node id part in {trimmed:?} must be >= 1"
                )));
            }
            parts.push(n);
        }
        if parts[0] != 1 {
            return Err(AfError::Validation(format!(
                "node id {trimmed:?} must start with 1"
            )));
        }
        Ok(NodeId(parts))
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Depth in the tree; the root has depth 1.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The parent identifier, or `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        if self.is_root() {
            None
        } else {
            Some(NodeId(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The `n`-th child identifier (`n >= 1`).
    pub fn child(&self, n: u32) -> Result<NodeId, AfError> {
        if n == 0 {
            return Err(AfError::Validation("child index must be >= 1".into()));
        }
        let mut parts = self.0.clone();
        parts.push(n);
        Ok(NodeId(parts))
    }

    /// True iff `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &NodeId) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Deepest identifier that is a (non-strict) ancestor of both.
    pub fn common_ancestor(&self, other: &NodeId) -> NodeId {
        let shared = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count();
        // Both ids start with 1, so the shared prefix is never empty.
        NodeId(self.0[..shared].to_vec())
    }

    /// Chain of strict ancestors, nearest first (parent, grandparent, ..., root).
    pub fn ancestors(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.depth().saturating_sub(1));
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            out.push(p.clone());
            cur = p;
        }
        out
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl FromStr for NodeId {
    type Err = AfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::parse(s)
    }
}

// The JSON form is the canonical dot-separated string.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Structural role of a proof node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Claim,
    LocalAssume,
    LocalDischarge,
    Case,
    Definition,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Claim => "claim",
            NodeType::LocalAssume => "local_assume",
            NodeType::LocalDischarge => "local_discharge",
            NodeType::Case => "case",
            NodeType::Definition => "definition",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeType {
    type Err = AfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claim" => Ok(NodeType::Claim),
            "local_assume" => Ok(NodeType::LocalAssume),
            "local_discharge" => Ok(NodeType::LocalDischarge),
            "case" => Ok(NodeType::Case),
            "definition" => Ok(NodeType::Definition),
            other => Err(AfError::Validation(format!("unknown node type {other:?}"))),
        }
    }
}

/// Collaborative axis: who may edit the node right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Available,
    Claimed,
}

/// Truth axis. All states other than `Pending` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpistemicState {
    #[default]
    Pending,
    Validated,
    Admitted,
    Refuted,
    Archived,
}

impl EpistemicState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EpistemicState::Pending)
    }
}

/// Derived label tracking whether a node's validity rests on admitted
/// (unproven) ancestors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintState {
    #[default]
    Unresolved,
    Clean,
    SelfAdmitted,
    Tainted,
}

/// A proof node. Created once by a `NodeCreated` event and never deleted;
/// later events mutate individual fields through the projector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub statement: String,
    /// Opaque inference-rule tag; the core never interprets it.
    pub inference_tag: String,
    /// Logical dependencies, distinct from the parent/child tree.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<NodeId>,
    /// References to active `local_assume` nodes this node relies on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope_refs: Vec<String>,
    pub workflow_state: WorkflowState,
    pub epistemic_state: EpistemicState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_expires_at: Option<DateTime<Utc>>,
    pub taint_state: TaintState,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
}

impl Node {
    /// Build a fresh node in its birth state: available, pending, unresolved.
    pub fn new(
        id: NodeId,
        node_type: NodeType,
        statement: impl Into<String>,
        inference_tag: impl Into<String>,
        dependencies: BTreeSet<NodeId>,
        scope_refs: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AfError> {
        let statement = statement.into();
        if statement.trim().is_empty() {
            return Err(AfError::Validation(format!(
                "node {id} statement is empty"
            )));
        }
        let mut node = Node {
            id,
            node_type,
            statement,
            inference_tag: inference_tag.into(),
            dependencies,
            scope_refs,
            workflow_state: WorkflowState::Available,
            epistemic_state: EpistemicState::Pending,
            claimed_by: None,
            claim_expires_at: None,
            taint_state: TaintState::Unresolved,
            created_at,
            content_hash: String::new(),
        };
        node.content_hash = node.compute_content_hash();
        Ok(node)
    }

    /// BLAKE3 hash over the immutable content of the node: identity,
    /// structure, and statement. Workflow/epistemic/taint are excluded so
    /// the hash is stable across lifecycle transitions.
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"af-node-v1:");
        hasher.update(self.id.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.node_type.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.statement.as_bytes());
        hasher.update(b"|");
        hasher.update(self.inference_tag.as_bytes());
        for dep in &self.dependencies {
            hasher.update(b"|dep:");
            hasher.update(dep.to_string().as_bytes());
        }
        for sref in &self.scope_refs {
            hasher.update(b"|scope:");
            hasher.update(sref.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn is_claimed(&self) -> bool {
        self.workflow_state == WorkflowState::Claimed
    }
}
