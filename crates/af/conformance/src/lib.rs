//! Invariant suite for the Agentfield coordination core.
//!
//! Each invariant of the system is exercised as an independent assertion
//! over the public crate surfaces: replay purity, CAS mutual exclusion,
//! taint convergence, scope balance, lease semantics, and job locality.
//!
//! Run with: `cargo test -p af-conformance`

#![deny(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;

use af_ledger::MemoryLedger;
use af_service::{ProofService, ServiceConfig};
use af_types::{NodeId, NodeType};

/// A fresh in-memory service with the root conjecture in place.
pub fn fresh_service(conjecture: &str) -> ProofService {
    ProofService::init_with_ledger(
        Arc::new(MemoryLedger::new()),
        conjecture,
        "conformance",
        ServiceConfig::default(),
    )
    .expect("init must succeed on an empty ledger")
}

pub fn node_id(s: &str) -> NodeId {
    s.parse().expect("test node id must parse")
}

pub fn lease() -> Duration {
    Duration::minutes(5)
}

/// Claim `parent`, create `child` as a plain claim node, release.
pub fn grow(svc: &ProofService, parent: &str, child: &str) {
    let parent = node_id(parent);
    svc.claim_node(&parent, "grower", lease()).unwrap();
    svc.refine_node(
        &parent,
        "grower",
        &node_id(child),
        NodeType::Claim,
        &format!("statement of {child}"),
        "",
        BTreeSet::new(),
        vec![],
    )
    .unwrap();
    svc.release_node(&parent, "grower").unwrap();
}

/// Grow a whole subtree: each entry is `(parent, child)`.
pub fn grow_all(svc: &ProofService, edges: &[(&str, &str)]) {
    for (parent, child) in edges {
        grow(svc, parent, child);
    }
}
