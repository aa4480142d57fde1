//! Canonical Agentfield type system.
//!
//! This crate provides:
//! - hierarchical node identifiers (`NodeId`) with ordering and ancestry
//! - the proof-node record and its workflow/epistemic/taint axes
//! - challenges, definitions, lemmas, scope entries, and claim locks
//! - the closed ledger event union (`AfEvent`) and its line encoding
//! - the shared error surface (`AfError`)

#![deny(unsafe_code)]

pub mod artifact;
pub mod challenge;
pub mod error;
pub mod event;
pub mod id;
pub mod lock;
pub mod node;
pub mod scope;

pub use artifact::{Definition, Lemma};
pub use challenge::{Challenge, ChallengeFacet, ChallengeStatus, Severity};
pub use error::AfError;
pub use event::{AfEvent, EventRecord};
pub use lock::ClaimLock;
pub use node::{EpistemicState, Node, NodeId, NodeType, TaintState, WorkflowState};
pub use scope::ScopeEntry;
