//! Deterministic projection: the event ledger folded into proof state.
//!
//! `replay` is a pure function of the ledger's bytes; two observers reading
//! the same records derive structurally equal state. The optional cache is
//! an optimization guarded by the latest sequence number, never a source of
//! truth.

#![deny(unsafe_code)]

pub mod cache;
pub mod replay;
pub mod report;
pub mod state;

pub use cache::StateCache;
pub use replay::{apply_record, replay, replay_records, replay_with_verify};
pub use report::{AuditEntry, AuditIndex, TreeStats};
pub use state::{ProofMeta, State};
