//! The coordination core.
//!
//! `ProofService` composes the ledger, the projector, the lock manager,
//! and the derived analyses into atomic, retryable operations: claim,
//! release, refine, accept, admit, refute, archive, challenge lifecycle,
//! definition and lemma recording, and lease reaping. It is the only layer
//! that mutates durable state; everything it writes goes through a
//! compare-and-swap append at the sequence it projected.

#![deny(unsafe_code)]

pub mod config;
pub mod paths;
pub mod pending;
pub mod service;

pub use config::ServiceConfig;
pub use paths::ProofPaths;
pub use pending::PendingDefRequest;
pub use service::ProofService;
