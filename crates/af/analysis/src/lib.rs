//! Derived analyses over projected proof state.
//!
//! Everything here is a pure function of node/challenge snapshots: taint
//! propagation, dependency cycle detection, scope balance, and job
//! classification. No I/O, no clocks, no hidden state.

#![deny(unsafe_code)]

pub mod cycles;
pub mod jobs;
pub mod scope;
pub mod taint;

pub use cycles::DependencyGraph;
pub use jobs::{detect_jobs, Job, JobKind};
pub use scope::{validate_scope, validate_scope_balance, validate_scope_closure};
pub use taint::{compute_taint, propagate, propagate_with_events};
