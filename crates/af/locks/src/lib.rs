//! Time-leased exclusive claims on proof nodes.
//!
//! Three managers share one contract: acquisition succeeds iff the node is
//! unlocked or its lease has expired (an expired lease is transparently
//! replaced); only the owner releases; the reaper removes every expired
//! lease atomically.
//!
//! - [`MemoryLockManager`] — mutex-guarded map, single process.
//! - [`FileLockManager`] — one `<node>.lock` file per lease under a shared
//!   directory; anything not ending in `.lock` is ignored.
//! - [`PersistentLockManager`] — every acquire/release/reap is recorded
//!   through the ledger and the table is rebuilt by scanning, so the lease
//!   history is part of the proof's total order. Claim events are exclusive
//!   per node: either the service or a persistent manager owns a node's
//!   lease lifecycle, never both.

#![deny(unsafe_code)]

pub mod file;
pub mod manager;
pub mod memory;
pub mod persistent;

pub use file::FileLockManager;
pub use manager::LockManager;
pub use memory::MemoryLockManager;
pub use persistent::PersistentLockManager;
