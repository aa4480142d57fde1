use chrono::Duration;

use af_types::{AfError, ClaimLock, NodeId};

/// Contract shared by every lock manager variant.
pub trait LockManager: Send + Sync {
    /// Acquire a lease on `node` for `owner`, expiring after `ttl`.
    ///
    /// Succeeds iff no lease exists or the existing lease has expired; an
    /// expired lease is replaced. Fails with `AlreadyLocked` otherwise.
    fn acquire(&self, node: &NodeId, owner: &str, ttl: Duration) -> Result<ClaimLock, AfError>;

    /// Release the lease on `node`. Only the owner may release.
    fn release(&self, node: &NodeId, owner: &str) -> Result<(), AfError>;

    /// The current lease on `node`, expired or not.
    fn get(&self, node: &NodeId) -> Result<Option<ClaimLock>, AfError>;

    /// True iff a non-expired lease is held on `node`.
    fn is_locked(&self, node: &NodeId) -> Result<bool, AfError> {
        Ok(self.get(node)?.map(|l| !l.is_expired()).unwrap_or(false))
    }

    /// Remove every currently expired lease and return them.
    fn reap_expired(&self) -> Result<Vec<ClaimLock>, AfError>;
}
