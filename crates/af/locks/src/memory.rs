use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Duration;
use tracing::debug;

use af_types::{AfError, ClaimLock, NodeId};

use crate::manager::LockManager;

/// In-process lock manager: a mutex-guarded map of leases.
#[derive(Default)]
pub struct MemoryLockManager {
    table: Mutex<HashMap<NodeId, ClaimLock>>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked_table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<NodeId, ClaimLock>>, AfError> {
        self.table
            .lock()
            .map_err(|_| AfError::Corruption("lock table mutex poisoned".into()))
    }

    /// Overwrite the table entry with a lease the ledger has already
    /// decided on. Used by callers for whom the ledger, not this table, is
    /// the source of truth.
    pub fn mirror(&self, lock: ClaimLock) {
        if let Ok(mut table) = self.locked_table() {
            table.insert(lock.node_id.clone(), lock);
        }
    }

    /// Drop the table entry for a lease the ledger has already released.
    pub fn unmirror(&self, node: &NodeId) {
        if let Ok(mut table) = self.locked_table() {
            table.remove(node);
        }
    }
}

impl LockManager for MemoryLockManager {
    fn acquire(&self, node: &NodeId, owner: &str, ttl: Duration) -> Result<ClaimLock, AfError> {
        let mut table = self.locked_table()?;
        if let Some(existing) = table.get(node) {
            if !existing.is_expired() {
                return Err(AfError::AlreadyLocked {
                    node: node.clone(),
                    owner: existing.owner.clone(),
                });
            }
            debug!(node = %node, stale_owner = %existing.owner, "replacing expired lease");
        }
        let lock = ClaimLock::new(node.clone(), owner, ttl);
        table.insert(node.clone(), lock.clone());
        Ok(lock)
    }

    fn release(&self, node: &NodeId, owner: &str) -> Result<(), AfError> {
        let mut table = self.locked_table()?;
        match table.get(node) {
            None => Err(AfError::NotFound(format!("lock on node {node}"))),
            Some(existing) if existing.owner != owner => Err(AfError::NotOwner {
                node: node.clone(),
                owner: existing.owner.clone(),
                caller: owner.to_string(),
            }),
            Some(_) => {
                table.remove(node);
                Ok(())
            }
        }
    }

    fn get(&self, node: &NodeId) -> Result<Option<ClaimLock>, AfError> {
        Ok(self.locked_table()?.get(node).cloned())
    }

    fn reap_expired(&self) -> Result<Vec<ClaimLock>, AfError> {
        let mut table = self.locked_table()?;
        let expired: Vec<ClaimLock> = table
            .values()
            .filter(|l| l.is_expired())
            .cloned()
            .collect();
        for lock in &expired {
            table.remove(&lock.node_id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        id.parse().unwrap()
    }

    #[test]
    fn acquire_is_exclusive_while_live() {
        let mgr = MemoryLockManager::new();
        mgr.acquire(&node("1"), "a", Duration::minutes(5)).unwrap();
        let err = mgr
            .acquire(&node("1"), "b", Duration::minutes(5))
            .unwrap_err();
        assert!(matches!(err, AfError::AlreadyLocked { .. }));
        assert!(mgr.is_locked(&node("1")).unwrap());
    }

    #[test]
    fn expired_lease_is_replaced() {
        let mgr = MemoryLockManager::new();
        mgr.acquire(&node("1"), "a", Duration::milliseconds(10))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let lock = mgr.acquire(&node("1"), "b", Duration::minutes(1)).unwrap();
        assert_eq!(lock.owner, "b");
    }

    #[test]
    fn only_owner_releases() {
        let mgr = MemoryLockManager::new();
        mgr.acquire(&node("1"), "a", Duration::minutes(5)).unwrap();
        assert!(matches!(
            mgr.release(&node("1"), "b").unwrap_err(),
            AfError::NotOwner { .. }
        ));
        mgr.release(&node("1"), "a").unwrap();
        assert!(matches!(
            mgr.release(&node("1"), "a").unwrap_err(),
            AfError::NotFound(_)
        ));
    }

    #[test]
    fn reap_removes_only_expired() {
        let mgr = MemoryLockManager::new();
        mgr.acquire(&node("1"), "a", Duration::milliseconds(10))
            .unwrap();
        mgr.acquire(&node("1.1"), "b", Duration::minutes(5)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let reaped = mgr.reap_expired().unwrap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].node_id, node("1"));
        assert!(mgr.get(&node("1")).unwrap().is_none());
        assert!(mgr.is_locked(&node("1.1")).unwrap());
    }

    #[test]
    fn lease_timeout_scenario() {
        let mgr = MemoryLockManager::new();
        let lock = mgr
            .acquire(&node("1"), "prover", Duration::milliseconds(50))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(60));
        assert!(lock.is_expired());
        assert!(!mgr.is_locked(&node("1")).unwrap());

        let reaped = mgr.reap_expired().unwrap();
        assert_eq!(reaped.len(), 1);

        let fresh = mgr
            .acquire(&node("1"), "verifier", Duration::minutes(5))
            .unwrap();
        assert_eq!(fresh.owner, "verifier");
    }
}
