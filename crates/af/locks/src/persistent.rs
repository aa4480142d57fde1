use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tracing::debug;

use af_ledger::Ledger;
use af_types::{AfError, AfEvent, ClaimLock, NodeId};

use crate::manager::LockManager;

const CAS_ATTEMPTS: u32 = 8;

/// Ledger-persistent lock manager.
///
/// Every acquire, release, and reap is recorded through the ledger
/// (`NodesClaimed`, `NodesReleased`, `LockReaped`), and the in-memory table
/// is rebuilt on construction by scanning. Between processes sharing a
/// ledger, linearizability follows from the ledger's CAS append: each
/// mutation re-reads the lease history at the current head and appends
/// conditionally on that head.
pub struct PersistentLockManager {
    ledger: Arc<dyn Ledger>,
    table: Mutex<HashMap<NodeId, ClaimLock>>,
}

impl PersistentLockManager {
    /// Rebuild the lease table from the ledger and wrap it.
    pub fn open(ledger: Arc<dyn Ledger>) -> Result<Self, AfError> {
        let (table, _) = Self::scan_table(ledger.as_ref())?;
        debug!(leases = table.len(), "persistent lock table rebuilt");
        Ok(PersistentLockManager {
            ledger,
            table: Mutex::new(table),
        })
    }

    /// Fold the lease-relevant events into a table, returning it together
    /// with the ledger head the fold observed.
    fn scan_table(ledger: &dyn Ledger) -> Result<(HashMap<NodeId, ClaimLock>, u64), AfError> {
        let mut table = HashMap::new();
        let mut head = 0;
        ledger.scan(&mut |record| {
            match &record.event {
                AfEvent::NodesClaimed {
                    node_ids,
                    owner,
                    expires_at,
                    timestamp,
                } => {
                    for id in node_ids {
                        table.insert(
                            id.clone(),
                            ClaimLock {
                                node_id: id.clone(),
                                owner: owner.clone(),
                                acquired_at: *timestamp,
                                expires_at: *expires_at,
                            },
                        );
                    }
                }
                AfEvent::NodesReleased { node_ids, .. } => {
                    for id in node_ids {
                        table.remove(id);
                    }
                }
                AfEvent::LockReaped {
                    node_id,
                    owner,
                    timestamp,
                } => {
                    let matches = table
                        .get(node_id)
                        .map(|l: &ClaimLock| &l.owner == owner && l.expires_at <= *timestamp)
                        .unwrap_or(false);
                    if matches {
                        table.remove(node_id);
                    }
                }
                _ => {}
            }
            head = record.seq;
            Ok(())
        })?;
        Ok((table, head))
    }

    /// Run one CAS mutation against the current lease history, retrying on
    /// sequence mismatch up to the attempt budget.
    fn mutate<T>(
        &self,
        mut build: impl FnMut(&HashMap<NodeId, ClaimLock>) -> Result<(Vec<AfEvent>, T), AfError>,
    ) -> Result<T, AfError> {
        let mut guard = self
            .table
            .lock()
            .map_err(|_| AfError::Corruption("persistent lock mutex poisoned".into()))?;

        for _ in 0..CAS_ATTEMPTS {
            let (fresh, head) = Self::scan_table(self.ledger.as_ref())?;
            let (events, value) = build(&fresh)?;
            if events.is_empty() {
                *guard = fresh;
                return Ok(value);
            }
            match self.ledger.append_if_sequence(events, head) {
                Ok(_) => {
                    let (updated, _) = Self::scan_table(self.ledger.as_ref())?;
                    *guard = updated;
                    return Ok(value);
                }
                Err(AfError::SequenceMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AfError::ConcurrentModification {
            attempts: CAS_ATTEMPTS,
        })
    }
}

impl LockManager for PersistentLockManager {
    fn acquire(&self, node: &NodeId, owner: &str, ttl: Duration) -> Result<ClaimLock, AfError> {
        self.mutate(|table| {
            let now = Utc::now();
            let mut events = Vec::new();
            if let Some(existing) = table.get(node) {
                if !existing.is_expired_at(now) {
                    return Err(AfError::AlreadyLocked {
                        node: node.clone(),
                        owner: existing.owner.clone(),
                    });
                }
                // Replacing an expired lease: reap it first so the claim
                // history stays well-formed under replay.
                events.push(AfEvent::LockReaped {
                    node_id: node.clone(),
                    owner: existing.owner.clone(),
                    timestamp: now,
                });
            }
            let lock = ClaimLock {
                node_id: node.clone(),
                owner: owner.to_string(),
                acquired_at: now,
                expires_at: now + ttl,
            };
            events.push(AfEvent::NodesClaimed {
                node_ids: vec![node.clone()],
                owner: owner.to_string(),
                expires_at: lock.expires_at,
                timestamp: now,
            });
            Ok((events, lock))
        })
    }

    fn release(&self, node: &NodeId, owner: &str) -> Result<(), AfError> {
        self.mutate(|table| {
            match table.get(node) {
                None => Err(AfError::NotFound(format!("lock on node {node}"))),
                Some(existing) if existing.owner != owner => Err(AfError::NotOwner {
                    node: node.clone(),
                    owner: existing.owner.clone(),
                    caller: owner.to_string(),
                }),
                Some(_) => Ok((
                    vec![AfEvent::NodesReleased {
                        node_ids: vec![node.clone()],
                        timestamp: Utc::now(),
                    }],
                    (),
                )),
            }
        })
    }

    fn get(&self, node: &NodeId) -> Result<Option<ClaimLock>, AfError> {
        let guard = self
            .table
            .lock()
            .map_err(|_| AfError::Corruption("persistent lock mutex poisoned".into()))?;
        Ok(guard.get(node).cloned())
    }

    fn reap_expired(&self) -> Result<Vec<ClaimLock>, AfError> {
        self.mutate(|table| {
            let now = Utc::now();
            let expired: Vec<ClaimLock> = table
                .values()
                .filter(|l| l.is_expired_at(now))
                .cloned()
                .collect();
            let events = expired
                .iter()
                .map(|l| AfEvent::LockReaped {
                    node_id: l.node_id.clone(),
                    owner: l.owner.clone(),
                    timestamp: now,
                })
                .collect();
            Ok((events, expired))
        })
    }
}
