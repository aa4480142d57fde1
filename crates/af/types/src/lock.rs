use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// A time-leased exclusive claim on a node.
///
/// At most one non-expired lock exists per node; an expired lock is
/// semantically released and may be replaced by a new acquisition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimLock {
    pub node_id: NodeId,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClaimLock {
    pub fn new(node_id: NodeId, owner: impl Into<String>, ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        ClaimLock {
            node_id,
            owner: owner.into(),
            acquired_at,
            expires_at: acquired_at + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strict() {
        let lock = ClaimLock::new(NodeId::root(), "prover", Duration::seconds(60));
        assert!(!lock.is_expired_at(lock.expires_at));
        assert!(lock.is_expired_at(lock.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn serde_roundtrip() {
        let lock = ClaimLock::new(NodeId::root(), "prover", Duration::seconds(5));
        let json = serde_json::to_string(&lock).unwrap();
        let back: ClaimLock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lock);
    }
}
