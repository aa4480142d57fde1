use std::sync::{Arc, RwLock};

use af_ledger::LedgerReader;
use af_types::AfError;

use crate::replay::replay;
use crate::state::State;

/// Sequence-guarded projection cache.
///
/// Holds the last replayed state together with the sequence it was built
/// at; `current` re-replays only when the ledger has advanced. The cache is
/// a private per-process optimization and never a source of truth: callers
/// composing a CAS append must still pass the state's `latest_seq` as the
/// expected sequence.
#[derive(Default)]
pub struct StateCache {
    inner: RwLock<Option<Arc<State>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state as of the ledger's current head.
    ///
    /// A cached projection behind the head is advanced by applying only
    /// the record suffix it has not seen; a missing or implausible cache
    /// falls back to a full replay.
    pub fn current(&self, ledger: &dyn LedgerReader) -> Result<Arc<State>, AfError> {
        let head = ledger.count()?;
        let behind = {
            let guard = self
                .inner
                .read()
                .map_err(|_| AfError::Corruption("state cache poisoned".into()))?;
            match guard.as_ref() {
                Some(state) if state.latest_seq == head => return Ok(Arc::clone(state)),
                Some(state) if state.latest_seq < head => Some(Arc::clone(state)),
                _ => None,
            }
        };

        let fresh = match behind {
            Some(cached) => {
                let mut next = (*cached).clone();
                for record in ledger.read_from(cached.latest_seq + 1)? {
                    crate::replay::apply_record(&mut next, &record)?;
                }
                Arc::new(next)
            }
            None => Arc::new(replay(ledger)?),
        };
        let mut guard = self
            .inner
            .write()
            .map_err(|_| AfError::Corruption("state cache poisoned".into()))?;
        // Another thread may have refreshed further while we replayed; keep
        // whichever projection is newer.
        let keep_existing = guard
            .as_ref()
            .map(|s| s.latest_seq > fresh.latest_seq)
            .unwrap_or(false);
        if !keep_existing {
            *guard = Some(Arc::clone(&fresh));
        }
        Ok(fresh)
    }

    /// Drop the cached projection (tests, explicit invalidation).
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }
}
