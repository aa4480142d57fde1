use std::sync::Mutex;

use af_types::{AfError, AfEvent, EventRecord};

use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger used for tests, demos, and embedding.
///
/// Same contract as the file-backed ledger; durability is traded away, the
/// ordering and CAS semantics are identical.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<EventRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerReader for MemoryLedger {
    fn read_all(&self) -> Result<Vec<EventRecord>, AfError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AfError::Corruption("ledger mutex poisoned".into()))?;
        Ok(records.clone())
    }

    fn scan(
        &self,
        visit: &mut dyn FnMut(&EventRecord) -> Result<(), AfError>,
    ) -> Result<(), AfError> {
        for record in self.read_all()? {
            visit(&record)?;
        }
        Ok(())
    }

    fn count(&self) -> Result<u64, AfError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AfError::Corruption("ledger mutex poisoned".into()))?;
        Ok(records.last().map(|r| r.seq).unwrap_or(0))
    }
}

impl LedgerWriter for MemoryLedger {
    fn append(&self, event: AfEvent) -> Result<u64, AfError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AfError::Corruption("ledger mutex poisoned".into()))?;
        let seq = records.last().map(|r| r.seq).unwrap_or(0) + 1;
        records.push(EventRecord { seq, event });
        Ok(seq)
    }

    fn append_if_sequence(
        &self,
        events: Vec<AfEvent>,
        expected_seq: u64,
    ) -> Result<u64, AfError> {
        if events.is_empty() {
            return Err(AfError::Validation("no events to append".into()));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|_| AfError::Corruption("ledger mutex poisoned".into()))?;
        let actual = records.last().map(|r| r.seq).unwrap_or(0);
        if actual != expected_seq {
            return Err(AfError::SequenceMismatch {
                expected: expected_seq,
                actual,
            });
        }
        let mut seq = expected_seq;
        for event in events {
            seq += 1;
            records.push(EventRecord { seq, event });
        }
        Ok(seq)
    }
}
