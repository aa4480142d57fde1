use af_types::{AfError, AfEvent, EventRecord};

/// Read boundary for ledger access.
pub trait LedgerReader: Send + Sync {
    /// All records in sequence order.
    fn read_all(&self) -> Result<Vec<EventRecord>, AfError>;

    /// Visit records in sequence order without materializing the whole log.
    fn scan(
        &self,
        visit: &mut dyn FnMut(&EventRecord) -> Result<(), AfError>,
    ) -> Result<(), AfError>;

    /// Records with `seq >= from_seq`, in order. Incremental consumers
    /// (caches, followers) use this to avoid re-reading the prefix they
    /// already hold.
    fn read_from(&self, from_seq: u64) -> Result<Vec<EventRecord>, AfError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.seq >= from_seq)
            .collect())
    }

    /// Current highest sequence number; 0 for an empty ledger.
    fn count(&self) -> Result<u64, AfError>;
}

/// Write boundary for ledger access.
pub trait LedgerWriter: Send + Sync {
    /// Append unconditionally; returns the newly assigned sequence.
    fn append(&self, event: AfEvent) -> Result<u64, AfError>;

    /// Compare-and-swap append: succeeds iff the latest sequence equals
    /// `expected_seq`, appending every event in `events` atomically and
    /// returning the new latest sequence. Otherwise leaves the log
    /// unchanged and returns `AfError::SequenceMismatch` (retriable).
    fn append_if_sequence(
        &self,
        events: Vec<AfEvent>,
        expected_seq: u64,
    ) -> Result<u64, AfError>;
}

/// Full ledger contract.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}
