use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::{debug, info, warn};

use af_types::{AfError, AfEvent, EventRecord};

use crate::traits::{LedgerReader, LedgerWriter};

const LOCK_FILE: &str = "ledger.lock";
const SEGMENT_PREFIX: &str = "events-";
const SEGMENT_SUFFIX: &str = ".jsonl";

/// Segment rotation threshold. Rotation happens between records, so total
/// event order is preserved by segment-index order.
const DEFAULT_MAX_SEGMENT_BYTES: u64 = 8 * 1024 * 1024;

/// File-backed append-only ledger.
///
/// Records live in one or more segment files (`events-000001.jsonl`, ...),
/// one newline-terminated JSON record per line; segment-index order
/// preserves total event order. Appends are serialized in-process by a
/// mutex and across processes by an exclusive `fs2` lock on a sidecar lock
/// file; the active segment is fsynced before an append is reported
/// successful. A compare-and-swap append re-reads the latest sequence
/// under the file lock, so two processes sharing the directory see a total
/// order.
pub struct FileLedger {
    dir: PathBuf,
    lock_path: PathBuf,
    max_segment_bytes: u64,
    write_guard: Mutex<()>,
}

impl FileLedger {
    /// Open (creating if needed) the ledger directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AfError> {
        Self::open_with(dir, DEFAULT_MAX_SEGMENT_BYTES)
    }

    /// Open with an explicit segment-rotation threshold.
    pub fn open_with(dir: impl Into<PathBuf>, max_segment_bytes: u64) -> Result<Self, AfError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let lock_path = dir.join(LOCK_FILE);
        let ledger = FileLedger {
            dir,
            lock_path,
            max_segment_bytes: max_segment_bytes.max(1),
            write_guard: Mutex::new(()),
        };
        let segments = ledger.list_segments()?;
        debug!(dir = %ledger.dir.display(), segments = segments.len(), "ledger opened");
        Ok(ledger)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True iff the ledger holds at least one record.
    pub fn is_empty(&self) -> Result<bool, AfError> {
        Ok(self.count()? == 0)
    }

    fn segment_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("{SEGMENT_PREFIX}{index:06}{SEGMENT_SUFFIX}"))
    }

    /// Segment indexes present on disk, ascending. Unknown files are
    /// ignored.
    fn list_segments(&self) -> Result<Vec<u64>, AfError> {
        let mut indexes = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(middle) = name
                .strip_prefix(SEGMENT_PREFIX)
                .and_then(|rest| rest.strip_suffix(SEGMENT_SUFFIX))
            {
                if let Ok(index) = middle.parse::<u64>() {
                    indexes.push(index);
                }
            }
        }
        indexes.sort_unstable();
        Ok(indexes)
    }

    fn acquire_file_lock(&self) -> Result<File, AfError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)?;
        lock_file.lock_exclusive()?;
        Ok(lock_file)
    }

    /// Stream every segment in order, visiting one decoded record at a
    /// time. A trailing line without a newline in the FINAL segment that
    /// fails to decode is an interrupted append and is treated as absent;
    /// damage anywhere else halts with `Corruption`. Sequence density
    /// across segment boundaries is verified as a side effect.
    fn scan_records(
        &self,
        visit: &mut dyn FnMut(&EventRecord) -> Result<(), AfError>,
    ) -> Result<u64, AfError> {
        let segments = self.list_segments()?;
        let mut last_seq = 0;
        for (position, index) in segments.iter().enumerate() {
            let is_final_segment = position == segments.len() - 1;
            let mut reader = BufReader::new(File::open(self.segment_path(*index))?);
            let mut line = String::new();
            let mut line_no = 0usize;
            loop {
                line.clear();
                let n = reader.read_line(&mut line)?;
                if n == 0 {
                    break;
                }
                line_no += 1;
                // read_line keeps the terminator, which is how a torn
                // final write is distinguished from a complete record.
                let complete = line.ends_with('\n');
                let trimmed = line.trim_end_matches(['\r', '\n']);
                if trimmed.trim().is_empty() {
                    continue;
                }
                match EventRecord::decode_line(trimmed) {
                    Ok(record) => {
                        let expected = last_seq + 1;
                        if record.seq != expected {
                            return Err(AfError::Corruption(format!(
                                "sequence gap in segment {index}: expected {expected}, found {} at line {line_no}",
                                record.seq,
                            )));
                        }
                        visit(&record)?;
                        last_seq = record.seq;
                    }
                    Err(e) => {
                        if is_final_segment && !complete {
                            warn!(segment = index, "dropping torn trailing ledger record");
                            break;
                        }
                        return Err(e);
                    }
                }
            }
        }
        Ok(last_seq)
    }

    fn load_records(&self) -> Result<Vec<EventRecord>, AfError> {
        let mut records = Vec::new();
        self.scan_records(&mut |record| {
            records.push(record.clone());
            Ok(())
        })?;
        Ok(records)
    }

    /// The segment new records go to, rotating when the active one has
    /// grown past the threshold. Called under the exclusive file lock.
    fn active_segment(&self) -> Result<PathBuf, AfError> {
        let segments = self.list_segments()?;
        let Some(last) = segments.last() else {
            return Ok(self.segment_path(1));
        };
        let path = self.segment_path(*last);
        let size = std::fs::metadata(&path)?.len();
        if size >= self.max_segment_bytes {
            let next = self.segment_path(last + 1);
            info!(from = *last, to = last + 1, size, "ledger segment rotated");
            Ok(next)
        } else {
            Ok(path)
        }
    }

    fn write_lines(&self, lines: &str) -> Result<(), AfError> {
        self.repair_tail()?;
        let path = self.active_segment()?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(lines.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Called under the exclusive file lock before any append. A final
    /// segment that does not end in a newline holds an interrupted append:
    /// if the tail decodes it only lost its terminator, otherwise it is
    /// truncated away.
    fn repair_tail(&self) -> Result<(), AfError> {
        let Some(last) = self.list_segments()?.last().copied() else {
            return Ok(());
        };
        let path = self.segment_path(last);
        let mut raw = String::new();
        File::open(&path)?.read_to_string(&mut raw)?;
        if raw.is_empty() || raw.ends_with('\n') {
            return Ok(());
        }
        let tail_start = raw.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if EventRecord::decode_line(&raw[tail_start..]).is_ok() {
            let mut file = OpenOptions::new().append(true).open(&path)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        } else {
            warn!(segment = last, offset = tail_start, "truncating torn trailing ledger record");
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(tail_start as u64)?;
            file.sync_all()?;
        }
        Ok(())
    }
}

impl LedgerReader for FileLedger {
    fn read_all(&self) -> Result<Vec<EventRecord>, AfError> {
        self.load_records()
    }

    fn scan(
        &self,
        visit: &mut dyn FnMut(&EventRecord) -> Result<(), AfError>,
    ) -> Result<(), AfError> {
        self.scan_records(visit)?;
        Ok(())
    }

    fn read_from(&self, from_seq: u64) -> Result<Vec<EventRecord>, AfError> {
        let mut records = Vec::new();
        self.scan_records(&mut |record| {
            if record.seq >= from_seq {
                records.push(record.clone());
            }
            Ok(())
        })?;
        Ok(records)
    }

    fn count(&self) -> Result<u64, AfError> {
        self.scan_records(&mut |_| Ok(()))
    }
}

impl LedgerWriter for FileLedger {
    fn append(&self, event: AfEvent) -> Result<u64, AfError> {
        let _serial = self
            .write_guard
            .lock()
            .map_err(|_| AfError::Corruption("ledger write mutex poisoned".into()))?;
        let lock_file = self.acquire_file_lock()?;

        let seq = self.count()? + 1;
        let record = EventRecord { seq, event };
        self.write_lines(&record.encode_line()?)?;
        debug!(seq, kind = record.event.kind(), "ledger append");

        FileExt::unlock(&lock_file)?;
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
        let _serial = self
            .write_guard
            .lock()
            .map_err(|_| AfError::Corruption("ledger write mutex poisoned".into()))?;
        let lock_file = self.acquire_file_lock()?;

        let actual = self.count()?;
        if actual != expected_seq {
            FileExt::unlock(&lock_file)?;
            return Err(AfError::SequenceMismatch {
                expected: expected_seq,
                actual,
            });
        }

        // One buffer, one write, one fsync: the batch is visible in its
        // entirety or not at all.
        let mut buffer = String::new();
        let mut seq = expected_seq;
        let mut kinds = Vec::with_capacity(events.len());
        for event in events {
            seq += 1;
            kinds.push(event.kind());
            buffer.push_str(&EventRecord { seq, event }.encode_line()?);
        }
        self.write_lines(&buffer)?;
        debug!(
            from = expected_seq + 1,
            to = seq,
            kinds = ?kinds,
            "ledger cas append"
        );

        FileExt::unlock(&lock_file)?;
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write as IoWrite;

    fn validated(id: &str) -> AfEvent {
        AfEvent::NodeValidated {
            node_id: id.parse().unwrap(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn append_assigns_dense_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger")).unwrap();

        assert_eq!(ledger.append(validated("1")).unwrap(), 1);
        assert_eq!(ledger.append(validated("1.1")).unwrap(), 2);
        assert_eq!(ledger.count().unwrap(), 2);

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn cas_append_succeeds_on_matching_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger")).unwrap();

        let seq = ledger
            .append_if_sequence(vec![validated("1"), validated("1.1")], 0)
            .unwrap();
        assert_eq!(seq, 2);
        assert_eq!(ledger.count().unwrap(), 2);
    }

    #[test]
    fn cas_append_rejects_stale_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger")).unwrap();
        ledger.append(validated("1")).unwrap();

        let err = ledger
            .append_if_sequence(vec![validated("1.1")], 0)
            .unwrap_err();
        assert!(matches!(
            err,
            AfError::SequenceMismatch {
                expected: 0,
                actual: 1
            }
        ));
        // The log is unchanged.
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[test]
    fn reopen_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        {
            let ledger = FileLedger::open(&path).unwrap();
            ledger.append(validated("1")).unwrap();
            ledger.append(validated("1.2")).unwrap();
        }
        let reopened = FileLedger::open(&path).unwrap();
        let records = reopened.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event.node_id().unwrap().to_string(), "1.2");
    }

    #[test]
    fn segments_rotate_and_preserve_total_order() {
        let dir = tempfile::tempdir().unwrap();
        // A tiny threshold so every couple of records rotates.
        let ledger = FileLedger::open_with(dir.path().join("ledger"), 200).unwrap();

        for i in 1..=20 {
            ledger.append(validated(&format!("1.{i}"))).unwrap();
        }

        let segments = ledger.list_segments().unwrap();
        assert!(segments.len() > 1, "expected rotation, got {segments:?}");

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 20);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.seq, i as u64 + 1);
        }

        // Reopen sees the same total order.
        let reopened = FileLedger::open_with(dir.path().join("ledger"), 200).unwrap();
        assert_eq!(reopened.read_all().unwrap(), records);
    }

    #[test]
    fn read_from_filters_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger")).unwrap();
        for i in 1..=5 {
            ledger.append(validated(&format!("1.{i}"))).unwrap();
        }
        let tail = ledger.read_from(4).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 4);
        assert!(ledger.read_from(99).unwrap().is_empty());
    }

    #[test]
    fn torn_trailing_record_is_invisible_and_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger")).unwrap();
        ledger.append(validated("1")).unwrap();

        // Simulate a crash mid-append: partial JSON, no trailing newline.
        let segment = dir.path().join("ledger").join("events-000001.jsonl");
        let mut file = OpenOptions::new().append(true).open(&segment).unwrap();
        file.write_all(b"{\"seq\":2,\"type\":\"node_vali").unwrap();
        drop(file);

        assert_eq!(ledger.count().unwrap(), 1);
        assert_eq!(ledger.read_all().unwrap().len(), 1);

        // The torn tail is repaired on the next append.
        assert_eq!(ledger.append(validated("1.1")).unwrap(), 2);
        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn interior_damage_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger")).unwrap();
        ledger.append(validated("1")).unwrap();
        ledger.append(validated("1.1")).unwrap();

        let segment = dir.path().join("ledger").join("events-000001.jsonl");
        let raw = std::fs::read_to_string(&segment).unwrap();
        let damaged = raw.replacen("node_validated", "node_vandalized", 1);
        std::fs::write(&segment, damaged).unwrap();

        assert!(matches!(
            ledger.read_all().unwrap_err(),
            AfError::Corruption(_)
        ));
    }

    #[test]
    fn concurrent_cas_has_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let ledger =
            std::sync::Arc::new(FileLedger::open(dir.path().join("ledger")).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = std::sync::Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                ledger.append_if_sequence(vec![validated("1")], 0)
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[test]
    fn two_handles_on_one_directory_cooperate() {
        // Two FileLedger instances over the same directory model two
        // processes sharing a proof.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        let a = FileLedger::open(&path).unwrap();
        let b = FileLedger::open(&path).unwrap();

        a.append_if_sequence(vec![validated("1")], 0).unwrap();
        // b's view includes a's append; a stale CAS from b loses.
        assert_eq!(b.count().unwrap(), 1);
        assert!(matches!(
            b.append_if_sequence(vec![validated("1.1")], 0).unwrap_err(),
            AfError::SequenceMismatch { .. }
        ));
        b.append_if_sequence(vec![validated("1.1")], 1).unwrap();
        assert_eq!(a.count().unwrap(), 2);
    }
}
