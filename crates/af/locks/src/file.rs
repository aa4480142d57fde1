use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Duration;
use fs2::FileExt;
use tracing::{debug, warn};

use af_types::{AfError, ClaimLock, NodeId};

use crate::manager::LockManager;

const DIR_GUARD: &str = ".dirguard";
const LOCK_SUFFIX: &str = ".lock";

/// Directory-backed lock manager: one `<node>.lock` JSON file per lease.
///
/// Mutations are serialized in-process by a mutex and across processes by
/// an exclusive `fs2` lock on a guard file (deliberately not named
/// `*.lock`, so the reaper never confuses it with a lease). Files that do
/// not end in `.lock` are ignored; a lease file that no longer parses is
/// treated as absent.
pub struct FileLockManager {
    dir: PathBuf,
    guard_path: PathBuf,
    serial: Mutex<()>,
}

impl FileLockManager {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AfError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let guard_path = dir.join(DIR_GUARD);
        Ok(FileLockManager {
            dir,
            guard_path,
            serial: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self, node: &NodeId) -> PathBuf {
        self.dir.join(format!("{node}{LOCK_SUFFIX}"))
    }

    fn acquire_dir_guard(&self) -> Result<File, AfError> {
        let guard = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.guard_path)?;
        guard.lock_exclusive()?;
        Ok(guard)
    }

    fn read_lock_file(&self, path: &Path) -> Option<ClaimLock> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable lease file");
                None
            }
        }
    }

    fn write_lock_file(&self, lock: &ClaimLock) -> Result<(), AfError> {
        let path = self.lock_path(&lock.node_id);
        let body = serde_json::to_string_pretty(lock)?;
        std::fs::write(&path, body)?;
        Ok(())
    }

    /// All currently stored leases, skipping everything that is not a
    /// well-formed `<node>.lock` file.
    fn stored_locks(&self) -> Result<Vec<ClaimLock>, AfError> {
        let mut locks = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(LOCK_SUFFIX) {
                continue;
            }
            if let Some(lock) = self.read_lock_file(&entry.path()) {
                locks.push(lock);
            }
        }
        locks.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(locks)
    }
}

impl LockManager for FileLockManager {
    fn acquire(&self, node: &NodeId, owner: &str, ttl: Duration) -> Result<ClaimLock, AfError> {
        let _serial = self
            .serial
            .lock()
            .map_err(|_| AfError::Corruption("lock dir mutex poisoned".into()))?;
        let guard = self.acquire_dir_guard()?;

        if let Some(existing) = self.read_lock_file(&self.lock_path(node)) {
            if !existing.is_expired() {
                FileExt::unlock(&guard)?;
                return Err(AfError::AlreadyLocked {
                    node: node.clone(),
                    owner: existing.owner,
                });
            }
            debug!(node = %node, stale_owner = %existing.owner, "replacing expired lease file");
        }

        let lock = ClaimLock::new(node.clone(), owner, ttl);
        self.write_lock_file(&lock)?;
        FileExt::unlock(&guard)?;
        Ok(lock)
    }

    fn release(&self, node: &NodeId, owner: &str) -> Result<(), AfError> {
        let _serial = self
            .serial
            .lock()
            .map_err(|_| AfError::Corruption("lock dir mutex poisoned".into()))?;
        let guard = self.acquire_dir_guard()?;

        let path = self.lock_path(node);
        let result = match self.read_lock_file(&path) {
            None => Err(AfError::NotFound(format!("lock on node {node}"))),
            Some(existing) if existing.owner != owner => Err(AfError::NotOwner {
                node: node.clone(),
                owner: existing.owner,
                caller: owner.to_string(),
            }),
            Some(_) => {
                std::fs::remove_file(&path)?;
                Ok(())
            }
        };

        FileExt::unlock(&guard)?;
        result
    }

    fn get(&self, node: &NodeId) -> Result<Option<ClaimLock>, AfError> {
        Ok(self.read_lock_file(&self.lock_path(node)))
    }

    fn reap_expired(&self) -> Result<Vec<ClaimLock>, AfError> {
        let _serial = self
            .serial
            .lock()
            .map_err(|_| AfError::Corruption("lock dir mutex poisoned".into()))?;
        let guard = self.acquire_dir_guard()?;

        let mut reaped = Vec::new();
        for lock in self.stored_locks()? {
            if lock.is_expired() {
                std::fs::remove_file(self.lock_path(&lock.node_id))?;
                reaped.push(lock);
            }
        }

        FileExt::unlock(&guard)?;
        Ok(reaped)
    }
}
