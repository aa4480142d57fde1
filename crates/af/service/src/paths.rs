use std::path::{Path, PathBuf};

use af_types::AfError;

/// Layout of a proof directory.
///
/// ```text
/// <proof_dir>/
///   ledger/            append-only event log
///   locks/             lock-file leases (optional, FileLockManager)
///   .af/pending_defs/  pending-definition sidecars
///   .af/hooks.json     hooks configuration
/// ```
#[derive(Clone, Debug)]
pub struct ProofPaths {
    pub root: PathBuf,
    pub ledger_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub af_dir: PathBuf,
    pub pending_defs_dir: PathBuf,
    pub hooks_file: PathBuf,
}

impl ProofPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let af_dir = root.join(".af");
        ProofPaths {
            ledger_dir: root.join("ledger"),
            locks_dir: root.join("locks"),
            pending_defs_dir: af_dir.join("pending_defs"),
            hooks_file: af_dir.join("hooks.json"),
            af_dir,
            root,
        }
    }

    /// Create the directory layout.
    pub fn ensure_layout(&self) -> Result<(), AfError> {
        std::fs::create_dir_all(&self.ledger_dir)?;
        std::fs::create_dir_all(&self.locks_dir)?;
        std::fs::create_dir_all(&self.pending_defs_dir)?;
        Ok(())
    }

    /// True once `init` has created the layout.
    pub fn is_initialized(&self) -> bool {
        self.ledger_dir.is_dir()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProofPaths::new(dir.path().join("proof"));
        assert!(!paths.is_initialized());
        paths.ensure_layout().unwrap();
        assert!(paths.is_initialized());
        assert!(paths.pending_defs_dir.is_dir());
        assert!(paths.locks_dir.is_dir());
        // Idempotent.
        paths.ensure_layout().unwrap();
    }
}
