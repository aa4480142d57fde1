use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_types::{id, AfError};

use crate::paths::ProofPaths;

/// A request for a definition that does not exist yet, written as a sidecar
/// file under `.af/pending_defs/` for external tooling to pick up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingDefRequest {
    pub id: String,
    pub term: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl PendingDefRequest {
    pub fn new(
        term: impl Into<String>,
        context: impl Into<String>,
        requested_by: Option<String>,
    ) -> Result<Self, AfError> {
        let term = term.into();
        if term.trim().is_empty() {
            return Err(AfError::Validation("pending definition term is empty".into()));
        }
        Ok(PendingDefRequest {
            id: id::request_id(),
            term,
            context: context.into(),
            requested_by,
            requested_at: Utc::now(),
        })
    }
}

/// Write one request file; returns the request.
pub fn write_request(
    paths: &ProofPaths,
    request: &PendingDefRequest,
) -> Result<(), AfError> {
    std::fs::create_dir_all(&paths.pending_defs_dir)?;
    let file = paths.pending_defs_dir.join(format!("{}.json", request.id));
    std::fs::write(&file, serde_json::to_string_pretty(request)?)?;
    Ok(())
}

/// All pending requests, oldest first. Files that do not parse are skipped.
pub fn list_requests(paths: &ProofPaths) -> Result<Vec<PendingDefRequest>, AfError> {
    if !paths.pending_defs_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut requests = Vec::new();
    for entry in std::fs::read_dir(&paths.pending_defs_dir)? {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read_to_string(entry.path())?;
        if let Ok(request) = serde_json::from_str::<PendingDefRequest>(&raw) {
            requests.push(request);
        }
    }
    requests.sort_by_key(|r| r.requested_at);
    Ok(requests)
}
