use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use af_types::AfEvent;

/// What a hook receives: the event kind, the affected node, the challenge
/// when there is one, and free-form key/value details.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HookPayload {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl HookPayload {
    /// Build the standard payload for a ledger event.
    pub fn for_event(event: &AfEvent, timestamp: DateTime<Utc>) -> Self {
        let challenge_id = match event {
            AfEvent::ChallengeRaised { id, .. } => Some(id.clone()),
            AfEvent::ChallengeResolved { challenge_id, .. }
            | AfEvent::ChallengeWithdrawn { challenge_id, .. } => Some(challenge_id.clone()),
            _ => None,
        };
        HookPayload {
            event: event.kind().to_string(),
            node_id: event.node_id().map(|id| id.to_string()),
            challenge_id,
            timestamp,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Environment bindings for command hooks: `AF_EVENT`, `AF_NODE_ID`,
    /// `AF_CHALLENGE_ID`, `AF_TIMESTAMP`, plus `AF_<KEY>` per detail.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![("AF_EVENT".to_string(), self.event.clone())];
        if let Some(node_id) = &self.node_id {
            vars.push(("AF_NODE_ID".to_string(), node_id.clone()));
        }
        if let Some(challenge_id) = &self.challenge_id {
            vars.push(("AF_CHALLENGE_ID".to_string(), challenge_id.clone()));
        }
        vars.push((
            "AF_TIMESTAMP".to_string(),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        for (key, value) in &self.details {
            vars.push((format!("AF_{}", key.to_uppercase()), value.clone()));
        }
        vars
    }
}
