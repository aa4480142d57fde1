use std::path::Path;

use serde::{Deserialize, Serialize};

use af_types::AfError;

/// Where a hook delivers its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSink {
    /// Run a program with `AF_*` environment variables set.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// POST the payload as JSON.
    Webhook { url: String },
}

/// One configured hook: an id, an event filter (`*` matches everything),
/// and a sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: String,
    pub event: String,
    #[serde(flatten)]
    pub sink: HookSink,
}

impl Hook {
    pub fn matches(&self, event_kind: &str) -> bool {
        self.event == "*" || self.event == event_kind
    }
}

/// Contents of `.af/hooks.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub hooks: Vec<Hook>,
}

impl HooksConfig {
    /// Load the config; a missing file means no hooks.
    pub fn load(path: &Path) -> Result<Self, AfError> {
        if !path.exists() {
            return Ok(HooksConfig::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AfError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Register a hook with a freshly generated `hook-<hex>` id and
    /// return it.
    pub fn register(&mut self, event: impl Into<String>, sink: HookSink) -> &Hook {
        let hook = Hook {
            id: af_types::id::hook_id(),
            event: event.into(),
            sink,
        };
        self.hooks.push(hook);
        self.hooks.last().expect("just pushed")
    }

    /// Remove a hook by id; true iff it existed.
    pub fn remove(&mut self, hook_id: &str) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|h| h.id != hook_id);
        self.hooks.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_sinks() {
        let raw = r#"{
            "hooks": [
                {"id": "hook-1a2b", "event": "node_validated",
                 "command": {"program": "notify", "args": ["--proof"]}},
                {"id": "hook-3c4d", "event": "*",
                 "webhook": {"url": "http://localhost:9999/af"}}
            ]
        }"#;
        let config: HooksConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.hooks.len(), 2);
        assert!(matches!(config.hooks[0].sink, HookSink::Command { .. }));
        assert!(matches!(config.hooks[1].sink, HookSink::Webhook { .. }));
    }

    #[test]
    fn wildcard_matches_everything() {
        let hook = Hook {
            id: "hook-ffff".into(),
            event: "*".into(),
            sink: HookSink::Webhook {
                url: "http://example.invalid".into(),
            },
        };
        assert!(hook.matches("node_validated"));
        assert!(hook.matches("lock_reaped"));

        let narrow = Hook {
            event: "node_admitted".into(),
            ..hook
        };
        assert!(narrow.matches("node_admitted"));
        assert!(!narrow.matches("node_validated"));
    }

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = HooksConfig::load(&dir.path().join("hooks.json")).unwrap();
        assert!(config.hooks.is_empty());
    }

    #[test]
    fn register_assigns_fresh_ids() {
        let mut config = HooksConfig::default();
        let id_a = config
            .register(
                "node_validated",
                HookSink::Command {
                    program: "notify".into(),
                    args: vec![],
                },
            )
            .id
            .clone();
        let id_b = config
            .register(
                "*",
                HookSink::Webhook {
                    url: "http://localhost:9000/af".into(),
                },
            )
            .id
            .clone();
        assert!(id_a.starts_with("hook-"));
        assert_ne!(id_a, id_b);
        assert_eq!(config.hooks.len(), 2);

        assert!(config.remove(&id_a));
        assert!(!config.remove(&id_a));
        assert_eq!(config.hooks.len(), 1);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".af").join("hooks.json");
        let config = HooksConfig {
            hooks: vec![Hook {
                id: "hook-0001".into(),
                event: "challenge_raised".into(),
                sink: HookSink::Command {
                    program: "true".into(),
                    args: vec![],
                },
            }],
        };
        config.save(&path).unwrap();
        assert_eq!(HooksConfig::load(&path).unwrap(), config);
    }
}
