use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use af_types::AfError;

use crate::config::{Hook, HookSink, HooksConfig};
use crate::payload::HookPayload;

/// Default per-hook bound.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches payloads to configured hooks, fire-and-forget.
///
/// Each matching hook runs on its own detached worker thread, bounded by
/// the engine's timeout. Nothing here ever delays or fails the caller.
pub struct HookEngine {
    hooks: Vec<Hook>,
    timeout: Duration,
}

impl HookEngine {
    pub fn new(config: HooksConfig, timeout: Duration) -> Self {
        HookEngine {
            hooks: config.hooks,
            timeout,
        }
    }

    /// Load from `.af/hooks.json`; a missing file yields an engine with no
    /// hooks.
    pub fn from_file(path: &Path) -> Result<Self, AfError> {
        Ok(Self::new(HooksConfig::load(path)?, DEFAULT_HOOK_TIMEOUT))
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Dispatch to every hook matching the payload's event kind. Returns
    /// the number of hooks dispatched; their outcomes are invisible.
    pub fn fire(&self, payload: &HookPayload) -> usize {
        let mut dispatched = 0;
        for hook in &self.hooks {
            if !hook.matches(&payload.event) {
                continue;
            }
            dispatched += 1;
            let hook = hook.clone();
            let payload = payload.clone();
            let timeout = self.timeout;
            std::thread::spawn(move || run_hook(&hook, &payload, timeout));
        }
        debug!(event = %payload.event, dispatched, "hooks fired");
        dispatched
    }
}

fn run_hook(hook: &Hook, payload: &HookPayload, timeout: Duration) {
    let outcome = match &hook.sink {
        HookSink::Command { program, args } => run_command(program, args, payload, timeout),
        HookSink::Webhook { url } => post_webhook(url, payload, timeout),
    };
    if let Err(reason) = outcome {
        warn!(hook = %hook.id, event = %payload.event, %reason, "hook failed");
    }
}

fn run_command(
    program: &str,
    args: &[String],
    payload: &HookPayload,
    timeout: Duration,
) -> Result<(), String> {
    let mut child = Command::new(program)
        .args(args)
        .envs(payload.env_vars())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("spawn failed: {e}"))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => return Err(format!("exited with {status}")),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("timed out after {timeout:?}"));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => return Err(format!("wait failed: {e}")),
        }
    }
}

fn post_webhook(url: &str, payload: &HookPayload, timeout: Duration) -> Result<(), String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("client build failed: {e}"))?;
    let response = client
        .post(url)
        .json(payload)
        .send()
        .map_err(|e| format!("post failed: {e}"))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("status {}", response.status()))
    }
}
