//! Best-effort hook fan-out.
//!
//! Hooks are the only fan-out in the system and are deliberately invisible
//! to the caller's result: dispatch happens on detached worker threads with
//! a fixed per-hook timeout, and every failure is swallowed after a `warn!`.
//! Command hooks receive the payload as `AF_*` environment variables;
//! webhooks receive it as a JSON POST body.

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod payload;

pub use config::{Hook, HookSink, HooksConfig};
pub use dispatch::HookEngine;
pub use payload::HookPayload;
