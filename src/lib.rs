//! Webshell: self-update subsystem for a desktop shell hosting a web application
//!
//! The shell itself (windowing, navigation policy, menus) lives elsewhere and
//! calls into [`update::UpdateOrchestrator`] to check for and apply releases
//! published on GitHub. Two install modes are supported:
//! - unpacked source checkouts, updated by overlaying the release snapshot
//! - single-file AppImage binaries, replaced in place with a backup

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod update;

pub use config::{UpdateConfig, UpdateSettings};
pub use update::{UpdateError, UpdateOrchestrator, UpdateOutcome};
