//! `mage-domain` — types shared by every MAGE client crate.
//!
//! - [`error`]: the workspace-wide [`Error`](error::Error) enum.
//! - [`config`]: the TOML configuration model.
//! - [`trace`]: structured [`TraceEvent`](trace::TraceEvent)s.

pub mod config;
pub mod error;
pub mod trace;
