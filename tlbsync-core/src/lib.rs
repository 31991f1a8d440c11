//! tlbsync core library: shared domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: formats, policies, fields and the [`SyncState`] snapshot
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / defaults for `~/.tlbsync/config.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{DataFormat, Field, ResolutionPolicy, SyncState, EMPTY_STRUCTURED};
