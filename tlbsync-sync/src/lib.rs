//! # tlbsync-sync
//!
//! Keeps a TL-B schema, a bag-of-cells payload and its JSON view consistent.
//!
//! [`Synchronizer`] is the pure request/response core; [`EditSession`] wraps
//! it for an interactive shell (per-field errors, echo suppression). The
//! schema compiler sits behind the [`SchemaRuntime`] trait.

pub mod error;
pub mod runtime;
pub mod session;
pub mod synchronizer;

pub use error::{FailureKind, SyncFailure, SyncResult};
pub use runtime::{CellTransformer, SchemaRuntime};
pub use session::{Edit, EditSession, EditSource, Outcome, SessionView};
pub use synchronizer::{Seed, Synchronizer};
