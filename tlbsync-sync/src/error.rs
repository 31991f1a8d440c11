//! Failure values returned by the synchronizer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tlbsync_core::{Field, SyncState};

/// Message used for a blank schema edit.
pub const EMPTY_SCHEMA_MESSAGE: &str = "Schema cannot be empty";

/// Category of a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Schema edit was blank.
    EmptySchema,
    /// Schema did not compile; the previous transformer is still active.
    SchemaCompile,
    /// Binary to structured direction.
    Parse,
    /// Structured to binary direction.
    Encode,
}

impl FailureKind {
    /// The field whose error channel shows this failure.
    pub fn field(self) -> Field {
        match self {
            FailureKind::EmptySchema | FailureKind::SchemaCompile => Field::Schema,
            FailureKind::Parse => Field::Binary,
            FailureKind::Encode => Field::Structured,
        }
    }
}

/// A rejected operation. Internal state is left as documented for the
/// operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    pub fn empty_schema() -> Self {
        SyncFailure {
            kind: FailureKind::EmptySchema,
            message: EMPTY_SCHEMA_MESSAGE.to_string(),
        }
    }

    /// Compile messages are passed through untouched.
    pub fn compile(cause: impl Into<String>) -> Self {
        SyncFailure {
            kind: FailureKind::SchemaCompile,
            message: cause.into(),
        }
    }

    pub fn parse(cause: impl std::fmt::Display) -> Self {
        SyncFailure {
            kind: FailureKind::Parse,
            message: format!("Parse {cause}"),
        }
    }

    pub fn encode(cause: impl std::fmt::Display) -> Self {
        SyncFailure {
            kind: FailureKind::Encode,
            message: format!("Encode {cause}"),
        }
    }
}

/// Outcome of every state-changing synchronizer call.
pub type SyncResult = Result<SyncState, SyncFailure>;
