//! Edit session: the shell-facing layer around a [`Synchronizer`].
//!
//! The synchronizer is a plain request/response object. A UI that writes
//! derived values back into its own text boxes would see those writes as new
//! edits; the session drops them by source tag ([`EditSource::Echo`]) or by
//! generation (`apply_if_current`). It also keeps one error slot per field,
//! set by the failure that names the field and cleared by the next success
//! that touches it.

use std::collections::BTreeMap;

use serde::Serialize;

use tlbsync_core::{DataFormat, Field, ResolutionPolicy, SyncState};
use tlbsync_runtime::TlbRuntime;

use crate::error::{FailureKind, SyncFailure, SyncResult};
use crate::runtime::SchemaRuntime;
use crate::synchronizer::Synchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditSource {
    /// Typed by the user.
    User,
    /// The shell writing a derived value back into its own field.
    Echo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub field: Field,
    pub value: String,
    pub source: EditSource,
    /// Only consulted for schema edits.
    pub policy: ResolutionPolicy,
}

impl Edit {
    pub fn user(field: Field, value: impl Into<String>) -> Self {
        Edit {
            field,
            value: value.into(),
            source: EditSource::User,
            policy: ResolutionPolicy::default(),
        }
    }

    pub fn echo(field: Field, value: impl Into<String>) -> Self {
        Edit {
            source: EditSource::Echo,
            ..Edit::user(field, value)
        }
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// What happened to an edit handed to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(SyncState),
    Rejected(SyncFailure),
    /// Echo of a derived value; not forwarded.
    Ignored,
    /// Made against an older generation; not forwarded.
    Stale { current: u64 },
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// Everything a shell needs to redraw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub state: SyncState,
    pub errors: BTreeMap<Field, String>,
    pub generation: u64,
}

pub struct EditSession<R: SchemaRuntime = TlbRuntime> {
    sync: Synchronizer<R>,
    errors: BTreeMap<Field, String>,
    generation: u64,
}

impl<R: SchemaRuntime> EditSession<R> {
    pub fn new(sync: Synchronizer<R>) -> Self {
        EditSession {
            sync,
            errors: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn errors(&self) -> &BTreeMap<Field, String> {
        &self.errors
    }

    pub fn synchronizer(&self) -> &Synchronizer<R> {
        &self.sync
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.sync.snapshot(),
            errors: self.errors.clone(),
            generation: self.generation,
        }
    }

    /// Forward a user edit to the synchronizer; echoes are dropped.
    pub fn apply(&mut self, edit: Edit) -> Outcome {
        if edit.source == EditSource::Echo {
            tracing::trace!("ignoring echo on {}", edit.field);
            return Outcome::Ignored;
        }
        self.generation += 1;

        let result = match edit.field {
            Field::Schema => self.sync.set_schema(&edit.value, edit.policy),
            Field::Binary => self.sync.set_binary(&edit.value),
            Field::Structured => self.sync.set_structured(&edit.value),
        };
        self.record(edit.field, result)
    }

    /// Like [`apply`](Self::apply), but only when no other edit has been
    /// applied since the caller observed `generation`.
    pub fn apply_if_current(&mut self, edit: Edit, generation: u64) -> Outcome {
        if generation != self.generation {
            tracing::trace!("dropping stale edit on {} (generation {generation} < {})", edit.field, self.generation);
            return Outcome::Stale {
                current: self.generation,
            };
        }
        self.apply(edit)
    }

    /// Change the binary encoding; failures land on the binary field.
    pub fn set_format(&mut self, format: DataFormat) -> Outcome {
        self.generation += 1;
        let result = self.sync.set_binary_format(format);
        self.record(Field::Binary, result)
    }

    fn record(&mut self, edited: Field, result: SyncResult) -> Outcome {
        match result {
            Ok(state) => {
                for field in touched(edited) {
                    self.errors.remove(field);
                }
                Outcome::Applied(state)
            }
            Err(failure) => {
                // A schema edit that fails downstream did compile.
                if edited == Field::Schema
                    && matches!(failure.kind, FailureKind::Parse | FailureKind::Encode)
                {
                    self.errors.remove(&Field::Schema);
                }
                self.errors.insert(failure.kind.field(), failure.message.clone());
                Outcome::Rejected(failure)
            }
        }
    }
}

/// Fields whose displayed value a successful edit of `edited` may change.
fn touched(edited: Field) -> &'static [Field] {
    match edited {
        Field::Schema => Field::all(),
        Field::Binary | Field::Structured => &[Field::Binary, Field::Structured],
    }
}
