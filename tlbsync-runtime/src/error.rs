//! Error types for tlbsync-runtime.

use thiserror::Error;

/// Errors raised while turning schema text into a transformer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Lexer or parser rejected the text.
    #[error("line {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// The text parsed but declares nothing.
    #[error("schema contains no declarations")]
    Empty,

    /// Well-formed declaration that does not make sense (unknown type, arity mismatch, …).
    #[error("line {line}: {message}")]
    Semantic { line: usize, message: String },

    /// Valid TL-B outside the supported subset.
    #[error("line {line}: unsupported construct: {what}")]
    Unsupported { line: usize, what: String },
}

/// Errors raised while moving between cells, payload text and JSON values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Payload text is neither hex nor base64.
    #[error("invalid binary payload: {0}")]
    Payload(String),

    /// Bytes are not a well-formed bag of cells.
    #[error("invalid BoC: {0}")]
    Boc(String),

    /// A builder would exceed 1023 bits or 4 references.
    #[error("cell overflow: {0}")]
    CellOverflow(String),

    /// A slice ran out of bits or references.
    #[error("cell underflow: {0}")]
    CellUnderflow(String),

    /// Cell contents do not fit the schema.
    #[error("{0}")]
    Decode(String),

    /// A JSON value does not fit the schema.
    #[error("{0}")]
    Encode(String),

    /// Friendly or raw address text could not be parsed.
    #[error("invalid address: {0}")]
    Address(String),

    /// Failure inside a named field; nests for deep paths.
    #[error("in field `{field}`: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Wrap `self` with the name of the field being processed.
    pub(crate) fn within(self, field: &str) -> CodecError {
        CodecError::Field {
            field: field.to_string(),
            source: Box::new(self),
        }
    }
}
