//! tlbsync runtime: TL-B schema compiler plus the cell, BoC and JSON codecs.
//!
//! # Modules
//! - [`cell`], [`boc`]: cell model and bag-of-cells serialization
//! - [`lexer`], [`parser`], [`ast`], [`compiler`]: schema text to [`Program`]
//! - [`codec`]: [`Program`]-driven decode/encode between cells and JSON
//! - [`alias`]: `block.tlb` expansion
//! - [`address`]: friendly/raw address text
//! - [`transformer`]: [`TlbRuntime`] and [`Transformer`], the entry points

pub mod address;
pub mod alias;
pub mod ast;
pub mod boc;
pub mod cell;
pub mod codec;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod transformer;
mod wellknown;

pub use boc::Boc;
pub use compiler::Program;
pub use error::{CodecError, CompileError};
pub use transformer::{TlbRuntime, Transformer};
