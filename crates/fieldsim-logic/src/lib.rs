//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Expression language and cycle logic programs."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The user-authored logic layer of a field device.
//!
//! Logic source is a multi-line text block. Each `LHS = RHS` line compiles
//! into an assignment; bare `sprintf(...)` lines become side-effect
//! statements. Programs evaluate in insertion order against an environment
//! seeded from the tag memory snapshots, and results flow back into the
//! memory according to each tag's pre-evaluation kind.

mod eval;
mod parser;
mod program;
mod token;
mod value;

/// Shared result type for logic operations.
pub type Result<T> = std::result::Result<T, LogicError>;

/// Compilation and evaluation failures for logic programs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicError {
    /// A source line failed to compile.
    #[error("compiling logic '{line}': {message}")]
    Compile {
        /// The offending source line, trimmed.
        line: String,
        /// Parser diagnostic.
        message: String,
    },
    /// A program step failed to evaluate.
    #[error("running logic for tag '{lhs}': {message}")]
    Eval {
        /// Left-hand side of the failing step.
        lhs: String,
        /// Evaluator diagnostic.
        message: String,
    },
}

pub use parser::{BinaryOp, Expr, UnaryOp};
pub use program::LogicProgram;
pub use value::Value;
