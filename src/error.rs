//! Rich diagnostic error types for the pln-reasoner core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Conflicts and failed proofs are *not* errors: they are ordinary values
//! ([`crate::store::Admission::Conflict`], [`crate::chain::ProofSearch`]) that
//! the caller inspects. Only malformed input and failing collaborators end up here.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::oracle::OracleError;
use crate::paths::PathError;

/// Top-level error type for the reasoning core.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum PlnError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Exemplar(#[from] ExemplarError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ParseError {
    #[error("empty input: expected an atom")]
    #[diagnostic(
        code(pln::parse::empty),
        help("Provide a symbol, a `$variable`, or a parenthesized expression.")
    )]
    Empty,

    #[error("unexpected end of input at byte {offset}: {open} unclosed parenthesis(es)")]
    #[diagnostic(
        code(pln::parse::unexpected_eof),
        help("Every `(` needs a matching `)`. Check the end of the statement.")
    )]
    UnexpectedEof { offset: usize, open: usize },

    #[error("unmatched `)` at byte {offset}")]
    #[diagnostic(
        code(pln::parse::unbalanced_close),
        help("Remove the extra closing parenthesis or add the missing `(`.")
    )]
    UnbalancedClose { offset: usize },

    #[error("empty variable name at byte {offset}")]
    #[diagnostic(
        code(pln::parse::empty_variable),
        help("Variables are written `$name`; a bare `$` is not allowed.")
    )]
    EmptyVariable { offset: usize },

    #[error("unterminated string literal starting at byte {offset}")]
    #[diagnostic(
        code(pln::parse::unterminated_string),
        help("Close the string with a matching `\"`.")
    )]
    UnterminatedString { offset: usize },

    #[error("trailing input after atom at byte {offset}")]
    #[diagnostic(
        code(pln::parse::trailing_input),
        help("Exactly one atom was expected. Put one statement per line.")
    )]
    TrailingInput { offset: usize },

    #[error("not a typed statement: {text}")]
    #[diagnostic(
        code(pln::parse::not_a_statement),
        help("Typed statements have the shape `(: proof type)`.")
    )]
    NotAStatement { text: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error on knowledge-base file {path}: {source}")]
    #[diagnostic(
        code(pln::store::io),
        help(
            "A filesystem operation on the knowledge-base file failed. Check that the \
             directory exists, has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("knowledge store is read-only")]
    #[diagnostic(
        code(pln::store::read_only),
        help("Open the store without `read_only` to persist changes.")
    )]
    ReadOnly,

    #[error("knowledge store has no backing file")]
    #[diagnostic(
        code(pln::store::no_file),
        help("Attach a file with `KnowledgeStore::attach_log` or load one with `KnowledgeStore::load`.")
    )]
    NoBackingFile,

    #[error("statement has a variable witness: {statement}")]
    #[diagnostic(
        code(pln::store::variable_witness),
        help("Admitted statements need a concrete proof term. Variables are only allowed in goals.")
    )]
    VariableWitness { statement: String },
}

// ---------------------------------------------------------------------------
// Chaining errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ChainError {
    #[error("chaining runtime rejected input: {statement}")]
    #[diagnostic(
        code(pln::chain::malformed),
        help("The runtime could not interpret this atom. Check it against the `(: proof type)` grammar.")
    )]
    Malformed { statement: String },

    #[error("chaining runtime failure: {message}")]
    #[diagnostic(
        code(pln::chain::runtime),
        help("The reasoning runtime raised an error. The unit cannot continue.")
    )]
    Runtime { message: String },
}

// ---------------------------------------------------------------------------
// Similarity index errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("HNSW index error: {message}")]
    #[diagnostic(
        code(pln::index::hnsw),
        help("The HNSW approximate nearest-neighbor index encountered an internal error.")
    )]
    Hnsw { message: String },

    #[error("invalid embedding dimension: {dimension}")]
    #[diagnostic(
        code(pln::index::dimension),
        help("The text encoder needs a dimension of at least 32 bits.")
    )]
    Dimension { dimension: usize },
}

// ---------------------------------------------------------------------------
// Exemplar storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExemplarError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(pln::exemplar::io),
        help(
            "A filesystem operation failed. Check that the data directory exists \
             and has correct permissions."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(pln::exemplar::redb),
        help(
            "The exemplar database encountered a transaction error. \
             This may indicate corruption; try a fresh database file."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(pln::exemplar::serde),
        help(
            "Failed to serialize or deserialize an exemplar. \
             The stored format may have changed between versions."
        )
    )]
    Serialization { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}

/// Convenience alias for functions returning reasoning-core results.
pub type PlnResult<T> = std::result::Result<T, PlnError>;
