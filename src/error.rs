//! # Error Taxonomy
//!
//! The core never panics on bad input or unexpected tree state; every fallible
//! operation returns a [`CoreError`] so callers can match on category instead
//! of parsing a message string: `anyhow` is reserved for application edges,
//! while data structures other processes depend on for correctness surface
//! precise, typed failures here.

use thiserror::Error;

/// Typed failure surface for the core, one variant per category a caller
/// might need to branch on.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A caller-supplied precondition was violated (e.g. a non-32-byte hash,
    /// an empty-tree delete request, an out-of-range index).
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// A tree or node violates a structural invariant (an internal node with
    /// only one child, a leaf missing a required field).
    #[error("invalid tree structure: {0}")]
    InvalidStructure(String),

    /// `save` was attempted while the Merkle tree is out of sync with the
    /// sort tree; call `build_merkle()` first.
    #[error("cannot save: merkle tree is dirty, call build_merkle() first")]
    Dirty,

    /// The on-disk version is newer than this implementation understands, or
    /// is not one of the known formats.
    #[error("unsupported file version {found} (this build supports up to {max})")]
    BadVersion { found: u32, max: u32 },

    /// The byte stream did not match the expected layout for its version:
    /// truncated, an out-of-range string-table index, a UUID or hash of the
    /// wrong length.
    #[error("format corruption: {0}")]
    FormatCorruption(String),

    /// `delete_many` was asked to remove a name that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied traversal predicate asked to stop.
    #[error("traversal cancelled")]
    Cancelled,

    /// Propagated I/O failure from a `Storage` implementation.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
