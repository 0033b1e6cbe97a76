//! Unified error taxonomy for the instruction compiler.
//!
//! Only infrastructure faults live here. Linguistic outcomes that a caller is
//! expected to handle in the normal course of a conversation (ambiguity,
//! unresolved references, constraint conflicts, infeasible plans) are *values*,
//! not errors: they travel through [`crate::pipeline::CompileOutcome`] so that
//! the compile entry points stay total functions over well-formed input.

use thiserror::Error;

// ============================================================================
// Canon data errors
// ============================================================================

/// Errors raised while loading or validating canon data (lexicon, lever table).
#[derive(Error, Debug)]
pub enum CanonError {
    #[error("failed to read canon file '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse canon file '{file}': {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("duplicate surface form '{surface}' in lexicon (lexemes '{first}' and '{second}')")]
    DuplicateSurface {
        surface: String,
        first: String,
        second: String,
    },

    #[error("lever '{lever}' is missing a goal key (needs axis+direction, set axis, or a subject)")]
    LeverWithoutKey { lever: String },

    #[error("lever '{lever}' has no action templates")]
    EmptyLever { lever: String },

    #[error("duplicate lever id '{lever}'")]
    DuplicateLever { lever: String },
}

// ============================================================================
// Compiler errors
// ============================================================================

/// Infrastructure failures surfaced to the embedding host.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("canon error: {0}")]
    Canon(#[from] CanonError),

    /// An edit operation could not be applied to a project snapshot.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// The host refused or failed to stage a forked view of the project.
    #[error("staging failed: {reason}")]
    StagingFailure { reason: String },

    /// The package's revision bookkeeping does not match the live project.
    #[error("revision mismatch: expected project revision {expected} but found {found}")]
    RevisionMismatch { expected: u64, found: u64 },

    #[error("commit failed: {reason}")]
    CommitFailure { reason: String },

    #[error("rollback failed: {reason}")]
    RollbackFailure { reason: String },

    /// A clarification continuation token no longer matches the live world.
    #[error("stale resume token: {reason}")]
    StaleResume { reason: String },

    /// An intent referenced project entities that do not exist in the snapshot.
    #[error("intent validation failed: {reason}")]
    Validation { reason: String },

    /// The caller cancelled the request at a stage boundary.
    #[error("request cancelled at stage '{stage}'")]
    Cancelled { stage: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for compiler entry points.
pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Tests
// ============================================================================
