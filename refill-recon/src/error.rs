//! Error types for the reconciliation pipeline
//!
//! Only shared-resource failures are real errors here. Per-record problems
//! (`RecordIssue`) are data: they flow into the run report and never abort
//! sibling processing.

use thiserror::Error;

/// Batch-fatal pipeline errors
///
/// A batch aborts before any writes when one of these occurs; everything
/// else is isolated per record and reported.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Shared resource (category table, bounding box) unavailable or invalid
    #[error("Configuration load failure: {0}")]
    ConfigLoad(String),

    /// Persistence port failure at the batch boundary
    #[error("Store error: {0}")]
    Store(#[from] refill_common::Error),

    /// Input batch could not be read at all
    #[error("Batch input error: {0}")]
    BatchInput(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Per-record (or per-cluster) recoverable issues
///
/// These are counted and listed in the run report; they never propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordIssue {
    /// Name or address empty after trimming; record dropped
    MalformedInput,
    /// Coordinates outside the metropolitan bounding box; record quarantined
    OutOfRegion,
    /// Cluster carried multiple distinct external identifiers
    MergeConflict,
}

impl std::fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordIssue::MalformedInput => "malformed_input",
            RecordIssue::OutOfRegion => "out_of_region",
            RecordIssue::MergeConflict => "merge_conflict",
        };
        f.write_str(s)
    }
}
