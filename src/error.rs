//! Error taxonomy for the archiving pipeline
//!
//! Config-level errors (`InvalidSpan`, `Config`) abort the run before any
//! work unit starts. Every other variant is fatal to a single work unit only
//! and is recorded in the run summary by the driver.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configured date span is empty or reversed.
    #[error("invalid span: {0}")]
    InvalidSpan(String),

    /// The run configuration was rejected before any unit was attempted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport-level failure while querying remote existence. Distinct
    /// from a "not found" result, which is a normal `false`.
    #[error("existence check failed for {key}: {reason}")]
    CheckFailed { key: String, reason: String },

    /// Failed to spawn the retrieval command at all.
    #[error("failed to spawn retrieval command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The retrieval command exited with a non-zero status.
    #[error("retrieval for {instrument} exited with status {status}")]
    Retrieval { instrument: String, status: i32 },

    /// Retrieval reported success but the expected file is missing or
    /// zero bytes.
    #[error("retrieved file missing or empty: {}", path.display())]
    EmptyArtifact { path: PathBuf },

    /// A raw file with zero data rows reached the transform stage.
    #[error("no data rows in {}", path.display())]
    EmptyInput { path: PathBuf },

    /// The raw file header does not match the expected tick schema,
    /// e.g. when a normalized file is fed back through the transform.
    #[error("unexpected schema in {}: [{header}]", path.display())]
    SchemaMismatch { path: PathBuf, header: String },

    /// Upload to the object store failed.
    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
