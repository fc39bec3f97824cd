//! Tick Archiver Library
//!
//! This library provides a sequential batch pipeline for archiving
//! historical tick data: a configured date span is partitioned into
//! retrieval windows, and for every (instrument, window) pair the pipeline
//! checks the remote store, fetches raw ticks through an external retrieval
//! CLI, appends the instrument symbol to every row, and publishes the
//! normalized file to S3-compatible storage. Failures are isolated per
//! unit and already-published units are skipped on rerun.

pub mod config;
pub mod error;
pub mod fetch;
pub mod partition;
pub mod pipeline;
pub mod storage;
pub mod transform;

// Re-export commonly used types
pub use config::{Config, FetchConfig, PublishConfig, S3Config};
pub use error::PipelineError;
pub use fetch::{Fetcher, RetrievalCli};
pub use partition::{generate, DateSpan, Granularity, Window};
pub use pipeline::{remote_key, DriverOptions, PipelineDriver, RunSummary, WorkUnit};
pub use storage::{ObjectStore, S3Provider, S3Store};
pub use transform::TransformStage;
