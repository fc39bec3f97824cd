//! Pipeline driver
//!
//! Iterates the (instrument × window) cross product strictly sequentially,
//! instrument-major then window-minor, running check → fetch → transform →
//! publish per unit. A unit failure is recorded and never aborts the run;
//! a requested stop is honored between units only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::fetch::Fetcher;
use crate::partition::Window;
use crate::storage::ObjectStore;
use crate::transform::TransformStage;

/// One (instrument, window) pair, the atomic failure-isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub instrument: String,
    pub window: Window,
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.instrument, self.window.label)
    }
}

/// Deterministic destination key:
/// `<base>/<instrument>/<instrument>-<type>-<start>-<end>.<format>`.
/// Must stay in lockstep with the retrieval CLI's local naming so that
/// reruns find artifacts uploaded by earlier runs.
pub fn remote_key(
    base_path: &str,
    instrument: &str,
    data_type: &str,
    window: &Window,
    format: &str,
) -> String {
    let file_name = format!(
        "{}-{}-{}-{}.{}",
        instrument, data_type, window.start, window.end, format
    );
    let base = base_path.trim_matches('/');
    if base.is_empty() {
        format!("{}/{}", instrument, file_name)
    } else {
        format!("{}/{}/{}", base, instrument, file_name)
    }
}

/// Aggregate outcome of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub done: Vec<WorkUnit>,
    pub skipped: Vec<WorkUnit>,
    pub failed: Vec<(WorkUnit, String)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.done.len() + self.skipped.len() + self.failed.len()
    }

    /// Emit the end-of-run report into the log.
    pub fn log(&self) {
        info!(
            done = self.done.len(),
            skipped = self.skipped.len(),
            failed = self.failed.len(),
            total = self.total(),
            "run summary"
        );
        for (unit, cause) in &self.failed {
            warn!(unit = %unit, cause = %cause, "failed unit");
        }
    }
}

enum UnitOutcome {
    Completed,
    Skipped,
}

/// Driver knobs derived from the run configuration.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Tick type used in artifact and key naming (e.g. "tick")
    pub data_type: String,
    /// Artifact format / file extension (e.g. "csv")
    pub format: String,
    /// Key prefix inside the bucket
    pub base_path: String,
    /// Skip units whose key already exists remotely
    pub check_remote: bool,
    /// Remove local artifacts after a successful upload (best-effort)
    pub delete_local: bool,
}

/// Sequential pipeline driver. `store` is `None` for local-only runs, which
/// disables both the existence check and the publish stage.
pub struct PipelineDriver<F, S> {
    fetcher: F,
    transform: TransformStage,
    store: Option<S>,
    options: DriverOptions,
    stop: Arc<AtomicBool>,
}

impl<F, S> PipelineDriver<F, S>
where
    F: Fetcher,
    S: ObjectStore,
{
    pub fn new(
        fetcher: F,
        transform: TransformStage,
        store: Option<S>,
        options: DriverOptions,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            fetcher,
            transform,
            store,
            options,
            stop,
        }
    }

    /// Process every (instrument, window) pair, instrument-major then
    /// window-minor, one unit at a time. Returns when every unit reached a
    /// terminal state or a stop was requested between units.
    pub async fn run(&self, instruments: &[String], windows: &[Window]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = instruments.len() * windows.len();
        info!(
            instruments = instruments.len(),
            windows = windows.len(),
            total,
            "starting run"
        );

        'instruments: for instrument in instruments {
            for window in windows {
                if self.stop.load(Ordering::SeqCst) {
                    warn!(
                        remaining = total - summary.total(),
                        "stop requested, halting before the next unit"
                    );
                    break 'instruments;
                }

                let unit = WorkUnit {
                    instrument: instrument.clone(),
                    window: window.clone(),
                };
                info!(unit = %unit, "processing unit");

                match self.process_unit(&unit).await {
                    Ok(UnitOutcome::Completed) => {
                        info!(unit = %unit, "unit done");
                        summary.done.push(unit);
                    }
                    Ok(UnitOutcome::Skipped) => {
                        info!(unit = %unit, "already published, skipping");
                        summary.skipped.push(unit);
                    }
                    Err(e) => {
                        error!(unit = %unit, error = %e, "unit failed");
                        summary.failed.push((unit, e.to_string()));
                    }
                }
            }
        }

        summary
    }

    async fn process_unit(&self, unit: &WorkUnit) -> Result<UnitOutcome, PipelineError> {
        let key = remote_key(
            &self.options.base_path,
            &unit.instrument,
            &self.options.data_type,
            &unit.window,
            &self.options.format,
        );

        if let Some(store) = &self.store {
            if self.options.check_remote {
                match store.exists(&key).await {
                    Ok(true) => return Ok(UnitOutcome::Skipped),
                    Ok(false) => {}
                    Err(e) => {
                        // Connectivity trouble is not proof of absence;
                        // attempt the unit anyway.
                        warn!(key = %key, error = %e, "existence check failed, assuming absent");
                    }
                }
            }
        }

        let raw = self.fetcher.fetch(&unit.instrument, &unit.window).await?;
        let normalized = self.transform.transform(&raw, &unit.instrument)?;

        if let Some(store) = &self.store {
            store.upload(&normalized, &key).await?;

            if self.options.delete_local {
                // The upload is the durability boundary; cleanup failures
                // only warn.
                for path in [&normalized, &raw] {
                    if let Err(e) = std::fs::remove_file(path) {
                        warn!(path = %path.display(), error = %e, "failed to remove local artifact");
                    }
                }
            }
        }

        Ok(UnitOutcome::Completed)
    }
}
