//! Fetch stage
//!
//! Invokes the external retrieval CLI for one (instrument, window) pair and
//! materializes a raw tick file in the staging directory. The child's stdout
//! and stderr are forwarded line-by-line into the run log.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::PipelineError;
use crate::partition::Window;

/// Retrieval seam. The production implementation shells out to the download
/// CLI; tests substitute an in-memory fake.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve one unit's raw data and return the path of the materialized
    /// file, guaranteed to exist and be non-empty.
    async fn fetch(&self, instrument: &str, window: &Window) -> Result<PathBuf, PipelineError>;
}

/// Fetcher backed by the external retrieval CLI (dukascopy-node by default).
pub struct RetrievalCli {
    config: FetchConfig,
    data_type: String,
    format: String,
    download_dir: PathBuf,
}

impl RetrievalCli {
    pub fn new(
        config: FetchConfig,
        data_type: impl Into<String>,
        format: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            data_type: data_type.into(),
            format: format.into(),
            download_dir: download_dir.into(),
        }
    }

    /// Local path where the retrieval CLI materializes its output, by its
    /// naming convention: `<instrument>-<type>-<from>-<to>.<format>`.
    pub fn artifact_path(&self, instrument: &str, window: &Window) -> PathBuf {
        self.download_dir.join(format!(
            "{}-{}-{}-{}.{}",
            instrument, self.data_type, window.start, window.end, self.format
        ))
    }

    fn build_command(&self, instrument: &str, window: &Window) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .arg("-i")
            .arg(instrument)
            .arg("-from")
            .arg(window.start.to_string())
            .arg("-to")
            .arg(window.end.to_string())
            .arg("-t")
            .arg(&self.data_type)
            .arg("-f")
            .arg(&self.format);
        if self.config.volumes {
            cmd.arg("--volumes");
        }
        if self.config.flats {
            cmd.arg("--flats");
        }
        if self.config.use_cache {
            cmd.arg("--cache");
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

async fn forward_lines<R>(pipe: Option<R>, stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if stderr {
            warn!(target: "retrieval", "{}", line);
        } else {
            info!(target: "retrieval", "{}", line);
        }
    }
}

#[async_trait]
impl Fetcher for RetrievalCli {
    async fn fetch(&self, instrument: &str, window: &Window) -> Result<PathBuf, PipelineError> {
        let mut cmd = self.build_command(instrument, window);
        debug!(
            instrument,
            window = %window.label,
            command = %self.config.command,
            "spawning retrieval command"
        );

        let mut child = cmd.spawn().map_err(|e| PipelineError::Spawn {
            command: self.config.command.clone(),
            source: e,
        })?;

        let stdout_task = tokio::spawn(forward_lines(child.stdout.take(), false));
        let stderr_task = tokio::spawn(forward_lines(child.stderr.take(), true));

        let status = child.wait().await.map_err(|e| PipelineError::Spawn {
            command: self.config.command.clone(),
            source: e,
        })?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        if !status.success() {
            return Err(PipelineError::Retrieval {
                instrument: instrument.to_string(),
                status: status.code().unwrap_or(-1),
            });
        }

        let path = self.artifact_path(instrument, window);
        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(PipelineError::EmptyArtifact { path });
        }

        info!(
            instrument,
            window = %window.label,
            path = %path.display(),
            bytes = size,
            "retrieved raw artifact"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::Path;

    fn window() -> Window {
        Window {
            start: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
            label: "M04".to_string(),
        }
    }

    fn cli(command: &str, args: Vec<String>, dir: &Path) -> RetrievalCli {
        let config = FetchConfig {
            command: command.to_string(),
            args,
            ..FetchConfig::default()
        };
        RetrievalCli::new(config, "tick", "csv", dir)
    }

    #[test]
    fn artifact_path_follows_cli_naming_convention() {
        let cli = cli("npx", vec!["dukascopy-node".to_string()], Path::new("download"));
        let path = cli.artifact_path("eurusd", &window());
        assert_eq!(
            path,
            Path::new("download/eurusd-tick-2024-04-01-2024-04-30.csv")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(
            "sh",
            vec!["-c".to_string(), "exit 7".to_string()],
            dir.path(),
        );
        let err = cli.fetch("eurusd", &window()).await.unwrap_err();
        match err {
            PipelineError::Retrieval { instrument, status } => {
                assert_eq!(instrument, "eurusd");
                assert_eq!(status, 7);
            }
            other => panic!("expected Retrieval error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_output_file_is_an_empty_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        // "true" exits 0 but writes nothing at the convention path.
        let cli = cli("true", Vec::new(), dir.path());
        let err = cli.fetch("eurusd", &window()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyArtifact { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_fetch_returns_the_materialized_path() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli("true", Vec::new(), dir.path());
        let expected = cli.artifact_path("eurusd", &window());
        std::fs::write(&expected, "timestamp,askPrice\n1,2\n").unwrap();

        let path = cli.fetch("eurusd", &window()).await.unwrap();
        assert_eq!(path, expected);
    }

    #[tokio::test]
    async fn unknown_command_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli("definitely-not-a-real-binary-1234", Vec::new(), dir.path());
        let err = cli.fetch("eurusd", &window()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}
