//! Transform stage
//!
//! Reads a raw tick CSV, appends a `symbol` column holding the uppercased
//! instrument code, and writes the normalized copy under a per-instrument
//! subdirectory of the staging area. The output is staged through a `.tmp`
//! sibling and renamed into place, so a partially written file is never
//! visible under the final name.

use std::fs;
use std::path::{Path, PathBuf};

use csv::{Reader, StringRecord, Writer};
use tracing::{debug, info};

use crate::error::PipelineError;

/// Expected header of a raw tick file.
pub const RAW_HEADER: [&str; 5] = ["timestamp", "askPrice", "bidPrice", "askVolume", "bidVolume"];

pub struct TransformStage {
    download_dir: PathBuf,
}

impl TransformStage {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }

    /// Destination of the normalized copy: same file name, nested under a
    /// per-instrument directory. RemoteKey derivation mirrors this layout.
    pub fn output_path(&self, raw_path: &Path, instrument: &str) -> PathBuf {
        let file_name = raw_path.file_name().unwrap_or(raw_path.as_os_str());
        self.download_dir.join(instrument).join(file_name)
    }

    /// Normalize one raw file. Fails on an empty input or a header that is
    /// not the raw tick schema; an already-normalized file (with a `symbol`
    /// column) is rejected rather than silently re-tagged.
    pub fn transform(&self, raw_path: &Path, instrument: &str) -> Result<PathBuf, PipelineError> {
        let mut reader = Reader::from_path(raw_path).map_err(|e| PipelineError::Csv {
            path: raw_path.to_path_buf(),
            source: e,
        })?;

        let header = reader
            .headers()
            .map_err(|e| PipelineError::Csv {
                path: raw_path.to_path_buf(),
                source: e,
            })?
            .clone();
        if !header.iter().eq(RAW_HEADER) {
            return Err(PipelineError::SchemaMismatch {
                path: raw_path.to_path_buf(),
                header: header.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut rows: Vec<StringRecord> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PipelineError::Csv {
                path: raw_path.to_path_buf(),
                source: e,
            })?;
            rows.push(record);
        }
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput {
                path: raw_path.to_path_buf(),
            });
        }

        let symbol = instrument.to_uppercase();
        let out_path = self.output_path(raw_path, instrument);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let tmp_path = out_path.with_extension("tmp");
        debug!(path = %tmp_path.display(), "staging normalized artifact");
        let write_result = write_normalized(&tmp_path, &header, &rows, &symbol);
        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &out_path).map_err(|e| PipelineError::Io {
            path: out_path.clone(),
            source: e,
        })?;

        info!(
            rows = rows.len(),
            symbol = %symbol,
            path = %out_path.display(),
            "normalized artifact written"
        );
        Ok(out_path)
    }
}

fn write_normalized(
    path: &Path,
    header: &StringRecord,
    rows: &[StringRecord],
    symbol: &str,
) -> Result<(), PipelineError> {
    let csv_err = |e: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source: e,
    };

    let mut writer = Writer::from_path(path).map_err(csv_err)?;

    let mut out_header = header.clone();
    out_header.push_field("symbol");
    writer.write_record(&out_header).map_err(csv_err)?;

    for row in rows {
        let mut out_row = row.clone();
        out_row.push_field(symbol);
        writer.write_record(&out_row).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_CONTENT: &str = "\
timestamp,askPrice,bidPrice,askVolume,bidVolume
1712016000000,1.0789,1.0787,0.75,1.5
1712016000123,1.0790,1.0788,0.30,0.90
1712016000456,1.0791,1.0789,1.20,0.45
";

    fn write_raw(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn appends_uppercased_symbol_to_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path(), "eurusd-tick-2024-04-01-2024-04-30.csv", RAW_CONTENT);

        let stage = TransformStage::new(dir.path());
        let out = stage.transform(&raw, "eurusd").unwrap();
        assert_eq!(
            out,
            dir.path()
                .join("eurusd")
                .join("eurusd-tick-2024-04-01-2024-04-30.csv")
        );

        let mut reader = Reader::from_path(&out).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            vec!["timestamp", "askPrice", "bidPrice", "askVolume", "bidVolume", "symbol"]
        );
        let rows: Vec<StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.len(), 6);
            assert_eq!(&row[5], "EURUSD");
        }
        // Original fields are untouched.
        assert_eq!(&rows[0][0], "1712016000000");
        assert_eq!(&rows[2][1], "1.0791");
    }

    #[test]
    fn empty_input_fails_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            "eurusd-tick-2024-04-01-2024-04-30.csv",
            "timestamp,askPrice,bidPrice,askVolume,bidVolume\n",
        );

        let stage = TransformStage::new(dir.path());
        let err = stage.transform(&raw, "eurusd").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { .. }));
        assert!(!stage.output_path(&raw, "eurusd").exists());
        assert!(!dir.path().join("eurusd").exists());
    }

    #[test]
    fn rerunning_on_own_output_is_a_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path(), "eurusd-tick-2024-04-01-2024-04-30.csv", RAW_CONTENT);

        let stage = TransformStage::new(dir.path());
        let out = stage.transform(&raw, "eurusd").unwrap();

        let err = stage.transform(&out, "eurusd").unwrap_err();
        match err {
            PipelineError::SchemaMismatch { header, .. } => {
                assert!(header.ends_with(",symbol"));
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn unexpected_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            "eurusd-tick-2024-04-01-2024-04-30.csv",
            "time,ask,bid\n1,2,3\n",
        );

        let stage = TransformStage::new(dir.path());
        let err = stage.transform(&raw, "eurusd").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn no_tmp_debris_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path(), "gbpusd-tick-2022-01-01-2022-01-01.csv", RAW_CONTENT);

        let stage = TransformStage::new(dir.path());
        let out = stage.transform(&raw, "gbpusd").unwrap();
        assert!(out.exists());
        assert!(!out.with_extension("tmp").exists());
    }
}
