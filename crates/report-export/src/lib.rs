//! Tabular export of a scan: one CSV file per non-empty tier.

use screener_core::{CandidateRecord, ScanResult, Tier};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER: [&str; 4] = ["Ticker", "Precio", "Base %", "Vol_Multi"];

/// Writing the export failed. Callers treat this as fatal for the run.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: csv::Error },

    #[error("Failed to flush {path}: {source}")]
    Flush {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// File name of a tier's sheet, `None` for discarded candidates.
pub fn file_name(tier: Tier) -> Option<&'static str> {
    match tier {
        Tier::Superstock => Some("superstocks.csv"),
        Tier::Watchlist => Some("watchlist.csv"),
        Tier::Discard => None,
    }
}

pub struct CsvExporter {
    out_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write every non-empty tier and return the written paths in tier order.
    /// A sheet left over from an earlier run for a now-empty tier is removed.
    pub fn export(&self, result: &ScanResult) -> Result<Vec<PathBuf>, ExportError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|source| ExportError::CreateDir {
            path: self.out_dir.clone(),
            source,
        })?;

        let mut written = Vec::new();

        for tier in [Tier::Superstock, Tier::Watchlist] {
            let Some(name) = file_name(tier) else {
                continue;
            };
            let path = self.out_dir.join(name);
            let records = result.tier(tier);

            if records.is_empty() {
                if path.exists() {
                    if let Err(e) = std::fs::remove_file(&path) {
                        tracing::warn!("Could not remove stale {}: {}", path.display(), e);
                    }
                }
                continue;
            }

            write_sheet(&path, records)?;
            tracing::info!("Wrote {} {} rows to {}", records.len(), tier.label(), path.display());
            written.push(path);
        }

        Ok(written)
    }
}

fn write_sheet(path: &Path, records: &[CandidateRecord]) -> Result<(), ExportError> {
    let write_err = |source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;
    writer.write_record(HEADER).map_err(write_err)?;

    for record in records {
        writer
            .write_record([
                record.ticker.as_str(),
                format!("{:.2}", record.last_close).as_str(),
                record.base_range_pct.as_str(),
                format!("{:.1}", record.volume_ratio).as_str(),
            ])
            .map_err(write_err)?;
    }

    writer.flush().map_err(|source| ExportError::Flush {
        path: path.to_path_buf(),
        source,
    })
}
