//! Per-run identity passed to every stage that writes output

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::Result;

/// Archive suffix format, e.g. `2026-10-19_143005`
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub output_dir: PathBuf,
}

impl RunContext {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_start(output_dir, Utc::now())
    }

    pub fn with_start(output_dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            output_dir: output_dir.into(),
        }
    }

    /// Create the output directory if needed
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn timestamp(&self) -> String {
        self.started_at.format(ARCHIVE_TIMESTAMP_FORMAT).to_string()
    }

    /// `<output_dir>/<stem>.csv`, overwritten on every run
    pub fn working_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}.csv", stem))
    }

    /// `<output_dir>/<stem>_<timestamp>.csv`, kept per run
    pub fn archive_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}.csv", stem, self.timestamp()))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 14, 30, 5).unwrap();
        let ctx = RunContext::with_start("exports", start);

        assert_eq!(ctx.timestamp(), "2026-10-19_143005");
        assert_eq!(ctx.working_path("DualPowerTable"), PathBuf::from("exports/DualPowerTable.csv"));
        assert_eq!(
            ctx.archive_path("DualPowerTable"),
            PathBuf::from("exports/DualPowerTable_2026-10-19_143005.csv")
        );
    }

    #[test]
    fn test_runs_get_distinct_ids() {
        assert_ne!(RunContext::new("a").run_id, RunContext::new("a").run_id);
    }
}
