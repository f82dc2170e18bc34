use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use effimig_core::UpsertOutcome;
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

/// Insert/update/no-op tally for one kind of target row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl WriteCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverReport {
    pub driver: String,
    /// Source rows read.
    pub fetched: usize,
    /// Rows that produced nothing to write.
    pub skipped: usize,
    pub users: WriteCounts,
    pub posts: WriteCounts,
    pub redirects: WriteCounts,
    pub relationships: WriteCounts,
    pub attachments_copied: usize,
    pub attachments_deduplicated: usize,
    pub categories_recounted: u64,
}

impl DriverReport {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub drivers: Vec<DriverReport>,
}

impl RunSummary {
    pub fn start(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            dry_run,
            drivers: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn posts_written(&self) -> usize {
        self.drivers.iter().map(|d| d.posts.total()).sum()
    }

    pub fn redirects_written(&self) -> usize {
        self.drivers.iter().map(|d| d.redirects.total()).sum()
    }

    /// Writes `<reports_dir>/<run_id>/summary.json` and returns its path.
    pub async fn write_to(&self, reports_dir: &Path) -> Result<PathBuf> {
        let run_dir = reports_dir.join(self.run_id.to_string());
        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("creating {}", run_dir.display()))?;
        let path = run_dir.join("summary.json");
        let bytes = serde_json::to_vec_pretty(self).context("serializing run summary")?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
