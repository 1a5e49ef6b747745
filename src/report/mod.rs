//! Daily and monthly availability reports built from the result log.

mod renderer;
mod summary;

pub use renderer::*;
pub use summary::*;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use crate::clock::Clock;
use crate::store::{LogStore, StoreError};

/// Report generation error types.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to read result log: {0}")]
    Store(#[from] StoreError),
    #[error("log reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to encode incident detail: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Builds daily and monthly documents from the result log.
pub struct ReportGenerator {
    store: LogStore,
    renderer: Box<dyn ReportRenderer>,
    daily_dir: PathBuf,
    monthly_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ReportGenerator {
    pub fn new(
        store: LogStore,
        renderer: Box<dyn ReportRenderer>,
        daily_dir: PathBuf,
        monthly_dir: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            renderer,
            daily_dir,
            monthly_dir,
            clock,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Write `<daily_dir>/<date>_report.<ext>`; `date` defaults to today.
    pub async fn generate_daily_report(&self, date: Option<NaiveDate>) -> Result<PathBuf, ReportError> {
        let date = date.unwrap_or_else(|| self.today());
        let store = self.store.clone();
        let summary =
            tokio::task::spawn_blocking(move || store.read_all().map(|records| daily_summary(records, date)))
                .await??;

        let path = self
            .daily_dir
            .join(format!("{}_report.{}", date.format("%Y-%m-%d"), self.renderer.extension()));
        self.write(&summary, &path).await?;

        tracing::info!(
            "Daily report for {} written to {} ({} checks, {} failures)",
            date,
            path.display(),
            summary.total,
            summary.failure_count()
        );
        Ok(path)
    }

    /// Write `<monthly_dir>/<reference>_monthly_report.<ext>` covering the
    /// 30 dates ending at `reference`, which defaults to today.
    pub async fn generate_monthly_report(&self, reference: Option<NaiveDate>) -> Result<PathBuf, ReportError> {
        let reference = reference.unwrap_or_else(|| self.today());
        let store = self.store.clone();
        let summary =
            tokio::task::spawn_blocking(move || store.read_all().map(|records| monthly_summary(records, reference)))
                .await??;

        let path = self.monthly_dir.join(format!(
            "{}_monthly_report.{}",
            reference.format("%Y-%m-%d"),
            self.renderer.extension()
        ));
        self.write(&summary, &path).await?;

        tracing::info!(
            "Monthly report {} to {} written to {} ({} checks, {} failures)",
            summary.start,
            summary.end,
            path.display(),
            summary.total,
            summary.failure_count()
        );
        Ok(path)
    }

    async fn write(&self, summary: &ReportSummary, path: &Path) -> Result<(), ReportError> {
        let screenshots = load_screenshots(summary).await;
        let document = self.renderer.render(summary, &screenshots)?;

        let write_error = |source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        tokio::fs::write(path, document).await.map_err(write_error)
    }
}

/// Screenshots referenced by listed incidents. Unreadable files are left out.
async fn load_screenshots(summary: &ReportSummary) -> Screenshots {
    let mut shots = Screenshots::new();
    for path in summary.incidents.iter().filter_map(|r| r.screenshot.as_deref()) {
        if shots.contains_key(path) {
            continue;
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                shots.insert(path.to_string(), bytes);
            }
            Err(e) => tracing::warn!("Screenshot {} not readable: {}", path, e),
        }
    }
    shots
}
