//! Daily and rolling 30-day aggregation over the result log.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::store::ProbeResult;

/// Calendar dates in the monthly window, reference date included.
pub const MONTHLY_WINDOW_DAYS: u64 = 30;

/// Incidents listed in full by a monthly report.
pub const MONTHLY_INCIDENT_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportKind {
    Daily,
    Monthly,
}

/// Aggregate handed to a renderer. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub kind: ReportKind,
    /// First date of the window, inclusive
    pub start: NaiveDate,
    /// Last date of the window, inclusive
    pub end: NaiveDate,
    pub total: usize,
    pub ok_count: usize,
    /// Incidents in log order; capped for monthly reports
    pub incidents: Vec<ProbeResult>,
}

impl ReportSummary {
    pub fn failure_count(&self) -> usize {
        self.total - self.ok_count
    }

    /// Number of incidents left out by the monthly cap.
    pub fn omitted_incidents(&self) -> usize {
        self.failure_count().saturating_sub(self.incidents.len())
    }
}

/// The `YYYY-MM-DD` prefix a record timestamp must carry to fall on `date`.
fn date_prefix(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The 30 dates ending at and including `reference`, oldest first.
pub fn monthly_window(reference: NaiveDate) -> Vec<NaiveDate> {
    (0..MONTHLY_WINDOW_DAYS)
        .rev()
        .filter_map(|back| reference.checked_sub_days(Days::new(back)))
        .collect()
}

fn summarize<I>(kind: ReportKind, start: NaiveDate, end: NaiveDate, records: I, cap: Option<usize>) -> ReportSummary
where
    I: Iterator<Item = ProbeResult>,
{
    let mut total = 0;
    let mut ok_count = 0;
    let mut incidents = Vec::new();

    for record in records {
        total += 1;
        if record.is_ok() {
            ok_count += 1;
        } else if cap.map_or(true, |c| incidents.len() < c) {
            incidents.push(record);
        }
    }

    ReportSummary {
        kind,
        start,
        end,
        total,
        ok_count,
        incidents,
    }
}

/// Records whose timestamp falls on `date`, with every incident in full.
///
/// Matching is by the timestamp's date prefix as written, not by parsing
/// it into a zone-aware instant.
pub fn daily_summary<I>(records: I, date: NaiveDate) -> ReportSummary
where
    I: IntoIterator<Item = ProbeResult>,
{
    let prefix = date_prefix(date);
    let matching = records
        .into_iter()
        .filter(|r| r.timestamp.starts_with(&prefix));
    summarize(ReportKind::Daily, date, date, matching, None)
}

/// Records on any of the 30 dates ending at `reference`; the first
/// [`MONTHLY_INCIDENT_CAP`] incidents in log order are kept.
pub fn monthly_summary<I>(records: I, reference: NaiveDate) -> ReportSummary
where
    I: IntoIterator<Item = ProbeResult>,
{
    let window = monthly_window(reference);
    let prefixes: Vec<String> = window.iter().copied().map(date_prefix).collect();
    let start = window.first().copied().unwrap_or(reference);

    let matching = records
        .into_iter()
        .filter(|r| prefixes.iter().any(|p| r.timestamp.starts_with(p.as_str())));
    summarize(ReportKind::Monthly, start, reference, matching, Some(MONTHLY_INCIDENT_CAP))
}
