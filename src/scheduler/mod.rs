//! Recurring jobs: portal checks, daily and monthly reports.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::notify::Notifier;
use crate::probe::Orchestrator;
use crate::report::ReportGenerator;

/// Delay before the first monthly report after startup.
pub const MONTHLY_FIRST_RUN: Duration = Duration::from_secs(10);

/// Period between monthly reports.
pub const MONTHLY_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

type JobResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// When each job fires.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub check_interval: Duration,
    pub daily_report_hour: u32,
    pub monthly_first_run: Duration,
    pub monthly_period: Duration,
}

impl Schedule {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            check_interval: config.check_interval,
            daily_report_hour: config.daily_report_hour,
            monthly_first_run: MONTHLY_FIRST_RUN,
            monthly_period: MONTHLY_PERIOD,
        }
    }
}

/// Drives the check, daily report and monthly report loops.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    reports: Arc<ReportGenerator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    stop_tx: broadcast::Sender<()>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        reports: Arc<ReportGenerator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        schedule: Schedule,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            orchestrator,
            reports,
            notifier,
            clock,
            schedule,
            stop_tx,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Spawn all job loops. Calling it again while running does nothing.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if !loops.is_empty() {
            return;
        }

        tracing::info!(
            "Starting scheduler: check every {:?}, daily report at {:02}:00, monthly report in {:?} then every {:?}",
            self.schedule.check_interval,
            self.schedule.daily_report_hour,
            self.schedule.monthly_first_run,
            self.schedule.monthly_period
        );

        loops.push(tokio::spawn(run_check_loop(
            self.orchestrator.clone(),
            self.notifier.clone(),
            self.schedule.check_interval,
            self.stop_tx.subscribe(),
        )));
        loops.push(tokio::spawn(run_daily_loop(
            self.reports.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            self.schedule.daily_report_hour,
            self.stop_tx.subscribe(),
        )));
        loops.push(tokio::spawn(run_monthly_loop(
            self.reports.clone(),
            self.notifier.clone(),
            self.schedule.monthly_first_run,
            self.schedule.monthly_period,
            self.stop_tx.subscribe(),
        )));
    }

    /// Stop firing jobs and wait for the loops to exit.
    ///
    /// A job already running finishes on its own.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(());
        let loops: Vec<_> = self.loops.lock().await.drain(..).collect();
        for handle in loops {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler loop ended abnormally: {}", e);
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn run_check_loop(
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn Notifier>,
    every: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                tokio::spawn(run_job("check", notifier.clone(), check_job(orchestrator.clone())));
            }
        }
    }
}

async fn run_daily_loop(
    reports: Arc<ReportGenerator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    hour: u32,
    mut stop_rx: broadcast::Receiver<()>,
) {
    loop {
        let wait = until_next_daily_run(clock.now(), hour);
        tracing::debug!("Next daily report in {:?}", wait);

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(wait) => {
                tokio::spawn(run_job("daily report", notifier.clone(), daily_job(reports.clone())));
            }
        }
    }
}

async fn run_monthly_loop(
    reports: Arc<ReportGenerator>,
    notifier: Arc<dyn Notifier>,
    first_run: Duration,
    period: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + first_run, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                tokio::spawn(run_job("monthly report", notifier.clone(), monthly_job(reports.clone())));
            }
        }
    }
}

async fn check_job(orchestrator: Arc<Orchestrator>) -> JobResult {
    if orchestrator.try_run_once().await.is_none() {
        tracing::warn!("Skipping check: previous cycle still running");
    }
    Ok(())
}

async fn daily_job(reports: Arc<ReportGenerator>) -> JobResult {
    reports.generate_daily_report(None).await?;
    Ok(())
}

async fn monthly_job(reports: Arc<ReportGenerator>) -> JobResult {
    reports.generate_monthly_report(None).await?;
    Ok(())
}

/// Run one job in its own task; errors and panics are logged and alerted.
async fn run_job<Fut>(name: &'static str, notifier: Arc<dyn Notifier>, job: Fut)
where
    Fut: Future<Output = JobResult> + Send + 'static,
{
    let failure = match tokio::spawn(job).await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{} failed: {}", name, e),
        Err(e) if e.is_panic() => format!("{} panicked: {}", name, panic_message(e.into_panic())),
        Err(e) => format!("{} was cancelled: {}", name, e),
    };

    tracing::error!("Scheduled job {}", failure);
    if let Err(e) = notifier.send(&format!("⚠️ Scheduled job {}", failure)).await {
        tracing::error!("Failed to send job failure alert: {}", e);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Time from `now` until the next `hour:00:00` strictly after it, in the
/// zone of `now`. Days where that local time does not exist are skipped.
pub fn until_next_daily_run(now: DateTime<Tz>, hour: u32) -> Duration {
    let tz = now.timezone();
    for date in now.date_naive().iter_days().take(3) {
        let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
            break;
        };
        if let Some(at) = tz.from_local_datetime(&naive).earliest() {
            if at > now {
                return (at - now).to_std().unwrap_or(Duration::ZERO);
            }
        }
    }
    Duration::from_secs(24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notify::fake::RecordingNotifier;
    use crate::probe::fake::{FakeDriver, FakePage};
    use crate::probe::{BrowserProbe, BrowserProbeConfig, ProbeTargets, RetryPolicy};
    use crate::report::HtmlReportRenderer;
    use crate::store::LogStore;
    use chrono_tz::America::Sao_Paulo;

    #[test]
    fn test_daily_run_later_today() {
        let now = FixedClock::at(Sao_Paulo, 2025, 4, 10, 14, 30, 0).now();
        assert_eq!(until_next_daily_run(now, 23), Duration::from_secs(8 * 3600 + 30 * 60));
    }

    #[test]
    fn test_daily_run_tomorrow() {
        let now = FixedClock::at(Sao_Paulo, 2025, 4, 10, 23, 30, 0).now();
        assert_eq!(until_next_daily_run(now, 23), Duration::from_secs(23 * 3600 + 30 * 60));

        let on_the_hour = FixedClock::at(Sao_Paulo, 2025, 4, 10, 23, 0, 0).now();
        assert_eq!(until_next_daily_run(on_the_hour, 23), Duration::from_secs(24 * 3600));
    }

    async fn failing_job() -> JobResult {
        Err("disk full".into())
    }

    async fn panicking_job() -> JobResult {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_job_error_is_alerted() {
        let notifier = Arc::new(RecordingNotifier::default());
        run_job("daily report", notifier.clone(), failing_job()).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("daily report failed: disk full"));
    }

    #[tokio::test]
    async fn test_job_panic_is_contained() {
        let notifier = Arc::new(RecordingNotifier::default());
        run_job("check", notifier.clone(), panicking_job()).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("check panicked: boom"));
    }

    #[tokio::test]
    async fn test_successful_job_is_silent() {
        let notifier = Arc::new(RecordingNotifier::default());
        run_job("check", notifier.clone(), async { JobResult::Ok(()) }).await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_check_and_monthly_report() {
        let dir = tempfile::tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at(Sao_Paulo, 2025, 5, 20, 14, 0, 0));
        let store = LogStore::new(dir.path().join("logs.jsonl"), clock.clone());
        let notifier = Arc::new(RecordingNotifier::default());

        let browser = BrowserProbe::new(
            BrowserProbeConfig {
                portal_url: "https://portal.example.com".to_string(),
                org_label: "ORG".to_string(),
                fail_dir: dir.path().join("failures"),
            },
            clock.clone(),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            ProbeTargets {
                site_url: "not a url".to_string(),
                portal_url: "https://portal.example.com".to_string(),
                http_timeout: Duration::from_secs(1),
            },
            browser,
            Arc::new(FakeDriver::failing(FakePage::new(), usize::MAX)),
            Arc::new(store.clone()),
            notifier.clone(),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(10),
            },
            clock.clone(),
        ));
        let reports = Arc::new(ReportGenerator::new(
            store.clone(),
            Box::new(HtmlReportRenderer),
            dir.path().join("daily"),
            dir.path().join("monthly"),
            clock.clone(),
        ));

        let scheduler = Scheduler::new(
            orchestrator,
            reports,
            notifier.clone(),
            clock,
            Schedule {
                check_interval: Duration::from_secs(3 * 3600),
                daily_report_hour: 23,
                monthly_first_run: MONTHLY_FIRST_RUN,
                monthly_period: MONTHLY_PERIOD,
            },
        );
        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        scheduler.stop().await;

        assert_eq!(store.read_all().unwrap().count(), 1);
        assert!(dir.path().join("monthly").join("2025-05-20_monthly_report.html").exists());

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1, "{:?}", sent);
        assert!(sent[0].starts_with("🚨"));
    }
}
