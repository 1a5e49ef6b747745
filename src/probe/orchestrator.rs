//! One full check cycle: HTTP probe, browser probe, log, alert.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

use super::{error_trace, run_http_probe, BrowserDriver, BrowserOutcome, BrowserProbe, HttpOutcome, ProbeError, RetryPolicy};
use crate::clock::Clock;
use crate::notify::Notifier;
use crate::store::{BrowserDetail, HttpDetail, LogStore, ProbeResult};

/// URLs checked by every cycle.
#[derive(Debug, Clone)]
pub struct ProbeTargets {
    pub site_url: String,
    pub portal_url: String,
    pub http_timeout: Duration,
}

/// A probe attempt that died before producing a browser outcome.
///
/// Keeps the attempt's HTTP outcome so an exhausted retry still records it.
#[derive(Error, Debug)]
#[error("{source}")]
struct AttemptError {
    http: HttpOutcome,
    #[source]
    source: ProbeError,
}

/// Runs check cycles, one at a time.
pub struct Orchestrator {
    targets: ProbeTargets,
    browser: BrowserProbe,
    driver: Arc<dyn BrowserDriver>,
    store: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    // The browser is exclusive: one cycle, retries included, at a time
    in_flight: Semaphore,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        targets: ProbeTargets,
        browser: BrowserProbe,
        driver: Arc<dyn BrowserDriver>,
        store: Arc<LogStore>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            targets,
            browser,
            driver,
            store,
            notifier,
            retry,
            clock,
            in_flight: Semaphore::new(1),
        }
    }

    /// Run one cycle, waiting for any cycle already in flight.
    pub async fn run_once(&self) -> ProbeResult {
        let _permit = self.in_flight.acquire().await;
        self.run_cycle().await
    }

    /// Run one cycle unless another is in flight.
    pub async fn try_run_once(&self) -> Option<ProbeResult> {
        let _permit = self.in_flight.try_acquire().ok()?;
        Some(self.run_cycle().await)
    }

    async fn run_cycle(&self) -> ProbeResult {
        let timestamp = self.clock.now_string();
        tracing::info!("Checking {} and {}", self.targets.site_url, self.targets.portal_url);

        let attempt = self.retry.run(|_| self.attempt()).await;
        let result = self.assemble(timestamp, attempt);

        let result = match self.store.append(&result) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!("Failed to append result to {}: {}", self.store.path().display(), e);
                result
            }
        };

        if result.is_ok() {
            tracing::info!("Check passed");
        } else {
            tracing::warn!("Check failed: http={} browser={}", result.ok_http, result.ok_playwright);
            if let Err(e) = self.notifier.send(&format_alert(&result)).await {
                tracing::error!("Failed to send alert: {}", e);
            }
        }

        result
    }

    /// HTTP probe then browser probe. The browser runs whatever the HTTP outcome.
    async fn attempt(&self) -> Result<(HttpOutcome, BrowserOutcome, Duration), AttemptError> {
        let http = run_http_probe(&self.targets.site_url, self.targets.http_timeout).await;
        let started = tokio::time::Instant::now();
        match self.browser.run(self.driver.as_ref()).await {
            Ok(browser) => Ok((http, browser, started.elapsed())),
            Err(source) => Err(AttemptError { http, source }),
        }
    }

    fn assemble(
        &self,
        timestamp: String,
        attempt: Result<(HttpOutcome, BrowserOutcome, Duration), AttemptError>,
    ) -> ProbeResult {
        let (http, ok_playwright, playwright_detail, screenshot, browser_elapsed) = match attempt {
            Ok((http, browser, elapsed)) => (
                http,
                browser.ok,
                browser.detail,
                browser.screenshot,
                Some(elapsed.as_secs_f64()),
            ),
            Err(e) => {
                let detail = BrowserDetail::Error {
                    error: e.source.to_string(),
                    trace: error_trace(&e.source),
                };
                (e.http, false, detail, None, None)
            }
        };

        let performance_degraded = performance_degraded(&http.detail, browser_elapsed);
        if performance_degraded {
            tracing::warn!(
                "Performance degraded: HTTP {}, browser {}",
                match &http.detail {
                    HttpDetail::Response { elapsed_seconds, .. } => format!("{:.2}s", elapsed_seconds),
                    HttpDetail::Error { .. } => "n/a".to_string(),
                },
                browser_elapsed.map(|s| format!("{:.2}s", s)).unwrap_or_else(|| "n/a".to_string())
            );
        }

        ProbeResult {
            timestamp,
            site_url: self.targets.site_url.clone(),
            portal_url: self.targets.portal_url.clone(),
            ok_http: http.ok,
            http_detail: http.detail,
            ok_playwright,
            playwright_detail,
            screenshot,
            playwright_elapsed_seconds: browser_elapsed,
            performance_degraded,
            recorded_at: None,
        }
    }
}

/// HTTP responses slower than this mark a cycle as degraded.
pub const HTTP_SLOW_THRESHOLD: Duration = Duration::from_secs(5);

/// Browser walks slower than this mark a cycle as degraded.
pub const BROWSER_SLOW_THRESHOLD: Duration = Duration::from_secs(30);

/// Either probe exceeded its slowness threshold. Degradation is reported
/// alongside the result and does not make it an incident.
pub fn performance_degraded(http: &HttpDetail, browser_elapsed_seconds: Option<f64>) -> bool {
    let http_slow = matches!(
        http,
        HttpDetail::Response { elapsed_seconds, .. } if *elapsed_seconds > HTTP_SLOW_THRESHOLD.as_secs_f64()
    );
    let browser_slow = browser_elapsed_seconds.is_some_and(|s| s > BROWSER_SLOW_THRESHOLD.as_secs_f64());
    http_slow || browser_slow
}

/// Alert text for a failed cycle.
pub fn format_alert(result: &ProbeResult) -> String {
    let mut msg = format!(
        "🚨 Problem detected at {} on {}.\n\
         HTTP OK: {}\n\
         HTTP detail: {}\n\
         Browser OK: {}\n\
         Browser detail: {}\n",
        result.site_url,
        result.timestamp,
        result.ok_http,
        serde_json::to_string(&result.http_detail).unwrap_or_default(),
        result.ok_playwright,
        serde_json::to_string(&result.playwright_detail).unwrap_or_default(),
    );
    if let Some(path) = &result.screenshot {
        msg.push_str(&format!("Screenshot: {}\n", path));
    }
    msg
}
