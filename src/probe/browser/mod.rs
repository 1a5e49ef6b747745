//! Browser interaction probe.
//!
//! Walks the portal through a fixed forward sequence of states:
//!
//! `Start -> PageLoaded -> OrgSelected -> DocumentListVisible -> DocumentOpened -> Verified`
//!
//! Any step may fall into the absorbing `Failed` state. Each step after the
//! page load is an ordered list of [`Strategy`] values.

mod page;
mod strategy;
mod webdriver;

pub use page::*;
pub use strategy::*;
pub use webdriver::*;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::probe::{error_trace, ProbeError};
use crate::store::BrowserDetail;

pub const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const ORG_SELECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DOC_LIST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DOC_LINK_TIMEOUT: Duration = Duration::from_secs(5);
pub const VIEWER_TIMEOUT: Duration = Duration::from_secs(10);

/// Position of the probe in the portal walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbeState {
    Start,
    PageLoaded,
    OrgSelected,
    DocumentListVisible,
    DocumentOpened,
    Verified,
    Failed,
}

/// One transition of the walk: the state it reaches and how to get there.
pub struct Step {
    pub target: ProbeState,
    /// Cause recorded when every strategy fails
    pub failure_note: &'static str,
    pub strategies: Vec<Box<dyn Strategy>>,
}

impl Step {
    /// Try each strategy in order. Every failed strategy leaves a note in
    /// `messages`; the first success leaves its own message and stops.
    pub async fn run(&self, page: &dyn Page, messages: &mut Vec<String>) -> StepOutcome {
        for strategy in &self.strategies {
            match strategy.attempt(page).await {
                StepOutcome::Success(msg) => {
                    messages.push(msg.clone());
                    return StepOutcome::Success(msg);
                }
                StepOutcome::Failure { reason } => {
                    tracing::debug!("Strategy '{}' failed: {}", strategy.name(), reason);
                    messages.push(format!("{} failed: {}", strategy.name(), reason));
                }
            }
        }
        StepOutcome::failure(self.failure_note)
    }
}

/// What the browser probe concluded.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserOutcome {
    pub ok: bool,
    pub state: ProbeState,
    pub detail: BrowserDetail,
    pub screenshot: Option<String>,
}

/// Portal walk settings.
#[derive(Debug, Clone)]
pub struct BrowserProbeConfig {
    pub portal_url: String,
    pub org_label: String,
    /// Where failure screenshots are written
    pub fail_dir: PathBuf,
}

/// Drives one page through the walk and captures evidence on failure.
pub struct BrowserProbe {
    config: BrowserProbeConfig,
    steps: Vec<Step>,
    clock: Arc<dyn Clock>,
}

impl BrowserProbe {
    /// Probe with the default portal steps.
    pub fn new(config: BrowserProbeConfig, clock: Arc<dyn Clock>) -> Self {
        let steps = default_steps(&config.org_label);
        Self::with_steps(config, steps, clock)
    }

    pub fn with_steps(config: BrowserProbeConfig, steps: Vec<Step>, clock: Arc<dyn Clock>) -> Self {
        Self { config, steps, clock }
    }

    /// Launch a page and run the walk.
    ///
    /// Only a launch failure is returned as an error; everything after that
    /// is folded into the outcome.
    pub async fn run(&self, driver: &dyn BrowserDriver) -> Result<BrowserOutcome, ProbeError> {
        let page = driver.launch().await?;
        let outcome = self.walk(page.as_ref()).await;
        if let Err(e) = page.close().await {
            tracing::warn!("Failed to close browser page: {}", e);
        }
        Ok(outcome)
    }

    /// Run the walk on an already open page.
    pub async fn walk(&self, page: &dyn Page) -> BrowserOutcome {
        if let Err(e) = page.goto(&self.config.portal_url, PAGE_LOAD_TIMEOUT).await {
            tracing::warn!("Portal {} failed to load: {}", self.config.portal_url, e);
            return BrowserOutcome {
                ok: false,
                state: ProbeState::Failed,
                detail: BrowserDetail::Error {
                    error: e.to_string(),
                    trace: error_trace(&e),
                },
                screenshot: self.capture_screenshot(page).await,
            };
        }

        let mut messages = vec!["page loaded".to_string()];
        let mut state = ProbeState::PageLoaded;

        for step in &self.steps {
            debug_assert!(step.target > state);
            match step.run(page, &mut messages).await {
                StepOutcome::Success(_) => state = step.target,
                StepOutcome::Failure { reason } => {
                    tracing::warn!("Browser probe failed after {:?}: {}", state, reason);
                    messages.push(format!("erro: {}", reason));
                    state = ProbeState::Failed;
                    break;
                }
            }
        }

        let ok = state == ProbeState::Verified;
        let screenshot = if ok {
            None
        } else {
            self.capture_screenshot(page).await
        };
        if ok {
            messages.push("document opened successfully".to_string());
        }

        BrowserOutcome {
            ok,
            state,
            detail: BrowserDetail::Trail { messages },
            screenshot,
        }
    }

    /// Save a screenshot named after the current time.
    ///
    /// Failures are logged and yield `None`.
    async fn capture_screenshot(&self, page: &dyn Page) -> Option<String> {
        let name = format!("fail_{}.png", self.clock.now().format("%Y%m%d_%H%M%S"));
        let path = self.config.fail_dir.join(name);

        let png = match page.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to take screenshot: {}", e);
                return None;
            }
        };

        let write = async {
            tokio::fs::create_dir_all(&self.config.fail_dir).await?;
            tokio::fs::write(&path, png).await?;
            Ok::<_, std::io::Error>(())
        };
        match write.await {
            Ok(()) => {
                tracing::info!("Screenshot saved to {}", path.display());
                Some(path.to_string_lossy().into_owned())
            }
            Err(e) => {
                tracing::error!("Failed to write screenshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn testid(id: &str) -> Locator {
    Locator::Css(format!("[data-testid=\"{}\"]", id))
}

/// The portal walk: select the organization, wait for the document list,
/// open the first document, confirm a PDF viewer.
pub fn default_steps(org_label: &str) -> Vec<Step> {
    vec![
        Step {
            target: ProbeState::OrgSelected,
            failure_note: "organization selector not found",
            strategies: vec![
                Box::new(SelectByLocator {
                    locator: testid("org-select"),
                    label: org_label.to_string(),
                    timeout: ORG_SELECT_TIMEOUT,
                }),
                Box::new(ScanSelects {
                    label: org_label.to_string(),
                    timeout: ORG_SELECT_TIMEOUT,
                }),
            ],
        },
        Step {
            target: ProbeState::DocumentListVisible,
            failure_note: "document list never became visible",
            strategies: vec![Box::new(WaitVisible {
                label: "document list",
                locator: Locator::css("[data-testid=\"doc-list\"], .documents-list"),
                timeout: DOC_LIST_TIMEOUT,
            })],
        },
        Step {
            target: ProbeState::DocumentOpened,
            failure_note: "no document link could be opened",
            strategies: vec![
                Box::new(ClickLocator {
                    locator: testid("doc-link"),
                    timeout: DOC_LINK_TIMEOUT,
                }),
                Box::new(ClickMatchingLink::document_links(DOC_LINK_TIMEOUT)),
            ],
        },
        Step {
            target: ProbeState::Verified,
            failure_note: "document viewer did not appear",
            strategies: vec![Box::new(WaitVisible {
                label: "document viewer",
                locator: Locator::css(
                    "iframe[src*=\"pdf\"], embed[type=\"application/pdf\"], object[type=\"application/pdf\"]",
                ),
                timeout: VIEWER_TIMEOUT,
            })],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::page::fake::*;
    use super::*;
    use crate::clock::FixedClock;
    use chrono_tz::America::Sao_Paulo;

    const LABEL: &str = "PREFEITURA MUNICIPAL DE JAPERI";
    const PORTAL: &str = "https://portal.example.com/diario";

    fn probe(fail_dir: PathBuf) -> BrowserProbe {
        let clock = Arc::new(FixedClock::at(Sao_Paulo, 2025, 3, 14, 9, 26, 53));
        BrowserProbe::new(
            BrowserProbeConfig {
                portal_url: PORTAL.to_string(),
                org_label: LABEL.to_string(),
                fail_dir,
            },
            clock,
        )
    }

    /// A portal where every step works through the structured locators.
    fn healthy_portal() -> FakePage {
        let viewer = FakeElement::visible().with_attr("src", "/viewer/doc.pdf");
        let link = FakeElement::visible().with_text("Visualizar").reveals(
            Locator::css("iframe[src*=\"pdf\"], embed[type=\"application/pdf\"], object[type=\"application/pdf\"]"),
            viewer,
        );
        let list = FakeElement::visible();
        let select = FakeElement::visible()
            .with_options(&["SELECIONE", LABEL])
            .reveals(Locator::css("[data-testid=\"doc-list\"], .documents-list"), list)
            .reveals(testid("doc-link"), link);
        FakePage::new().with(testid("org-select"), select)
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_reaches_verified() {
        let dir = tempfile::tempdir().unwrap();
        let page = healthy_portal();

        let outcome = probe(dir.path().to_path_buf()).walk(&page).await;
        assert!(outcome.ok);
        assert_eq!(outcome.state, ProbeState::Verified);
        assert!(outcome.screenshot.is_none());
        assert_eq!(page.visited(), vec![PORTAL.to_string()]);

        let messages = outcome.detail.messages();
        assert_eq!(messages.first().map(String::as_str), Some("page loaded"));
        assert_eq!(messages.last().map(String::as_str), Some("document opened successfully"));
        assert!(!messages.iter().any(|m| m.starts_with("erro:")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_org_selector_missing_fails_with_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        // A select exists but does not offer the organization
        let page = FakePage::new().with(Locator::css("select"), FakeElement::visible().with_options(&["2024"]));

        let outcome = probe(dir.path().to_path_buf()).walk(&page).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.state, ProbeState::Failed);

        let messages = outcome.detail.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages[1].starts_with("select by test id failed:"));
        assert!(messages[2].starts_with("scan all selects failed:"));
        assert_eq!(messages[3], "erro: organization selector not found");

        let shot = outcome.screenshot.expect("screenshot path");
        assert!(shot.ends_with("fail_20250314_092653.png"));
        assert!(std::path::Path::new(&shot).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_step_messages_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Organization selects fine, list never appears
        let page = FakePage::new().with(testid("org-select"), FakeElement::visible().with_options(&[LABEL]));

        let outcome = probe(dir.path().to_path_buf()).walk(&page).await;
        let messages = outcome.detail.messages();
        assert_eq!(messages.last().map(String::as_str), Some("erro: document list never became visible"));
        assert!(!messages.iter().any(|m| m.starts_with("document:")));
        assert!(!outcome.ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_load_failure_records_error_and_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = FakePage::new();
        page.fail_goto = Some("net::ERR_NAME_NOT_RESOLVED".to_string());

        let outcome = probe(dir.path().to_path_buf()).walk(&page).await;
        assert!(!outcome.ok);
        match &outcome.detail {
            BrowserDetail::Error { error, trace } => {
                assert!(error.contains("ERR_NAME_NOT_RESOLVED"));
                assert!(!trace.is_empty());
            }
            other => panic!("expected error detail, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_failure_leaves_path_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = FakePage::new();
        page.fail_screenshot = true;

        let outcome = probe(dir.path().to_path_buf()).walk(&page).await;
        assert!(!outcome.ok);
        assert!(outcome.screenshot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_closes_page_and_propagates_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let page = healthy_portal();
        let driver = FakeDriver::new(page.clone());
        let outcome = probe(dir.path().to_path_buf()).run(&driver).await.unwrap();
        assert!(outcome.ok);
        assert!(page.is_closed());

        let driver = FakeDriver::failing(FakePage::new(), 1);
        let err = probe(dir.path().to_path_buf()).run(&driver).await.unwrap_err();
        assert!(matches!(err, ProbeError::Driver(_)));
    }
}
