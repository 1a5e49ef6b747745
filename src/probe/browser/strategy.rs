//! Fallback strategies for each step of the portal walk.
//!
//! A step owns an ordered list of strategies; the first one to succeed wins.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::page::{wait_element_visible, wait_visible, Locator, Page, PageError, POLL_INTERVAL};

/// Result of one strategy or one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Carries the trail message describing what worked.
    Success(String),
    Failure { reason: String },
}

impl StepOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        StepOutcome::Failure { reason: reason.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }
}

impl From<PageError> for StepOutcome {
    fn from(e: PageError) -> Self {
        StepOutcome::failure(e.to_string())
    }
}

/// One candidate way of performing a step.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, page: &dyn Page) -> StepOutcome;
}

/// Select the configured label in the control found by a structured locator.
pub struct SelectByLocator {
    pub locator: Locator,
    pub label: String,
    pub timeout: Duration,
}

#[async_trait]
impl Strategy for SelectByLocator {
    fn name(&self) -> &str {
        "select by test id"
    }

    async fn attempt(&self, page: &dyn Page) -> StepOutcome {
        let select = match wait_visible(page, &self.locator, self.timeout).await {
            Ok(el) => el,
            Err(e) => return e.into(),
        };
        match page.select_option_by_label(&select, &self.label).await {
            Ok(()) => StepOutcome::Success(format!("select: selected {:?} via {}", self.label, self.locator)),
            Err(e) => e.into(),
        }
    }
}

/// Try a label-match selection on every select control on the page.
pub struct ScanSelects {
    pub label: String,
    /// Visibility bound for each control
    pub timeout: Duration,
}

#[async_trait]
impl Strategy for ScanSelects {
    fn name(&self) -> &str {
        "scan all selects"
    }

    async fn attempt(&self, page: &dyn Page) -> StepOutcome {
        let selects = match page.find_all(&Locator::css("select")).await {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        if selects.is_empty() {
            return StepOutcome::failure("no select controls on page");
        }

        let mut last_error = None;
        for (idx, select) in selects.iter().enumerate() {
            let result = match wait_element_visible(page, select, self.timeout).await {
                Ok(()) => page.select_option_by_label(select, &self.label).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    return StepOutcome::Success(format!(
                        "select: selected {:?} in select #{}",
                        self.label,
                        idx + 1
                    ))
                }
                Err(e) => last_error = Some(e),
            }
        }

        StepOutcome::failure(format!(
            "none of {} select controls offered {:?} (last error: {})",
            selects.len(),
            self.label,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}

/// Wait for an element to become visible.
pub struct WaitVisible {
    pub label: &'static str,
    pub locator: Locator,
    pub timeout: Duration,
}

#[async_trait]
impl Strategy for WaitVisible {
    fn name(&self) -> &str {
        self.label
    }

    async fn attempt(&self, page: &dyn Page) -> StepOutcome {
        match wait_visible(page, &self.locator, self.timeout).await {
            Ok(_) => StepOutcome::Success(format!("{}: visible", self.label)),
            Err(e) => e.into(),
        }
    }
}

/// Click the first visible element matching a structured locator.
pub struct ClickLocator {
    pub locator: Locator,
    pub timeout: Duration,
}

#[async_trait]
impl Strategy for ClickLocator {
    fn name(&self) -> &str {
        "document link by test id"
    }

    async fn attempt(&self, page: &dyn Page) -> StepOutcome {
        let link = match wait_visible(page, &self.locator, self.timeout).await {
            Ok(el) => el,
            Err(e) => return e.into(),
        };
        match page.click(&link).await {
            Ok(()) => StepOutcome::Success(format!("document: clicked {}", self.locator)),
            Err(e) => e.into(),
        }
    }
}

/// Click the first visible link whose text or href looks like a document.
pub struct ClickMatchingLink {
    pub pattern: Regex,
    pub timeout: Duration,
}

impl ClickMatchingLink {
    /// Links reading like "view", "download" or "visualizar", or pointing at a PDF.
    pub fn document_links(timeout: Duration) -> Self {
        static DOC_LINK: OnceLock<Regex> = OnceLock::new();
        let pattern = DOC_LINK
            .get_or_init(|| Regex::new(r"(?i)visualizar|\bview\b|download|abrir|documento|pdf").unwrap());
        Self {
            pattern: pattern.clone(),
            timeout,
        }
    }
}

#[async_trait]
impl Strategy for ClickMatchingLink {
    fn name(&self) -> &str {
        "document link by text"
    }

    async fn attempt(&self, page: &dyn Page) -> StepOutcome {
        let links = match page.find_all(&Locator::css("a")).await {
            Ok(l) => l,
            Err(e) => return e.into(),
        };

        let mut candidates = Vec::new();
        for link in &links {
            let text = page.text(link).await.unwrap_or_default();
            let href = page.attribute(link, "href").await.ok().flatten().unwrap_or_default();
            if self.pattern.is_match(&text) || self.pattern.is_match(&href) {
                candidates.push((link, text, href));
            }
        }

        // One deadline for all candidates, not one per link
        let deadline = tokio::time::Instant::now() + self.timeout;
        while !candidates.is_empty() {
            for (link, text, href) in &candidates {
                if !page.is_visible(link).await.unwrap_or(false) {
                    continue;
                }
                if page.click(link).await.is_ok() {
                    return StepOutcome::Success(format!(
                        "document: clicked link {:?} (href={})",
                        text.trim(),
                        href.chars().take(60).collect::<String>()
                    ));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        StepOutcome::failure(format!("no document-like link among {} links", links.len()))
    }
}
