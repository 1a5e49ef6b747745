//! Browser page capability used by the interaction probe.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::probe::ProbeError;

/// How often visibility waits re-query the page.
pub(super) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Page-level error types.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("no element matches {0}")]
    NotFound(String),
    #[error("driver command failed: {0}")]
    Driver(String),
}

/// Element query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn xpath(expr: &str) -> Self {
        Locator::XPath(expr.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{}`", s),
            Locator::XPath(s) => write!(f, "xpath `{}`", s),
        }
    }
}

/// Opaque handle to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// One open browser page.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load to settle, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), PageError>;

    /// Every element matching the locator, in document order.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, PageError>;

    async fn is_visible(&self, element: &ElementRef) -> Result<bool, PageError>;

    async fn click(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn text(&self, element: &ElementRef) -> Result<String, PageError>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, PageError>;

    /// Choose the option of a select control whose visible label equals `label`.
    async fn select_option_by_label(&self, element: &ElementRef, label: &str) -> Result<(), PageError>;

    /// PNG image of the page.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;

    async fn close(&self) -> Result<(), PageError>;
}

/// Launches browser pages.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Start a fresh page. Failure here is an infrastructure error.
    async fn launch(&self) -> Result<Box<dyn Page>, ProbeError>;
}

/// Wait until some element matching `locator` is visible; return the first one.
pub async fn wait_visible(
    page: &dyn Page,
    locator: &Locator,
    timeout: Duration,
) -> Result<ElementRef, PageError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        for element in page.find_all(locator).await? {
            if page.is_visible(&element).await? {
                return Ok(element);
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(PageError::Timeout {
                what: locator.to_string(),
                timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Check an element's visibility, waiting up to `timeout` for it to appear.
pub async fn wait_element_visible(
    page: &dyn Page,
    element: &ElementRef,
    timeout: Duration,
) -> Result<(), PageError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if page.is_visible(element).await? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PageError::Timeout {
                what: format!("element {}", element.0),
                timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
