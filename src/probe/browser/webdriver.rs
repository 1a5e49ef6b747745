//! W3C WebDriver client for a headless Chrome behind chromedriver.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};

use super::page::{BrowserDriver, ElementRef, Locator, Page, PageError};
use crate::probe::ProbeError;

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Upper bound for a single driver command; must exceed the page load timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Starts headless Chrome sessions through a WebDriver endpoint.
pub struct WebDriverBrowser {
    endpoint: String,
    client: reqwest::Client,
}

impl WebDriverBrowser {
    pub fn new(endpoint: &str) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn capabilities() -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--no-sandbox",
                            "--disable-dev-shm-usage",
                            "--window-size=1920,1080"
                        ]
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn launch(&self) -> Result<Box<dyn Page>, ProbeError> {
        let response = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&Self::capabilities())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(COMMAND_TIMEOUT)
                } else {
                    ProbeError::Network(format!("WebDriver at {} unreachable: {}", self.endpoint, e))
                }
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::Driver(format!("invalid session response: {}", e)))?;

        if !status.is_success() {
            let failure = DriverFailure::from_body(&body);
            return Err(ProbeError::Driver(format!(
                "session not created: {}: {}",
                failure.error, failure.message
            )));
        }

        let session_id = body["value"]["sessionId"]
            .as_str()
            .or_else(|| body["sessionId"].as_str())
            .ok_or_else(|| ProbeError::Driver("session response without sessionId".to_string()))?;

        tracing::debug!("WebDriver session {} started", session_id);

        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

/// Error payload of a failed WebDriver command.
#[derive(Debug, Clone)]
struct DriverFailure {
    error: String,
    message: String,
}

impl DriverFailure {
    fn from_body(body: &Value) -> Self {
        let value = &body["value"];
        Self {
            error: value["error"].as_str().unwrap_or("unknown error").to_string(),
            message: value["message"].as_str().unwrap_or_default().to_string(),
        }
    }

    fn is_missing_element(&self) -> bool {
        matches!(self.error.as_str(), "no such element" | "stale element reference")
    }
}

/// One WebDriver session.
pub struct WebDriverPage {
    client: reqwest::Client,
    session_url: String,
}

impl WebDriverPage {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverCallError> {
        let url = format!("{}{}", self.session_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DriverCallError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverCallError::Transport(format!("invalid response: {}", e)))?;

        if status.is_success() {
            Ok(body.get("value").cloned().unwrap_or(Value::Null))
        } else {
            Err(DriverCallError::Command(DriverFailure::from_body(&body)))
        }
    }

    /// Run a Chrome DevTools Protocol command through chromedriver.
    async fn cdp(&self, cmd: &str, params: Value) -> Result<Value, DriverCallError> {
        self.command(
            Method::POST,
            "/goog/cdp/execute",
            Some(json!({ "cmd": cmd, "params": params })),
        )
        .await
    }

    async fn full_page_screenshot(&self) -> Result<Vec<u8>, PageError> {
        let mut params = json!({ "format": "png", "captureBeyondViewport": true });

        let metrics = self.cdp("Page.getLayoutMetrics", json!({})).await?;
        let size = metrics.get("cssContentSize").or_else(|| metrics.get("contentSize"));
        if let Some((width, height)) = size.and_then(|s| Some((s["width"].as_f64()?, s["height"].as_f64()?))) {
            params["clip"] = json!({ "x": 0, "y": 0, "width": width, "height": height, "scale": 1 });
        }

        let shot = self.cdp("Page.captureScreenshot", params).await?;
        decode_png(&shot["data"])
    }

    fn element_path(element: &ElementRef, suffix: &str) -> String {
        format!("/element/{}/{}", element.0, suffix)
    }
}

enum DriverCallError {
    Transport(String),
    Command(DriverFailure),
}

impl From<DriverCallError> for PageError {
    fn from(e: DriverCallError) -> Self {
        match e {
            DriverCallError::Transport(msg) => PageError::Driver(msg),
            DriverCallError::Command(f) if f.is_missing_element() => PageError::NotFound(f.message),
            DriverCallError::Command(f) => PageError::Driver(format!("{}: {}", f.error, f.message)),
        }
    }
}

fn parse_elements(value: &Value) -> Vec<ElementRef> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item[ELEMENT_KEY].as_str())
                .map(|id| ElementRef(id.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn locator_body(locator: &Locator) -> Value {
    match locator {
        Locator::Css(s) => json!({ "using": "css selector", "value": s }),
        Locator::XPath(s) => json!({ "using": "xpath", "value": s }),
    }
}

fn decode_png(value: &Value) -> Result<Vec<u8>, PageError> {
    let encoded = value
        .as_str()
        .ok_or_else(|| PageError::Driver("screenshot response is not a string".to_string()))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PageError::Driver(format!("invalid screenshot data: {}", e)))
}

/// Quote a string as an XPath 1.0 literal.
fn xpath_literal(s: &str) -> String {
    if !s.contains('"') {
        format!("\"{}\"", s)
    } else if !s.contains('\'') {
        format!("'{}'", s)
    } else {
        let parts: Vec<String> = s.split('"').map(|p| format!("\"{}\"", p)).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), PageError> {
        self.command(
            Method::POST,
            "/timeouts",
            Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
        )
        .await?;

        match self.command(Method::POST, "/url", Some(json!({ "url": url }))).await {
            Ok(_) => Ok(()),
            Err(DriverCallError::Command(f)) if f.error == "timeout" => Err(PageError::Timeout {
                what: format!("page load of {}", url),
                timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, PageError> {
        let value = self
            .command(Method::POST, "/elements", Some(locator_body(locator)))
            .await?;
        Ok(parse_elements(&value))
    }

    async fn is_visible(&self, element: &ElementRef) -> Result<bool, PageError> {
        match self
            .command(Method::GET, &Self::element_path(element, "displayed"), None)
            .await
        {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            // Element went away between lookup and check
            Err(DriverCallError::Command(f)) if f.is_missing_element() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        self.command(Method::POST, &Self::element_path(element, "click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, PageError> {
        let v = self
            .command(Method::GET, &Self::element_path(element, "text"), None)
            .await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, PageError> {
        let v = self
            .command(Method::GET, &Self::element_path(element, &format!("attribute/{}", name)), None)
            .await?;
        Ok(v.as_str().map(str::to_string))
    }

    async fn select_option_by_label(&self, element: &ElementRef, label: &str) -> Result<(), PageError> {
        let query = json!({
            "using": "xpath",
            "value": format!(".//option[normalize-space(.)={}]", xpath_literal(label.trim())),
        });
        let value = self
            .command(Method::POST, &Self::element_path(element, "elements"), Some(query))
            .await?;

        let option = parse_elements(&value)
            .into_iter()
            .next()
            .ok_or_else(|| PageError::NotFound(format!("option {:?}", label)))?;
        self.click(&option).await
    }

    /// Full page through Chrome DevTools; plain viewport capture if the
    /// driver does not expose DevTools commands.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        match self.full_page_screenshot().await {
            Ok(png) => Ok(png),
            Err(e) => {
                tracing::debug!("Full-page capture unavailable, using viewport: {}", e);
                let v = self.command(Method::GET, "/screenshot", None).await?;
                decode_png(&v)
            }
        }
    }

    async fn close(&self) -> Result<(), PageError> {
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}
