//! Log record types.

use serde::{Deserialize, Serialize};

/// Evidence gathered by the HTTP probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HttpDetail {
    Response {
        status_code: u16,
        #[serde(alias = "elapsed")]
        elapsed_seconds: f64,
    },
    Error {
        error: String,
    },
}

/// Diagnostic trail of the browser probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrowserDetail {
    /// The interaction ran; one message per step or strategy.
    Trail { messages: Vec<String> },
    /// The interaction never got past loading the page, or the driver failed.
    Error {
        error: String,
        #[serde(alias = "traceback", default)]
        trace: String,
    },
}

impl BrowserDetail {
    pub fn messages(&self) -> &[String] {
        match self {
            BrowserDetail::Trail { messages } => messages,
            BrowserDetail::Error { .. } => &[],
        }
    }
}

/// The record of one full check cycle.
///
/// Field names are the on-disk JSON keys. `ok_playwright` and
/// `playwright_detail` hold the browser probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub timestamp: String,
    pub site_url: String,
    pub portal_url: String,
    pub ok_http: bool,
    pub http_detail: HttpDetail,
    pub ok_playwright: bool,
    pub playwright_detail: BrowserDetail,
    /// Only set for failed browser probes whose capture succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Wall time of the browser probe; absent when it never completed
    #[serde(default, alias = "playwright_elapsed", skip_serializing_if = "Option::is_none")]
    pub playwright_elapsed_seconds: Option<f64>,
    /// HTTP or browser probe was slower than its threshold
    #[serde(default)]
    pub performance_degraded: bool,
    /// Stamped by the log store on append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl ProbeResult {
    /// Both probes succeeded.
    pub fn is_ok(&self) -> bool {
        self.ok_http && self.ok_playwright
    }

    pub fn is_incident(&self) -> bool {
        !self.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_record_parses() {
        let line = r#"{"timestamp": "2025-01-10 09:00:00 -03", "site_url": "https://a", "portal_url": "https://b",
            "ok_http": true, "http_detail": {"status_code": 200, "elapsed": 0.31},
            "ok_playwright": false, "playwright_detail": {"error": "boom", "traceback": "tb"},
            "screenshot": null, "recorded_at": "2025-01-10 09:00:05 -03"}"#;
        let record: ProbeResult = serde_json::from_str(line).unwrap();
        assert_eq!(
            record.http_detail,
            HttpDetail::Response { status_code: 200, elapsed_seconds: 0.31 }
        );
        assert_eq!(
            record.playwright_detail,
            BrowserDetail::Error { error: "boom".into(), trace: "tb".into() }
        );
        assert!(record.screenshot.is_none());
        assert!(record.is_incident());
    }

    #[test]
    fn test_performance_fields() {
        let legacy = r#"{"timestamp": "2025-01-10 09:00:00 -03", "site_url": "https://a", "portal_url": "https://b",
            "ok_http": true, "http_detail": {"status_code": 200, "elapsed": 6.2},
            "ok_playwright": true, "playwright_detail": {"messages": []},
            "playwright_elapsed": 12.5, "performance_degraded": true}"#;
        let record: ProbeResult = serde_json::from_str(legacy).unwrap();
        assert_eq!(record.playwright_elapsed_seconds, Some(12.5));
        assert!(record.performance_degraded);

        let older = r#"{"timestamp": "t", "site_url": "a", "portal_url": "b", "ok_http": true,
            "http_detail": {"status_code": 200, "elapsed_seconds": 0.2}, "ok_playwright": true,
            "playwright_detail": {"messages": []}}"#;
        let record: ProbeResult = serde_json::from_str(older).unwrap();
        assert_eq!(record.playwright_elapsed_seconds, None);
        assert!(!record.performance_degraded);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("playwright_elapsed_seconds").is_none());
        assert_eq!(json["performance_degraded"], false);
    }

    #[test]
    fn test_detail_variants_serialize_flat() {
        let detail = HttpDetail::Error { error: "timed out".into() };
        assert_eq!(serde_json::to_string(&detail).unwrap(), r#"{"error":"timed out"}"#);

        let trail = BrowserDetail::Trail { messages: vec!["page loaded".into()] };
        assert_eq!(serde_json::to_string(&trail).unwrap(), r#"{"messages":["page loaded"]}"#);
        assert_eq!(trail.messages(), ["page loaded".to_string()]);
    }
}
