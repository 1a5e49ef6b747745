use std::collections::HashMap;

use base64::Engine;

use super::{ReportError, ReportKind, ReportSummary};
use crate::store::ProbeResult;

const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
const DAILY_TEMPLATE: &str = include_str!("templates/daily.html");
const MONTHLY_TEMPLATE: &str = include_str!("templates/monthly.html");
const INCIDENT_TEMPLATE: &str = include_str!("templates/incident.html");

pub const NO_INCIDENTS: &str = "No incidents recorded.";

/// Screenshot bytes keyed by the path stored on the record.
pub type Screenshots = HashMap<String, Vec<u8>>;

/// Turns a summary into a document.
pub trait ReportRenderer: Send + Sync {
    /// File extension of rendered documents, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, summary: &ReportSummary, screenshots: &Screenshots) -> Result<Vec<u8>, ReportError>;
}

/// Self-contained HTML documents; screenshots are inlined as data URIs.
#[derive(Debug, Default, Clone)]
pub struct HtmlReportRenderer;

impl ReportRenderer for HtmlReportRenderer {
    fn extension(&self) -> &'static str {
        "html"
    }

    fn render(&self, summary: &ReportSummary, screenshots: &Screenshots) -> Result<Vec<u8>, ReportError> {
        let incidents = if summary.incidents.is_empty() {
            format!("<p class=\"empty\">{}</p>", NO_INCIDENTS)
        } else {
            summary
                .incidents
                .iter()
                .map(|r| render_incident(r, screenshots))
                .collect::<Result<Vec<_>, _>>()?
                .join("\n")
        };

        let (title, template) = match summary.kind {
            ReportKind::Daily => (format!("Daily Report - {}", summary.end), DAILY_TEMPLATE),
            ReportKind::Monthly => (
                format!("Monthly Report - {} to {}", summary.start, summary.end),
                MONTHLY_TEMPLATE,
            ),
        };

        let omitted = match summary.omitted_incidents() {
            0 => String::new(),
            n => format!("<p class=\"omitted\">{} more incidents not shown.</p>", n),
        };

        let content = template
            .replace("{{date}}", &summary.end.to_string())
            .replace("{{start}}", &summary.start.to_string())
            .replace("{{end}}", &summary.end.to_string())
            .replace("{{total}}", &summary.total.to_string())
            .replace("{{ok_count}}", &summary.ok_count.to_string())
            .replace("{{failure_count}}", &summary.failure_count().to_string())
            .replace("{{omitted}}", &omitted)
            .replace("{{incidents}}", &incidents);

        let page = LAYOUT_TEMPLATE
            .replace("{{title}}", &escape_html(&title))
            .replace("{{content}}", &content);

        Ok(page.into_bytes())
    }
}

fn render_incident(record: &ProbeResult, screenshots: &Screenshots) -> Result<String, ReportError> {
    let detail = serde_json::to_string_pretty(&serde_json::json!({
        "ok_http": record.ok_http,
        "http_detail": record.http_detail,
        "ok_playwright": record.ok_playwright,
        "playwright_detail": record.playwright_detail,
    }))?;

    let screenshot = match record.screenshot.as_deref() {
        Some(path) => match screenshots.get(path) {
            Some(bytes) => format!(
                "<img src=\"data:image/png;base64,{}\" alt=\"{}\">",
                base64::engine::general_purpose::STANDARD.encode(bytes),
                escape_html(path)
            ),
            None => format!("<p>Screenshot unavailable: {}</p>", escape_html(path)),
        },
        None => String::new(),
    };

    Ok(INCIDENT_TEMPLATE
        .replace("{{timestamp}}", &escape_html(&record.timestamp))
        .replace("{{detail}}", &escape_html(&detail))
        .replace("{{screenshot}}", &screenshot))
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BrowserDetail, HttpDetail};
    use chrono::NaiveDate;

    fn incident(screenshot: Option<&str>) -> ProbeResult {
        ProbeResult {
            timestamp: "2025-04-10 03:00:00 -03".to_string(),
            site_url: "https://site.example".to_string(),
            portal_url: "https://portal.example".to_string(),
            ok_http: true,
            http_detail: HttpDetail::Response { status_code: 200, elapsed_seconds: 0.2 },
            ok_playwright: false,
            playwright_detail: BrowserDetail::Trail {
                messages: vec!["page loaded".to_string(), "erro: <select> missing".to_string()],
            },
            screenshot: screenshot.map(str::to_string),
            playwright_elapsed_seconds: None,
            performance_degraded: false,
            recorded_at: None,
        }
    }

    fn summary(kind: ReportKind, incidents: Vec<ProbeResult>, total: usize) -> ReportSummary {
        let day = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();
        ReportSummary {
            kind,
            start: day,
            end: day,
            total,
            ok_count: total - incidents.len(),
            incidents,
        }
    }

    fn render(summary: &ReportSummary, screenshots: &Screenshots) -> String {
        let bytes = HtmlReportRenderer.render(summary, screenshots).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_empty_report_says_no_incidents() {
        let html = render(&summary(ReportKind::Daily, vec![], 0), &Screenshots::new());
        assert!(html.contains(NO_INCIDENTS));
        assert!(html.contains("Daily Report - 2025-04-10"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_incident_detail_is_escaped() {
        let html = render(&summary(ReportKind::Daily, vec![incident(None)], 4), &Screenshots::new());
        assert!(html.contains("&lt;select&gt; missing"));
        assert!(html.contains("&quot;ok_playwright&quot;: false"));
        assert!(!html.contains(NO_INCIDENTS));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_screenshot_is_inlined() {
        let path = "relatorio/failures/fail_20250410_030000.png";
        let mut shots = Screenshots::new();
        shots.insert(path.to_string(), vec![0x89, b'P', b'N', b'G']);

        let html = render(&summary(ReportKind::Daily, vec![incident(Some(path))], 1), &shots);
        assert!(html.contains("data:image/png;base64,iVBORw=="));
    }

    #[test]
    fn test_missing_screenshot_is_noted() {
        let html = render(
            &summary(ReportKind::Daily, vec![incident(Some("gone.png"))], 1),
            &Screenshots::new(),
        );
        assert!(html.contains("Screenshot unavailable: gone.png"));
    }

    #[test]
    fn test_monthly_notes_omitted_incidents() {
        let mut s = summary(ReportKind::Monthly, vec![incident(None)], 10);
        s.ok_count = 5;
        let html = render(&s, &Screenshots::new());
        assert!(html.contains("4 more incidents not shown."));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
