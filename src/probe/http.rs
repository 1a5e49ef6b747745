//! HTTP probe implementation.

use std::time::{Duration, Instant};

use crate::store::HttpDetail;

/// Default bound on the whole request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Reachability verdict and its evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpOutcome {
    pub ok: bool,
    pub detail: HttpDetail,
}

impl HttpOutcome {
    fn error(message: String) -> Self {
        Self {
            ok: false,
            detail: HttpDetail::Error { error: message },
        }
    }
}

/// Run an HTTP GET against the given URL.
///
/// Success means status 200 exactly. Network and protocol errors become an
/// error detail; nothing is retried here.
pub async fn run_http_probe(url: &str, timeout: Duration) -> HttpOutcome {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => return HttpOutcome::error(e.to_string()),
    };

    let start = Instant::now();

    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            tracing::warn!("HTTP probe to {} timed out after {:?}", url, timeout);
            return HttpOutcome::error(format!("request timed out after {:?}: {}", timeout, e));
        }
        Err(e) => {
            tracing::warn!("HTTP probe to {} failed: {}", url, e);
            return HttpOutcome::error(e.to_string());
        }
    };

    let status = response.status().as_u16();

    // Read the full body to measure complete transfer time
    if let Err(e) = response.bytes().await {
        tracing::warn!("HTTP probe to {} failed reading body: {}", url, e);
        return HttpOutcome::error(e.to_string());
    }

    let elapsed = start.elapsed().as_secs_f64();
    if status != 200 {
        tracing::warn!("HTTP probe to {} returned status {}", url, status);
    }

    HttpOutcome {
        ok: status == 200,
        detail: HttpDetail::Response {
            status_code: status,
            elapsed_seconds: elapsed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_probe_ok_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let outcome = run_http_probe(&server.uri(), Duration::from_secs(5)).await;
        assert!(outcome.ok);
        match outcome.detail {
            HttpDetail::Response { status_code, elapsed_seconds } => {
                assert_eq!(status_code, 200);
                assert!(elapsed_seconds >= 0.0);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_probe_non_200_is_failure() {
        let server = MockServer::start().await;
        for status in [204, 301, 503] {
            server.reset().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let outcome = run_http_probe(&server.uri(), Duration::from_secs(5)).await;
            assert!(!outcome.ok, "status {} must not be ok", status);
            assert!(matches!(
                outcome.detail,
                HttpDetail::Response { status_code, .. } if status_code == status
            ));
        }
    }

    #[tokio::test]
    async fn test_http_probe_timeout_sets_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let outcome = run_http_probe(&server.uri(), Duration::from_millis(100)).await;
        assert!(!outcome.ok);
        assert!(matches!(outcome.detail, HttpDetail::Error { .. }));
    }

    #[tokio::test]
    async fn test_http_probe_invalid_url() {
        let outcome = run_http_probe("http://256.256.256.256", Duration::from_millis(100)).await;
        assert!(!outcome.ok);
        assert!(matches!(outcome.detail, HttpDetail::Error { .. }));
    }
}
