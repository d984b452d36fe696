//! The HTTP seam used by the prober.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;

use super::probe::ProbeError;

/// Status and body of a probe response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET-only HTTP interface.
pub trait HealthClient: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, ProbeError>> + Send + 'a>>;
}

/// reqwest-backed client.
#[derive(Clone, Default)]
pub struct HttpHealthClient {
    http: Client,
}

impl HttpHealthClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

impl HealthClient for HttpHealthClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, ProbeError>> + Send + 'a>> {
        Box::pin(async move {
            let res = self
                .http
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ProbeError::Request {
                    url: url.to_string(),
                    reason: error_chain(&e),
                })?;
            let status = res.status().as_u16();
            let body = res.text().await.map_err(|e| ProbeError::Request {
                url: url.to_string(),
                reason: error_chain(&e),
            })?;
            Ok(HttpResponse { status, body })
        })
    }
}

/// `outer: inner: innermost`; reqwest hides the useful part in sources.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Scripted client for tests.
///
/// Each URL has a queue of responses. The last queued response repeats, so a
/// single entry answers every poll. Unknown URLs fail like a refused
/// connection.
#[derive(Default)]
pub struct FakeHealthClient {
    routes: Mutex<HashMap<String, VecDeque<Result<HttpResponse, String>>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHealthClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.push(url, Ok(HttpResponse { status, body: body.to_string() }));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.push(url, Err(reason.to_string()));
    }

    fn push(&self, url: &str, entry: Result<HttpResponse, String>) {
        self.routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(url.to_string())
            .or_default()
            .push_back(entry);
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl HealthClient for FakeHealthClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, ProbeError>> + Send + 'a>> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(url.to_string());

        let entry = {
            let mut routes = self.routes.lock().unwrap_or_else(|p| p.into_inner());
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        Box::pin(async move {
            match entry {
                Some(Ok(response)) => Ok(response),
                Some(Err(reason)) => Err(ProbeError::Request {
                    url: url.to_string(),
                    reason,
                }),
                None => Err(ProbeError::Request {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(HttpResponse { status: 200, body: String::new() }.is_success());
        assert!(HttpResponse { status: 204, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 500, body: String::new() }.is_success());
    }

    #[test]
    fn test_error_chain_skips_repeated_causes() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "error sending request")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }
        let err = Outer(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"));
        assert_eq!(error_chain(&err), "error sending request: connection refused");
    }

    #[tokio::test]
    async fn test_fake_client_repeats_last_response() {
        let client = FakeHealthClient::new();
        client.respond("http://a/live", 503, "starting");
        client.respond("http://a/live", 200, "{}");

        let first = client.get("http://a/live", Duration::from_secs(1)).await.unwrap();
        let second = client.get("http://a/live", Duration::from_secs(1)).await.unwrap();
        let third = client.get("http://a/live", Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.status, 503);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_fake_client_unknown_url_is_refused() {
        let client = FakeHealthClient::new();
        let err = client.get("http://nowhere/live", Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
