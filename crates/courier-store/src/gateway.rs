//! Ordered gateway fallback for content retrieval
//!
//! Each gateway is tried in caller-supplied order with its own timeout. The
//! first success wins and no later gateway is contacted. Only when every
//! gateway has failed does the fetch fail, with
//! [`CourierError::AllGatewaysFailed`] carrying the last error seen.

use async_trait::async_trait;
use courier_core::{ContentLocator, CourierError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Placeholder replaced by the locator inside a gateway template
pub const LOCATOR_PLACEHOLDER: &str = "{locator}";

/// Plain GET against one URL
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Fetch the body at `url`; non-success statuses are errors
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed gateway client
#[derive(Debug, Clone, Default)]
pub struct HttpGatewayClient {
    client: reqwest::Client,
}

impl HttpGatewayClient {
    /// Client with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CourierError::transport(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::transport(format!(
                "GET {url} returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CourierError::transport(format!("Reading body from {url} failed: {e}")))?;
        Ok(body.to_vec())
    }
}

/// One configured gateway URL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTemplate(String);

impl GatewayTemplate {
    /// Wrap a template string
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Template text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Concrete URL for `locator`: placeholder substitution, else `<base><locator>`
    pub fn render(&self, locator: &ContentLocator) -> String {
        if self.0.contains(LOCATOR_PLACEHOLDER) {
            self.0.replace(LOCATOR_PLACEHOLDER, locator.as_str())
        } else {
            format!("{}{}", self.0, locator.as_str())
        }
    }
}

/// What happened on one gateway attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Content returned
    Success {
        /// Body length
        bytes: usize,
    },
    /// Attempt exceeded the per-gateway timeout
    TimedOut,
    /// Transport or HTTP error
    Failed(String),
}

/// Record of one gateway attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAttempt {
    /// Gateway template that was tried
    pub gateway: String,
    /// Result of the attempt
    pub outcome: AttemptOutcome,
    /// Wall time spent
    pub elapsed: Duration,
}

/// Sequential gateway fetcher
#[derive(Clone)]
pub struct GatewayFetcher {
    client: Arc<dyn GatewayClient>,
    gateways: Vec<GatewayTemplate>,
    per_gateway_timeout: Duration,
}

impl std::fmt::Debug for GatewayFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayFetcher")
            .field("gateways", &self.gateways)
            .field("per_gateway_timeout", &self.per_gateway_timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayFetcher {
    /// Fetcher over `gateways`, tried in the given order
    pub fn new<I, S>(client: Arc<dyn GatewayClient>, gateways: I, per_gateway_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client,
            gateways: gateways
                .into_iter()
                .map(Into::<String>::into)
                .filter(|g| !g.trim().is_empty())
                .map(GatewayTemplate::new)
                .collect(),
            per_gateway_timeout,
        }
    }

    /// Configured gateways in order
    pub fn gateways(&self) -> &[GatewayTemplate] {
        &self.gateways
    }

    /// Fetch the content at `locator`
    pub async fn fetch(&self, locator: &ContentLocator) -> Result<Vec<u8>> {
        self.fetch_with_report(locator).await.0
    }

    /// Fetch and also return the record of every attempt made
    pub async fn fetch_with_report(
        &self,
        locator: &ContentLocator,
    ) -> (Result<Vec<u8>>, Vec<GatewayAttempt>) {
        let mut attempts = Vec::with_capacity(self.gateways.len());
        let mut last_error = String::from("no gateways configured");

        for gateway in &self.gateways {
            let url = gateway.render(locator);
            let started = Instant::now();
            let result = tokio::time::timeout(self.per_gateway_timeout, self.client.get(&url)).await;
            let elapsed = started.elapsed();

            match result {
                Ok(Ok(body)) => {
                    tracing::debug!(
                        gateway = gateway.as_str(),
                        %locator,
                        bytes = body.len(),
                        "Gateway fetch succeeded"
                    );
                    attempts.push(GatewayAttempt {
                        gateway: gateway.as_str().to_string(),
                        outcome: AttemptOutcome::Success { bytes: body.len() },
                        elapsed,
                    });
                    return (Ok(body), attempts);
                }
                Ok(Err(err)) => {
                    tracing::warn!(gateway = gateway.as_str(), %locator, error = %err, "Gateway fetch failed");
                    last_error = err.to_string();
                    attempts.push(GatewayAttempt {
                        gateway: gateway.as_str().to_string(),
                        outcome: AttemptOutcome::Failed(last_error.clone()),
                        elapsed,
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        gateway = gateway.as_str(),
                        %locator,
                        timeout_ms = self.per_gateway_timeout.as_millis() as u64,
                        "Gateway fetch timed out"
                    );
                    last_error = format!(
                        "{} timed out after {:?}",
                        gateway.as_str(),
                        self.per_gateway_timeout
                    );
                    attempts.push(GatewayAttempt {
                        gateway: gateway.as_str().to_string(),
                        outcome: AttemptOutcome::TimedOut,
                        elapsed,
                    });
                }
            }
        }

        let error = CourierError::AllGatewaysFailed {
            attempts: attempts.len(),
            last_error,
        };
        (Err(error), attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Per-URL-prefix scripted behaviour with a hit log
    #[derive(Default)]
    struct Scripted {
        routes: HashMap<String, Route>,
        hits: Mutex<Vec<String>>,
    }

    #[derive(Clone)]
    enum Route {
        Ok(Vec<u8>),
        Err,
        Hang,
    }

    impl Scripted {
        fn route(mut self, prefix: &str, route: Route) -> Self {
            self.routes.insert(prefix.to_string(), route);
            self
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GatewayClient for Scripted {
        async fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.hits.lock().unwrap().push(url.to_string());
            let route = self
                .routes
                .iter()
                .find(|(prefix, _)| url.starts_with(prefix.as_str()))
                .map(|(_, r)| r.clone())
                .unwrap_or(Route::Err);
            match route {
                Route::Ok(body) => Ok(body),
                Route::Err => Err(CourierError::transport("503")),
                Route::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn locator() -> ContentLocator {
        ContentLocator::new("QmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4")
    }

    #[test]
    fn test_template_rendering() {
        let loc = locator();
        assert_eq!(
            GatewayTemplate::new("https://a/ipfs/").render(&loc),
            format!("https://a/ipfs/{loc}")
        );
        assert_eq!(
            GatewayTemplate::new("https://{locator}.ipfs.b/").render(&loc),
            format!("https://{loc}.ipfs.b/")
        );
    }

    #[tokio::test]
    async fn test_first_success_stops_the_walk() {
        let client = Arc::new(
            Scripted::default()
                .route("https://a/", Route::Ok(b"A".to_vec()))
                .route("https://b/", Route::Ok(b"B".to_vec())),
        );
        let fetcher = GatewayFetcher::new(
            client.clone(),
            ["https://a/", "https://b/"],
            Duration::from_secs(1),
        );
        assert_eq!(fetcher.fetch(&locator()).await.unwrap(), b"A");
        assert_eq!(client.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_falls_through_failures_in_order() {
        let client = Arc::new(
            Scripted::default()
                .route("https://a/", Route::Err)
                .route("https://b/", Route::Err)
                .route("https://c/", Route::Ok(b"C".to_vec())),
        );
        let fetcher = GatewayFetcher::new(
            client.clone(),
            ["https://a/", "https://b/", "https://c/"],
            Duration::from_secs(1),
        );
        let (result, attempts) = fetcher.fetch_with_report(&locator()).await;
        assert_eq!(result.unwrap(), b"C");
        assert_eq!(attempts.len(), 3);
        let hits = client.hits();
        assert!(hits[0].starts_with("https://a/"));
        assert!(hits[1].starts_with("https://b/"));
        assert!(hits[2].starts_with("https://c/"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_moves_to_next_gateway() {
        let client = Arc::new(
            Scripted::default()
                .route("https://slow/", Route::Hang)
                .route("https://fast/", Route::Ok(b"F".to_vec())),
        );
        let fetcher = GatewayFetcher::new(
            client,
            ["https://slow/", "https://fast/"],
            Duration::from_millis(50),
        );
        let (result, attempts) = fetcher.fetch_with_report(&locator()).await;
        assert_eq!(result.unwrap(), b"F");
        assert_eq!(attempts[0].outcome, AttemptOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_gateways_failed() {
        let client = Arc::new(
            Scripted::default()
                .route("https://a/", Route::Err)
                .route("https://b/", Route::Hang),
        );
        let fetcher = GatewayFetcher::new(
            client.clone(),
            ["https://a/", "https://b/"],
            Duration::from_millis(10),
        );
        match fetcher.fetch(&locator()).await {
            Err(CourierError::AllGatewaysFailed { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected AllGatewaysFailed, got {other:?}"),
        }
        assert_eq!(client.hits().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_gateway_list_fails() {
        let fetcher = GatewayFetcher::new(
            Arc::new(Scripted::default()),
            Vec::<String>::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            fetcher.fetch(&locator()).await,
            Err(CourierError::AllGatewaysFailed { attempts: 0, .. })
        ));
    }
}
