// Network surface — typed fetch errors, the HttpFetch trait, and the
// observation hub that replaces direct access to the page's network stack.
//
// Everything that touches the wire goes through `HttpFetch`, so tests can
// script responses without a server. The `NetworkHub` is a broadcast of
// observed page traffic: the passive GraphQL capture holds a long-lived tap,
// and the timed video listener holds a scoped one that is released by drop
// on every exit path (capture, timeout, error).

pub mod hls;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Failure taxonomy for network operations.
///
/// `is_transient` decides retryability: server errors, network-level
/// failures and timeouts may recover on a later attempt; client errors
/// and malformed input never do.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(code) => (500..600).contains(code),
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::Malformed(_) => false,
        }
    }
}

/// Minimal HTTP surface the pipeline needs: existence checks, manifest
/// text, and authenticated JSON. Implementations must be async because
/// the real one is a reqwest client.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Issue a HEAD request; Ok means a 2xx status.
    async fn head(&self, url: &str) -> Result<(), FetchError>;

    /// Fetch a body as text (HLS manifests).
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch JSON with extra request headers (GraphQL replay).
    async fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value, FetchError>;
}

/// Default timeout for individual requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed `HttpFetch`.
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_builder() {
        FetchError::Malformed(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn head(&self, url: &str) -> Result<(), FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(map_reqwest_error)
    }

    async fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.json().await.map_err(map_reqwest_error)
    }
}

/// One observed page-network occurrence.
///
/// `Request` is the URL of an outgoing call (enough for CDN sniffing);
/// `JsonResponse` carries a parsed response body for the GraphQL routes
/// the passive capture cares about.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Request { url: String },
    JsonResponse { url: String, body: Arc<Value> },
}

impl NetworkEvent {
    pub fn url(&self) -> &str {
        match self {
            NetworkEvent::Request { url } => url,
            NetworkEvent::JsonResponse { url, .. } => url,
        }
    }
}

/// Buffered events per tap; laggards skip, they don't block publishers.
const HUB_CAPACITY: usize = 64;

/// Broadcast hub of observed page traffic.
///
/// Publishing never blocks and succeeds even with no listeners. Taps are
/// plain broadcast receivers: dropping one ends its subscription, which is
/// what makes the timed listener's release-on-exit structural.
#[derive(Clone)]
pub struct NetworkHub {
    tx: broadcast::Sender<NetworkEvent>,
}

impl NetworkHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Publish an observed event. Dropped silently when nobody listens.
    pub fn publish(&self, event: NetworkEvent) {
        let _ = self.tx.send(event);
    }

    /// Open a scoped subscription. Dropping the tap unsubscribes.
    pub fn tap(&self) -> NetworkTap {
        NetworkTap {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for NetworkHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to the hub.
pub struct NetworkTap {
    rx: broadcast::Receiver<NetworkEvent>,
}

impl NetworkTap {
    /// Wait for the next event. `None` once the hub is gone. A lagged
    /// tap skips what it missed rather than erroring out.
    pub async fn next(&mut self) -> Option<NetworkEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "network tap lagged, skipping");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
