//! HTTP seam.

use crate::OutboxResult;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A GET request with its own timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    pub url: String,
    pub timeout: Duration,
}

impl NetworkRequest {
    pub fn get(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub status: u16,
    pub body: String,
}

/// Performs outbound requests.
///
/// `None` means no response was obtained at all (DNS failure, refused
/// connection, timeout, malformed URL).
#[async_trait]
pub trait NetworkService: Send + Sync {
    async fn send(&self, request: NetworkRequest) -> Option<NetworkResponse>;
}

/// [`NetworkService`] backed by a shared reqwest client.
pub struct ReqwestNetworkService {
    client: Client,
}

impl ReqwestNetworkService {
    pub fn new() -> OutboxResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkService for ReqwestNetworkService {
    async fn send(&self, request: NetworkRequest) -> Option<NetworkResponse> {
        debug!(url = %request.url, timeout_ms = request.timeout.as_millis() as u64, "Sending request");

        let response = match self
            .client
            .get(&request.url)
            .timeout(request.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Request failed without response");
                return None;
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Some(NetworkResponse { status, body })
    }
}

/// Send a request in the background and ignore the response.
pub fn fire_and_forget(network: Arc<dyn NetworkService>, request: NetworkRequest) {
    tokio::spawn(async move {
        let url = request.url.clone();
        match network.send(request).await {
            Some(response) => debug!(url = %url, status = response.status, "Fire-and-forget request done"),
            None => debug!(url = %url, "Fire-and-forget request got no response"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NetworkService for Recorder {
        async fn send(&self, request: NetworkRequest) -> Option<NetworkResponse> {
            self.urls.lock().push(request.url);
            None
        }
    }

    #[test]
    fn test_request_timeout() {
        let request = NetworkRequest::get("https://s/event?", 5);
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fire_and_forget_sends_once() {
        let recorder = Arc::new(Recorder {
            urls: Mutex::new(Vec::new()),
        });
        fire_and_forget(recorder.clone(), NetworkRequest::get("https://d/1", 2));

        for _ in 0..50 {
            if !recorder.urls.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.urls.lock().clone(), vec!["https://d/1".to_string()]);
    }

    #[tokio::test]
    async fn test_reqwest_unreachable_host_yields_none() {
        let service = ReqwestNetworkService::new().unwrap();
        let response = service
            .send(NetworkRequest {
                url: "http://127.0.0.1:1/event?".to_string(),
                timeout: Duration::from_millis(500),
            })
            .await;
        assert!(response.is_none());
    }
}
