#![allow(dead_code)]

use async_trait::async_trait;
use audience_orchestrator::{AudienceClient, ClientOptions};
use audience_outbox::{NetworkRequest, NetworkResponse, NetworkService};
use audience_protocol_types::{ConfigurationSnapshot, ConsentStatus, Traits};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Network double. Requests whose url contains a rule's pattern get that
/// rule's scripted responses in order, the last one repeating. Anything
/// else gets `200` with an empty body.
#[derive(Default)]
pub struct MockNetwork {
    rules: Mutex<Vec<(String, VecDeque<Option<(u16, String)>>)>>,
    requests: Mutex<Vec<String>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, pattern: &str, status: u16, body: &str) {
        self.script(pattern, &[Some((status, body))]);
    }

    pub fn script(&self, pattern: &str, responses: &[Option<(u16, &str)>]) {
        self.rules.lock().push((
            pattern.to_string(),
            responses
                .iter()
                .map(|r| r.map(|(status, body)| (status, body.to_string())))
                .collect(),
        ));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn requests_containing(&self, pattern: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.contains(pattern))
            .collect()
    }
}

#[async_trait]
impl NetworkService for MockNetwork {
    async fn send(&self, request: NetworkRequest) -> Option<NetworkResponse> {
        self.requests.lock().push(request.url.clone());

        let mut rules = self.rules.lock();
        let Some((_, responses)) = rules
            .iter_mut()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
        else {
            return Some(NetworkResponse {
                status: 200,
                body: String::new(),
            });
        };

        let next = if responses.len() > 1 {
            responses.pop_front().flatten()
        } else {
            responses.front().cloned().flatten()
        };
        next.map(|(status, body)| NetworkResponse { status, body })
    }
}

pub fn start(network: Arc<MockNetwork>) -> AudienceClient {
    AudienceClient::start(options(network))
}

pub fn options(network: Arc<MockNetwork>) -> ClientOptions {
    ClientOptions::new(network)
        .with_retry_interval(Duration::from_millis(20))
        .with_callback_timeout(Duration::from_secs(2))
}

pub fn configuration(server: Option<&str>, consent: ConsentStatus) -> ConfigurationSnapshot {
    ConfigurationSnapshot {
        server: server.map(str::to_string),
        consent,
        ..Default::default()
    }
}

pub fn traits(pairs: &[(&str, &str)]) -> Traits {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
