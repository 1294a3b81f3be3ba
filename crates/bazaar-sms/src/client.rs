//! # Gateway HTTP Client
//!
//! Vendor gateways are plain HTTP endpoints: sends are a GET on the
//! rendered URL template, balance checks a JSON POST. The dispatcher and
//! the balance monitor only see the [`GatewayClient`] trait, so tests
//! script replies instead of opening sockets.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SmsError, SmsResult};

const USER_AGENT: &str = concat!("bazaar-sms/", env!("CARGO_PKG_VERSION"));

/// Raw gateway answer. Interpreting it is the vendor parser's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReply {
    pub status: u16,
    pub body: String,
}

impl GatewayReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        GatewayReply {
            status,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn get(&self, url: &str) -> SmsResult<GatewayReply>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> SmsResult<GatewayReply>;
}

// =============================================================================
// reqwest implementation
// =============================================================================

pub struct HttpGatewayClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpGatewayClient {
    pub fn new(timeout: Duration) -> SmsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SmsError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpGatewayClient { client, timeout })
    }

    async fn read(&self, request: reqwest::RequestBuilder) -> SmsResult<GatewayReply> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        debug!(status, bytes = body.len(), "Gateway replied");
        Ok(GatewayReply { status, body })
    }

    fn transport_error(&self, err: reqwest::Error) -> SmsError {
        if err.is_timeout() {
            SmsError::Timeout(self.timeout.as_secs())
        } else {
            SmsError::from(err)
        }
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn get(&self, url: &str) -> SmsResult<GatewayReply> {
        self.read(self.client.get(url)).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> SmsResult<GatewayReply> {
        self.read(self.client.post(url).json(body)).await
    }
}

// =============================================================================
// Scripted client (tests)
// =============================================================================

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Answers requests from per-URL scripts.
    ///
    /// A script matches when its pattern occurs in the URL; the first
    /// matching script answers. Its replies are consumed in order and the
    /// last one repeats. Unmatched URLs fail as unreachable.
    #[derive(Default)]
    pub struct ScriptedClient {
        scripts: Mutex<Vec<(String, VecDeque<Result<GatewayReply, String>>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every request matching `pattern` gets this reply.
        pub fn reply(self, pattern: &str, status: u16, body: &str) -> Self {
            self.script(pattern, vec![Ok(GatewayReply::new(status, body))])
        }

        /// Requests matching `pattern` fail at the transport level.
        pub fn unreachable(self, pattern: &str) -> Self {
            self.script(pattern, vec![Err("connection refused".to_string())])
        }

        pub fn script(self, pattern: &str, replies: Vec<Result<GatewayReply, String>>) -> Self {
            if let Ok(mut scripts) = self.scripts.lock() {
                scripts.push((pattern.to_string(), replies.into()));
            }
            self
        }

        /// URLs requested so far, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn calls_matching(&self, pattern: &str) -> usize {
            self.calls().iter().filter(|url| url.contains(pattern)).count()
        }

        fn answer(&self, url: &str) -> SmsResult<GatewayReply> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(url.to_string());
            }

            let mut scripts = self
                .scripts
                .lock()
                .map_err(|_| SmsError::Internal("script lock poisoned".into()))?;
            let replies = scripts
                .iter_mut()
                .find(|(pattern, _)| url.contains(pattern.as_str()))
                .map(|(_, replies)| replies)
                .ok_or_else(|| SmsError::RequestFailed(format!("no route to {}", url)))?;

            let next = if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            };
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(reason)) => Err(SmsError::RequestFailed(reason)),
                None => Err(SmsError::RequestFailed(format!("no reply scripted for {}", url))),
            }
        }
    }

    #[async_trait]
    impl GatewayClient for ScriptedClient {
        async fn get(&self, url: &str) -> SmsResult<GatewayReply> {
            self.answer(url)
        }

        async fn post_json(&self, url: &str, _body: &serde_json::Value) -> SmsResult<GatewayReply> {
            self.answer(url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedClient;
    use super::*;

    #[test]
    fn test_http_client_builds() {
        assert!(HttpGatewayClient::new(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order_then_repeat() {
        let client = ScriptedClient::new().script(
            "gw-a",
            vec![
                Err("reset".to_string()),
                Ok(GatewayReply::new(200, "SMS SUBMITTED")),
            ],
        );

        assert!(matches!(
            client.get("http://gw-a/send").await,
            Err(SmsError::RequestFailed(_))
        ));
        assert_eq!(client.get("http://gw-a/send").await.unwrap().body, "SMS SUBMITTED");
        assert_eq!(client.get("http://gw-a/send").await.unwrap().body, "SMS SUBMITTED");
        assert_eq!(client.calls_matching("gw-a"), 3);
    }

    #[tokio::test]
    async fn test_scripted_unmatched_url_is_unreachable() {
        let client = ScriptedClient::new().reply("gw-a", 200, "ok");
        let err = client.get("http://gw-b/send").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.calls(), vec!["http://gw-b/send".to_string()]);
    }
}
