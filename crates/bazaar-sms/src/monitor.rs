//! # Vendor Balance Monitor
//!
//! Periodically asks the upstream vendor for the account balance and texts
//! the operators when it falls to the alert threshold.
//!
//! ```text
//!   every check_interval:
//!     POST balance_url {"acode", "api_key"} ──► parse info.balance
//!         │
//!         ├── balance > threshold ──► nothing
//!         └── balance ≤ threshold ──► GET alert_url per recipient
//! ```

use std::sync::Arc;

use bazaar_core::sms::gateway::render_url;
use bazaar_core::sms::vendor::parse_balance_response;
use bazaar_core::Money;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::GatewayClient;
use crate::config::{AlertSettings, ALERT_MESSAGE};
use crate::error::{SmsError, SmsResult};

/// Result of one balance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCheck {
    pub balance: Money,
    pub is_low: bool,
    /// Recipients the alert reached.
    pub alerted: usize,
}

#[derive(Clone)]
pub struct MonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl MonitorHandle {
    pub async fn shutdown(&self) -> SmsResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SmsError::ChannelError("Monitor shutdown channel closed".into()))
    }
}

pub struct BalanceMonitor {
    client: Arc<dyn GatewayClient>,
    settings: AlertSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BalanceMonitor {
    pub fn new(client: Arc<dyn GatewayClient>, settings: AlertSettings) -> (Self, MonitorHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let monitor = BalanceMonitor {
            client,
            settings,
            shutdown_rx,
        };
        (monitor, MonitorHandle { shutdown_tx })
    }

    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.check_interval_secs,
            threshold = %self.settings.threshold,
            "Balance monitor starting"
        );

        let mut interval = tokio::time::interval(self.settings.check_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!(?e, "Balance check failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Balance monitor shutting down");
                    break;
                }
            }
        }
    }

    pub async fn check_once(&self) -> SmsResult<BalanceCheck> {
        let body = json!({
            "acode": self.settings.acode,
            "api_key": self.settings.api_key,
        });
        let reply = self.client.post_json(&self.settings.balance_url, &body).await?;
        let balance = parse_balance_response(&reply.body)?;
        let is_low = balance <= self.settings.threshold;

        debug!(balance = %balance, is_low, "Vendor balance checked");
        if !is_low {
            return Ok(BalanceCheck {
                balance,
                is_low,
                alerted: 0,
            });
        }

        warn!(balance = %balance, threshold = %self.settings.threshold, "Vendor balance is low");
        let mut alerted = 0;
        for recipient in &self.settings.recipients {
            let url = render_url(&self.settings.alert_url, recipient, ALERT_MESSAGE);
            match self.client.get(&url).await {
                Ok(_) => alerted += 1,
                Err(e) => error!(?e, recipient = %recipient, "Failed to send balance alert"),
            }
        }

        Ok(BalanceCheck {
            balance,
            is_low,
            alerted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scripted::ScriptedClient;

    fn settings() -> AlertSettings {
        AlertSettings {
            enabled: true,
            balance_url: "https://vendor.test/balance".into(),
            acode: "30001".into(),
            api_key: "key".into(),
            recipients: vec!["01711000000".into(), "01811000000".into()],
            alert_url: "https://alerts.test/send?to={phone_number}&msg={message}".into(),
            ..AlertSettings::default()
        }
    }

    fn balance_reply(balance: &str) -> String {
        format!(
            r#"{{"response": {{"code": 200, "message": "Success"}}, "info": {{"balance": "{}"}}}}"#,
            balance
        )
    }

    #[tokio::test]
    async fn test_low_balance_alerts_every_recipient() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply("vendor.test", 200, &balance_reply("5321.40"))
                .reply("alerts.test", 200, "ok"),
        );
        let (monitor, _handle) = BalanceMonitor::new(client.clone(), settings());

        let check = monitor.check_once().await.unwrap();
        assert_eq!(check.balance, Money::from_minor(532_140));
        assert!(check.is_low);
        assert_eq!(check.alerted, 2);
        assert_eq!(client.calls_matching("alerts.test"), 2);
        assert!(client
            .calls()
            .iter()
            .any(|url| url.contains("to=01811000000&msg=Your+balance+is+low+in+RT+Communication")));
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply("vendor.test", 200, &balance_reply("6000.00"))
                .reply("alerts.test", 200, "ok"),
        );
        let (monitor, _handle) = BalanceMonitor::new(client, settings());
        assert!(monitor.check_once().await.unwrap().is_low);
    }

    #[tokio::test]
    async fn test_healthy_balance_sends_nothing() {
        let client = Arc::new(ScriptedClient::new().reply("vendor.test", 200, &balance_reply("12000")));
        let (monitor, _handle) = BalanceMonitor::new(client.clone(), settings());

        let check = monitor.check_once().await.unwrap();
        assert!(!check.is_low);
        assert_eq!(check.alerted, 0);
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_vendor_error_is_reported() {
        let client = Arc::new(ScriptedClient::new().reply(
            "vendor.test",
            200,
            r#"{"response": {"code": 401, "message": "Invalid api key"}}"#,
        ));
        let (monitor, _handle) = BalanceMonitor::new(client, settings());

        let err = monitor.check_once().await.unwrap_err();
        assert!(err.to_string().contains("Invalid api key"));
    }
}
