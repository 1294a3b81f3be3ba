//! # Gateway Dispatcher
//!
//! Pushes a batch of pending messages through the sender's gateways.
//!
//! ## Per-message flow
//! ```text
//! ┌──────────────┐
//! │ pending SMS  │
//! └──────┬───────┘
//!        │  for gateway in selected order
//!        ▼
//! ┌──────────────┐  reply parsed as Sent   ┌─────────────────────────────┐
//! │ GET rendered │ ──────────────────────► │ mark_sent(sms, gateway)     │ done
//! │ URL template │                         └─────────────────────────────┘
//! └──────┬───────┘
//!        │ transport error / vendor rejection
//!        ▼
//! ┌──────────────────────────────┐
//! │ record_failure: FAILED copy  │  retry after base × (attempt+1) seconds,
//! │ + original marked failed     │  at most max_retries times, then the
//! └──────────────────────────────┘  next gateway
//! ```
//!
//! An original that no gateway delivered keeps `sms_api_id` empty, which is
//! what the reconciler counts when refunding.

use std::sync::Arc;

use bazaar_core::sms::gateway::{render_url, SmsApi};
use bazaar_core::sms::vendor::{parse_response, Delivery, Vendor};
use bazaar_core::sms::SingleSms;
use bazaar_db::{Database, DbError};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::client::GatewayClient;
use crate::config::DispatchSettings;
use crate::error::{SmsError, SmsResult};

/// Tries at recording a delivery before the message counts as undelivered.
const MARK_SENT_ATTEMPTS: u32 = 3;

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Sent { sms_id: String, sms_api_id: String },
    Failed { sms_id: String, reason: String },
}

impl MessageOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, MessageOutcome::Sent { .. })
    }

    pub fn sms_id(&self) -> &str {
        match self {
            MessageOutcome::Sent { sms_id, .. } | MessageOutcome::Failed { sms_id, .. } => sms_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub outcomes: Vec<MessageOutcome>,
}

impl DispatchReport {
    fn from_outcomes(outcomes: Vec<MessageOutcome>) -> Self {
        let sent = outcomes.iter().filter(|o| o.is_sent()).count();
        DispatchReport {
            sent,
            failed: outcomes.len() - sent,
            outcomes,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    db: Database,
    client: Arc<dyn GatewayClient>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(db: Database, client: Arc<dyn GatewayClient>, settings: DispatchSettings) -> Self {
        Dispatcher { db, client, settings }
    }

    /// Sends every message of a batch from `sender_id`, at most
    /// `concurrency` at a time.
    pub async fn dispatch(&self, sender_id: &str, messages: Vec<SingleSms>) -> SmsResult<DispatchReport> {
        if messages.is_empty() {
            return Ok(DispatchReport::default());
        }

        let gateways = self.db.sms().gateways_for(sender_id).await?;
        if gateways.is_empty() {
            warn!(sender = %sender_id, count = messages.len(), "No gateway for sender");
        }

        let outcomes: Vec<MessageOutcome> = stream::iter(messages)
            .map(|sms| self.deliver(&gateways, sms))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let report = DispatchReport::from_outcomes(outcomes);
        info!(sender = %sender_id, sent = report.sent, failed = report.failed, "Batch dispatched");
        Ok(report)
    }

    /// Walks the gateways until one accepts the message.
    async fn deliver(&self, gateways: &[SmsApi], sms: SingleSms) -> MessageOutcome {
        let mut last_reason = SmsError::NoGateway.to_string();

        for api in gateways {
            for attempt in 0..=self.settings.max_retries {
                if attempt > 0 {
                    tokio::time::sleep(self.settings.retry_delay(attempt - 1)).await;
                }

                match self.attempt(api, &sms).await {
                    Ok(()) => {
                        if let Err(e) = self.record_sent(&sms, api).await {
                            // still pending in the store, so reconciliation refunds it
                            error!(?e, sms_id = %sms.id, gateway = %api.name, "Delivered SMS could not be recorded");
                            return MessageOutcome::Failed {
                                sms_id: sms.id,
                                reason: format!("Delivery not recorded: {}", e),
                            };
                        }
                        debug!(sms_id = %sms.id, gateway = %api.name, attempt, "SMS sent");
                        return MessageOutcome::Sent {
                            sms_id: sms.id,
                            sms_api_id: api.id.clone(),
                        };
                    }
                    Err(err) => {
                        let reason = failure_reason(&err);
                        warn!(sms_id = %sms.id, gateway = %api.name, attempt, reason = %reason, "Send attempt failed");

                        if let Err(e) = self.db.sms().record_failure(&sms, &api.id, &reason).await {
                            error!(?e, sms_id = %sms.id, "Failed to record send failure");
                        }
                        last_reason = reason;

                        if !err.is_retryable() {
                            break;
                        }
                    }
                }
            }
        }

        if gateways.is_empty() {
            if let Err(e) = self.db.sms().mark_failed(&sms.id, &last_reason).await {
                error!(?e, sms_id = %sms.id, "Failed to mark SMS failed");
            }
        }

        MessageOutcome::Failed {
            sms_id: sms.id,
            reason: last_reason,
        }
    }

    async fn record_sent(&self, sms: &SingleSms, api: &SmsApi) -> SmsResult<()> {
        let mut tries: u32 = 0;
        loop {
            match self.db.sms().mark_sent(&sms.id, &api.id).await {
                Ok(()) => return Ok(()),
                Err(e) if matches!(e, DbError::NotFound { .. }) || tries + 1 >= MARK_SENT_ATTEMPTS => return Err(e.into()),
                Err(e) => {
                    warn!(?e, sms_id = %sms.id, "Retrying sent mark");
                    tokio::time::sleep(self.settings.retry_delay(tries)).await;
                    tries += 1;
                }
            }
        }
    }

    async fn attempt(&self, api: &SmsApi, sms: &SingleSms) -> SmsResult<()> {
        let url = render_url(&api.url, &sms.receiver, &sms.message);
        let reply = self.client.get(&url).await?;

        match parse_response(&Vendor::from_name(api.vendor_name.as_deref()), reply.status, &reply.body) {
            Delivery::Sent => Ok(()),
            Delivery::Failed(reason) => Err(SmsError::Rejected {
                gateway: api.name.clone(),
                reason,
            }),
        }
    }
}

/// Vendor rejections keep the vendor's wording.
fn failure_reason(err: &SmsError) -> String {
    match err {
        SmsError::Rejected { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scripted::ScriptedClient;
    use crate::client::GatewayReply;
    use crate::testing::{accounts, fast_dispatch};
    use bazaar_core::sms::{GatewayType, OutgoingSms, SmsStatus};

    fn outgoing(receivers: &[&str]) -> Vec<OutgoingSms> {
        receivers
            .iter()
            .map(|r| OutgoingSms {
                receiver: (*r).to_string(),
                message: "Your order is ready".into(),
                msg_part_count: 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_first_gateway_delivers() {
        let acc = accounts(&["gw-a", "gw-b"], 10).await;
        let client = Arc::new(ScriptedClient::new().reply("gw-a", 200, "SMS SUBMITTED: ID - 77"));
        let dispatcher = Dispatcher::new(acc.db.clone(), client.clone(), fast_dispatch(2));

        let (batch, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Https, &outgoing(&["01711000000"]))
            .await
            .unwrap();
        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(client.calls(), vec!["http://gw-a/send?to=01711000000&msg=Your+order+is+ready".to_string()]);

        let stored = acc.db.sms().batch_messages(&batch).await.unwrap();
        assert_eq!(stored[0].status, SmsStatus::Sent);
        assert!(stored[0].is_sent);
        assert_eq!(stored[0].sms_api_id.as_deref(), Some(acc.gateways[0].as_str()));
        assert!(stored[0].sent_at.is_some());
        assert_eq!(acc.db.sms().failed_parts(&batch).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retries_then_falls_through_to_next_gateway() {
        let acc = accounts(&["gw-a", "gw-b"], 10).await;
        let client = Arc::new(
            ScriptedClient::new()
                .reply("gw-a", 200, "1012")
                .reply("gw-b", 200, "SMS SUBMITTED"),
        );
        let dispatcher = Dispatcher::new(acc.db.clone(), client.clone(), fast_dispatch(2));

        let (batch, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Https, &outgoing(&["01711000000"]))
            .await
            .unwrap();
        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();

        assert_eq!(report.sent, 1);
        // one attempt plus two retries on the first gateway
        assert_eq!(client.calls_matching("gw-a"), 3);
        assert_eq!(client.calls_matching("gw-b"), 1);

        let copies = acc.db.sms().failure_copies(&acc.client, "01711000000").await.unwrap();
        assert_eq!(copies.len(), 3);
        assert!(copies.iter().all(|c| c.failure_reason.as_deref() == Some("Invalid Number")));
        assert!(copies.iter().all(|c| c.sms_api_id.as_deref() == Some(acc.gateways[0].as_str())));

        let stored = acc.db.sms().batch_messages(&batch).await.unwrap();
        assert_eq!(stored[0].status, SmsStatus::Sent);
        assert_eq!(stored[0].sms_api_id.as_deref(), Some(acc.gateways[1].as_str()));
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_on_same_gateway() {
        let acc = accounts(&["gw-a"], 10).await;
        let client = Arc::new(ScriptedClient::new().script(
            "gw-a",
            vec![Err("connection reset".into()), Ok(GatewayReply::new(200, "SMS SUBMITTED"))],
        ));
        let dispatcher = Dispatcher::new(acc.db.clone(), client.clone(), fast_dispatch(3));

        let (_, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Https, &outgoing(&["01711000000"]))
            .await
            .unwrap();
        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(client.calls_matching("gw-a"), 2);
        assert_eq!(acc.db.sms().failure_copies(&acc.client, "01711000000").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_undelivered_message_counts_as_failed_parts() {
        let acc = accounts(&["gw-a"], 10).await;
        let client = Arc::new(ScriptedClient::new().unreachable("gw-a"));
        let dispatcher = Dispatcher::new(acc.db.clone(), client, fast_dispatch(1));

        let (batch, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Panel, &outgoing(&["01711000000", "01811000000"]))
            .await
            .unwrap();
        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();

        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(acc.db.sms().failed_parts(&batch).await.unwrap(), 2);

        let stored = acc.db.sms().batch_messages(&batch).await.unwrap();
        assert!(stored.iter().all(|s| s.status == SmsStatus::Failed && s.sms_api_id.is_none()));
    }

    #[tokio::test]
    async fn test_no_gateway_marks_failed() {
        let acc = accounts(&[], 10).await;
        let dispatcher = Dispatcher::new(acc.db.clone(), Arc::new(ScriptedClient::new()), fast_dispatch(1));

        let (batch, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Https, &outgoing(&["01711000000"]))
            .await
            .unwrap();
        let pending_id = pending[0].id.clone();
        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();

        assert_eq!(
            report.outcomes[0],
            MessageOutcome::Failed {
                sms_id: pending_id,
                reason: "No SMS gateway is available".into()
            }
        );
        let stored = acc.db.sms().batch_messages(&batch).await.unwrap();
        assert_eq!(stored[0].status, SmsStatus::Failed);
        assert_eq!(stored[0].failure_reason.as_deref(), Some("No SMS gateway is available"));
    }

    #[tokio::test]
    async fn test_concurrent_batch_delivers_every_message() {
        let acc = accounts(&["gw-a"], 100).await;
        let client = Arc::new(ScriptedClient::new().reply("gw-a", 200, "SMS SUBMITTED"));
        let dispatcher = Dispatcher::new(acc.db.clone(), client.clone(), fast_dispatch(0));

        let receivers: Vec<String> = (0..20).map(|i| format!("017110000{:02}", i)).collect();
        let refs: Vec<&str> = receivers.iter().map(String::as_str).collect();
        let (batch, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Panel, &outgoing(&refs))
            .await
            .unwrap();
        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();

        assert_eq!(report.sent, 20);
        assert_eq!(client.calls().len(), 20);
        assert_eq!(acc.db.sms().failed_parts(&batch).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrecorded_delivery_is_not_reported_sent() {
        let acc = accounts(&["gw-a"], 10).await;
        let client = Arc::new(ScriptedClient::new().reply("gw-a", 200, "SMS SUBMITTED"));
        let dispatcher = Dispatcher::new(acc.db.clone(), client.clone(), fast_dispatch(0));

        let (_batch, pending) = acc
            .db
            .sms()
            .create_pending_batch(&acc.client, None, GatewayType::Https, &outgoing(&["01711000000"]))
            .await
            .unwrap();
        sqlx::query("DELETE FROM single_sms WHERE id = ?1")
            .bind(&pending[0].id)
            .execute(acc.db.pool())
            .await
            .unwrap();

        let report = dispatcher.dispatch(&acc.client, pending).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(client.calls().len(), 1);
        match &report.outcomes[0] {
            MessageOutcome::Failed { reason, .. } => assert!(reason.starts_with("Delivery not recorded")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
