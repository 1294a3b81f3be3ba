//! # SMS Service
//!
//! Entry point for every send, whether it comes from the developer API or
//! the panel.
//!
//! ## Send pipeline
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────────┐   ┌───────────────┐
//! │ quote      │──►│ deduct from  │──►│ pending record │──►│ dispatch task │
//! │ (parts ×   │   │ client and   │   │ per receiver   │   │ (background)  │
//! │ receivers) │   │ reseller     │   │ under a batch  │   └───────┬───────┘
//! └────────────┘   └──────┬───────┘   └────────────────┘           │
//!                         │ LowBalance                             ▼
//!                         ▼                                ┌───────────────┐
//!                  refused, nothing                        │ reconciler    │
//!                  stored                                  │ refunds what  │
//!                                                          │ failed        │
//!                                                          └───────────────┘
//! ```
//!
//! The caller gets its receipt as soon as the batch is stored; delivery
//! happens afterwards. Reconciliation is scheduled once the batch's
//! dispatch has finished, so slow retries never race the refund.

use std::sync::Arc;

use bazaar_core::sms::balance::Charge;
use bazaar_core::sms::contact::Audience;
use bazaar_core::sms::message::{prepare_rows, BatchMode, BatchRow, MessageQuote};
use bazaar_core::sms::{GatewayType, OutgoingSms, SingleSms};
use bazaar_core::ValidationError;
use bazaar_db::{Database, DbError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::client::GatewayClient;
use crate::config::DispatchSettings;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::SmsResult;
use crate::reconciler::ReconcilerHandle;

/// Counters shared by the service and the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub sent: u64,
    pub failed: u64,
    pub refunded_parts: i64,
}

/// One message to one or more receivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub user_id: String,
    /// Comma or whitespace separated phone numbers.
    pub receivers: String,
    pub message: String,
    pub gateway_type: GatewayType,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub batch_id: String,
    pub receivers: usize,
    pub parts: i64,
    pub charge: Charge,
}

#[derive(Clone)]
pub struct SmsService {
    db: Database,
    dispatcher: Dispatcher,
    reconciler: ReconcilerHandle,
    stats: Arc<RwLock<ServiceStats>>,
}

impl SmsService {
    pub fn new(
        db: Database,
        client: Arc<dyn GatewayClient>,
        settings: DispatchSettings,
        reconciler: ReconcilerHandle,
        stats: Arc<RwLock<ServiceStats>>,
    ) -> Self {
        SmsService {
            dispatcher: Dispatcher::new(db.clone(), client, settings),
            db,
            reconciler,
            stats,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn stats(&self) -> ServiceStats {
        self.stats.read().await.clone()
    }

    /// Charges and stores a send, then delivers it in the background.
    ///
    /// ## Errors
    /// - `Rule(LowBalance { parts })` when client or reseller cannot pay
    /// - `Rule(Validation(Required))` for an empty message or receiver list
    pub async fn send(&self, request: &SendRequest) -> SmsResult<SendReceipt> {
        let (receipt, pending) = self.prepare(request).await?;
        self.spawn_delivery(request.user_id.clone(), receipt.batch_id.clone(), pending);
        Ok(receipt)
    }

    /// Like [`send`](Self::send), but returns once every message has been
    /// tried.
    pub async fn send_and_wait(&self, request: &SendRequest) -> SmsResult<(SendReceipt, DispatchReport)> {
        let (receipt, pending) = self.prepare(request).await?;
        let report = self.deliver(&request.user_id, &receipt.batch_id, pending).await;
        Ok((receipt, report))
    }

    /// Sends the rows of a panel upload as one batch.
    ///
    /// In [`BatchMode::Batch`] rows missing a receiver or message are
    /// skipped; in [`BatchMode::Broadcast`] a blank message repeats the
    /// one above it.
    pub async fn send_batch(
        &self,
        user_id: &str,
        rows: &[BatchRow],
        mode: BatchMode,
        ip: Option<&str>,
    ) -> SmsResult<SendReceipt> {
        let outgoing = prepare_rows(rows, mode);
        if outgoing.is_empty() {
            return Err(ValidationError::Required {
                field: "rows".to_string(),
            }
            .into());
        }

        let (receipt, pending) = self.charge_and_store(user_id, ip, GatewayType::Panel, outgoing).await?;
        self.spawn_delivery(user_id.to_string(), receipt.batch_id.clone(), pending);
        Ok(receipt)
    }

    /// Sends one message to a group or a single contact from the sender's
    /// address book.
    ///
    /// ## Errors
    /// - `Database(NotFound)` when the group or contact is not the sender's
    /// - `Rule(Validation(Required))` when the group has no contacts
    pub async fn send_to_group(
        &self,
        user_id: &str,
        audience: &Audience,
        message: &str,
        ip: Option<&str>,
    ) -> SmsResult<SendReceipt> {
        let (receipt, pending) = self.prepare_group(user_id, audience, message, ip).await?;
        self.spawn_delivery(user_id.to_string(), receipt.batch_id.clone(), pending);
        Ok(receipt)
    }

    async fn prepare_group(
        &self,
        user_id: &str,
        audience: &Audience,
        message: &str,
        ip: Option<&str>,
    ) -> SmsResult<(SendReceipt, Vec<SingleSms>)> {
        let contacts = self.db.contacts();
        let receivers: Vec<String> = match audience {
            Audience::Group(group_id) => contacts
                .group_contacts(user_id, group_id)
                .await?
                .into_iter()
                .map(|c| c.contact_no)
                .collect(),
            Audience::Contact(contact_id) => {
                let contact = contacts
                    .get_contact(user_id, contact_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Contact", contact_id))?;
                vec![contact.contact_no]
            }
        };

        let request = SendRequest {
            user_id: user_id.to_string(),
            receivers: receivers.join(","),
            message: message.to_string(),
            gateway_type: GatewayType::Panel,
            ip: ip.map(str::to_string),
        };
        self.prepare(&request).await
    }

    async fn prepare(&self, request: &SendRequest) -> SmsResult<(SendReceipt, Vec<SingleSms>)> {
        let quote = MessageQuote::new(&request.message, &request.receivers);
        if quote.message.is_empty() {
            return Err(ValidationError::Required {
                field: "message".to_string(),
            }
            .into());
        }
        if quote.receivers.is_empty() {
            return Err(ValidationError::Required {
                field: "phone".to_string(),
            }
            .into());
        }

        let outgoing: Vec<OutgoingSms> = quote
            .receivers
            .iter()
            .map(|receiver| OutgoingSms {
                receiver: receiver.clone(),
                message: quote.message.clone(),
                msg_part_count: quote.parts_per_receiver,
            })
            .collect();

        self.charge_and_store(&request.user_id, request.ip.as_deref(), request.gateway_type, outgoing)
            .await
    }

    async fn charge_and_store(
        &self,
        user_id: &str,
        ip: Option<&str>,
        gateway_type: GatewayType,
        outgoing: Vec<OutgoingSms>,
    ) -> SmsResult<(SendReceipt, Vec<SingleSms>)> {
        let parts: i64 = outgoing.iter().map(|o| o.msg_part_count).sum();
        let sms = self.db.sms();

        let charge = sms.deduct_balance(user_id, parts).await?;

        let (batch_id, pending) = match sms.create_pending_batch(user_id, ip, gateway_type, &outgoing).await {
            Ok(created) => created,
            Err(e) => {
                // nothing will be dispatched, so nothing may stay charged
                if let Err(refund_err) = sms.refund_balance(user_id, parts).await {
                    error!(?refund_err, user = %user_id, parts, "Failed to refund unstored batch");
                }
                return Err(e.into());
            }
        };

        info!(user = %user_id, batch_id = %batch_id, receivers = pending.len(), parts, "Send accepted");
        let receipt = SendReceipt {
            batch_id,
            receivers: pending.len(),
            parts,
            charge,
        };
        Ok((receipt, pending))
    }

    fn spawn_delivery(&self, user_id: String, batch_id: String, pending: Vec<SingleSms>) {
        let service = self.clone();
        tokio::spawn(async move {
            service.deliver(&user_id, &batch_id, pending).await;
        });
    }

    async fn deliver(&self, user_id: &str, batch_id: &str, pending: Vec<SingleSms>) -> DispatchReport {
        let report = match self.dispatcher.dispatch(user_id, pending).await {
            Ok(report) => report,
            Err(e) => {
                error!(?e, batch_id = %batch_id, "Dispatch failed");
                DispatchReport::default()
            }
        };

        {
            let mut stats = self.stats.write().await;
            stats.sent += report.sent as u64;
            stats.failed += report.failed as u64;
        }

        if let Err(e) = self.reconciler.schedule(user_id, vec![batch_id.to_string()]).await {
            error!(?e, batch_id = %batch_id, "Failed to schedule reconciliation");
        } else {
            debug!(batch_id = %batch_id, "Reconciliation scheduled");
        }
        report
    }
}
