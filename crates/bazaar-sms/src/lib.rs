//! # bazaar-sms: SMS Engine for Bazaar
//!
//! Charges, sends and settles SMS for resellers' clients, and serves the
//! developer HTTP API.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SMS Engine                                     │
//! │                                                                         │
//! │  ┌──────────────────┐      ┌──────────────────────────────────────┐    │
//! │  │ ApiServer (axum) │─────►│ SmsService                           │    │
//! │  │ /api/sms/send    │      │ quote → deduct → pending → dispatch  │    │
//! │  └──────────────────┘      └───────────┬──────────────────────────┘    │
//! │                                        │                                │
//! │            ┌───────────────────────────┼──────────────────────┐        │
//! │            ▼                           ▼                      ▼        │
//! │  ┌──────────────────┐      ┌──────────────────┐   ┌──────────────────┐ │
//! │  │ Dispatcher       │      │ Reconciler       │   │ BalanceMonitor   │ │
//! │  │ gateways in      │      │ refunds parts no │   │ vendor balance,  │ │
//! │  │ order, retries   │      │ gateway delivered│   │ low-balance SMS  │ │
//! │  └────────┬─────────┘      └──────────────────┘   └────────┬─────────┘ │
//! │           │                                                │           │
//! │           └──────────────► GatewayClient (reqwest) ◄───────┘           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`client`] - `GatewayClient` trait and its reqwest implementation
//! - [`config`] - TOML configuration with environment overrides
//! - [`dispatcher`] - Per-message gateway walk with retries
//! - [`error`] - Engine error types
//! - [`monitor`] - Vendor balance alerts
//! - [`reconciler`] - Delayed refunds for undelivered parts
//! - [`server`] - Developer HTTP API
//! - [`service`] - `SmsService` orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bazaar_sms::{HttpGatewayClient, Reconciler, SmsConfig, SmsService};
//!
//! let config = SmsConfig::load_or_default(None);
//! let (reconciler, handle) = Reconciler::new(db.clone(), config.dispatch.reconcile_delay(), stats.clone());
//! tokio::spawn(reconciler.run());
//!
//! let client = Arc::new(HttpGatewayClient::new(config.dispatch.request_timeout())?);
//! let service = SmsService::new(db, client, config.dispatch.clone(), handle, stats);
//! let receipt = service.send(&request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod reconciler;
pub mod server;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{GatewayClient, GatewayReply, HttpGatewayClient};
pub use config::{AlertSettings, DatabaseSettings, DispatchSettings, ServerSettings, SmsConfig};
pub use dispatcher::{DispatchReport, Dispatcher, MessageOutcome};
pub use error::{SmsError, SmsResult};
pub use monitor::{BalanceCheck, BalanceMonitor, MonitorHandle};
pub use reconciler::{ReconcileJob, Reconciler, ReconcilerHandle};
pub use server::{ApiResponse, ApiServer, ServerHandle};
pub use service::{SendReceipt, SendRequest, ServiceStats, SmsService};
pub use bazaar_core::sms::message::{BatchMode, BatchRow};
