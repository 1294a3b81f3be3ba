//! # Developer HTTP API
//!
//! Lets a client's own software send SMS with its developer API key.
//!
//! ## Endpoints
//! - `GET|POST /api/sms/send`: `api_key`, `type`, `phone`, `message` from
//!   the query string (GET) or a form body (POST)
//! - `GET /health`
//!
//! ## Reply codes
//! ```text
//! ┌────────────┬────────┬──────────────────────────────────────────────────┐
//! │ error_code │ HTTP   │ message                                          │
//! ├────────────┼────────┼──────────────────────────────────────────────────┤
//! │ 1001       │ 400    │ Wrong API Key                                    │
//! │ 400        │ 400    │ Missing parameters.                              │
//! │ 1003       │ 400    │ Type must be text or unicode                     │
//! │ 1006       │ 400    │ You do not have enough balance to send N messages│
//! │ 1004       │ 405    │ Only GET and POST Methods Allow                  │
//! └────────────┴────────┴──────────────────────────────────────────────────┘
//! ```
//! The key is checked first, so an unknown key never learns whether its
//! other parameters were valid.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Form, Query, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bazaar_core::sms::message::MessageType;
use bazaar_core::sms::GatewayType;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::ServerSettings;
use crate::error::{SmsError, SmsResult};
use crate::service::{SendRequest, SmsService};

pub const WRONG_API_KEY: u16 = 1001;
pub const MISSING_PARAMETERS: u16 = 400;
pub const BAD_TYPE: u16 = 1003;
pub const METHOD_NOT_ALLOWED: u16 = 1004;
pub const LOW_BALANCE: u16 = 1006;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendParams {
    pub api_key: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl ApiResponse {
    fn ok(batch_id: String) -> Self {
        ApiResponse {
            success: true,
            error_code: None,
            message: "Success".to_string(),
            batch_id: Some(batch_id),
        }
    }

    fn error(code: u16, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            error_code: Some(code),
            message: message.into(),
            batch_id: None,
        }
    }
}

/// A reply with its HTTP status.
pub type ApiReply = (StatusCode, ApiResponse);

// =============================================================================
// Server
// =============================================================================

pub struct ApiState {
    service: SmsService,
}

pub struct ApiServer {
    config: ServerSettings,
    state: Arc<ApiState>,
}

#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(&self) -> SmsResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SmsError::ChannelError("Server shutdown channel closed".into()))
    }
}

impl ApiServer {
    pub fn new(config: ServerSettings, service: SmsService) -> Self {
        ApiServer {
            config,
            state: Arc::new(ApiState { service }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/api/sms/send",
                get(send_query).post(send_form).fallback(method_not_allowed),
            )
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
    }

    /// Binds and serves in the background until the handle shuts it down.
    pub async fn start(self) -> SmsResult<ServerHandle> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let app = self.router();

        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SmsError::Internal(format!("Failed to bind to {}: {}", bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SmsError::Internal(format!("Failed to read bound address: {}", e)))?;

        info!(addr = %local_addr, "Developer API listening");

        tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await;
                    info!("Developer API shutting down");
                })
                .await;
            if let Err(e) = served {
                error!(?e, "Developer API server failed");
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    if state.service.db().health_check().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DATABASE UNAVAILABLE")
    }
}

async fn send_query(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Query(params): Query<SendParams>,
) -> Response {
    let ip = client_ip(&headers, &extensions);
    into_response(handle_send(&state.service, params, ip).await)
}

async fn send_form(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Form(params): Form<SendParams>,
) -> Response {
    let ip = client_ip(&headers, &extensions);
    into_response(handle_send(&state.service, params, ip).await)
}

async fn method_not_allowed() -> Response {
    into_response((
        StatusCode::METHOD_NOT_ALLOWED,
        ApiResponse::error(METHOD_NOT_ALLOWED, "Only GET and POST Methods Allow"),
    ))
}

fn into_response((status, body): ApiReply) -> Response {
    (status, Json(body)).into_response()
}

/// First `X-Forwarded-For` hop, else the peer address.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(ip) => Some(ip.to_string()),
        None => extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Validates a developer send and hands it to the service.
pub async fn handle_send(service: &SmsService, params: SendParams, ip: Option<String>) -> ApiReply {
    let bad_request = |code: u16, message: String| (StatusCode::BAD_REQUEST, ApiResponse::error(code, message));

    let user = match present(params.api_key) {
        Some(key) => match service.db().sms().developer_key_user(&key).await {
            Ok(user) => user,
            Err(e) => {
                error!(?e, "Developer key lookup failed");
                return internal_error();
            }
        },
        None => None,
    };
    let Some(user) = user else {
        debug!("Rejected unknown developer key");
        return bad_request(WRONG_API_KEY, "Wrong API Key".into());
    };

    let (Some(message_type), Some(phone), Some(message)) = (
        present(params.message_type),
        present(params.phone),
        present(params.message),
    ) else {
        return bad_request(MISSING_PARAMETERS, "Missing parameters.".into());
    };

    if MessageType::parse(&message_type).is_err() {
        return bad_request(BAD_TYPE, "Type must be text or unicode".into());
    }

    let request = SendRequest {
        user_id: user.id,
        receivers: phone,
        message,
        gateway_type: GatewayType::Https,
        ip,
    };

    match service.send(&request).await {
        Ok(receipt) => (StatusCode::OK, ApiResponse::ok(receipt.batch_id)),
        Err(e) if e.low_balance_parts().is_some() => bad_request(LOW_BALANCE, e.to_string()),
        Err(SmsError::Rule(rule)) => bad_request(MISSING_PARAMETERS, rule.to_string()),
        Err(e) => {
            error!(?e, user = %request.user_id, "Developer send failed");
            internal_error()
        }
    }
}

fn internal_error() -> ApiReply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiResponse::error(500, "Internal server error"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scripted::ScriptedClient;
    use crate::reconciler::Reconciler;
    use crate::service::ServiceStats;
    use crate::testing::{accounts, fast_dispatch, Accounts, QUOTA};
    use std::time::Duration;
    use tokio::sync::RwLock;

    const KEY: &str = "dev-key-1";

    async fn api_service(client_parts: i64) -> (Accounts, SmsService) {
        let acc = accounts(&["gw-a"], client_parts).await;
        acc.db.sms().create_developer_key(&acc.client, KEY).await.unwrap();

        let stats = Arc::new(RwLock::new(ServiceStats::default()));
        let (reconciler, handle) = Reconciler::new(acc.db.clone(), Duration::ZERO, stats.clone());
        tokio::spawn(reconciler.run());
        let client = ScriptedClient::new().reply("gw-a", 200, "SMS SUBMITTED");
        let service = SmsService::new(acc.db.clone(), Arc::new(client), fast_dispatch(0), handle, stats);
        (acc, service)
    }

    fn params(api_key: &str, message_type: &str, phone: &str, message: &str) -> SendParams {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        SendParams {
            api_key: opt(api_key),
            message_type: opt(message_type),
            phone: opt(phone),
            message: opt(message),
        }
    }

    #[tokio::test]
    async fn test_wrong_key_is_checked_first() {
        let (_acc, service) = api_service(10).await;

        let (status, body) = handle_send(&service, params("nope", "", "", ""), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, ApiResponse::error(WRONG_API_KEY, "Wrong API Key"));

        let (_, body) = handle_send(&service, params("", "text", "01711000000", "Hi"), None).await;
        assert_eq!(body.error_code, Some(WRONG_API_KEY));
    }

    #[tokio::test]
    async fn test_missing_parameters_and_bad_type() {
        let (_acc, service) = api_service(10).await;

        let (status, body) = handle_send(&service, params(KEY, "text", "", "Hi"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, ApiResponse::error(MISSING_PARAMETERS, "Missing parameters."));

        let (_, body) = handle_send(&service, params(KEY, "flash", "01711000000", "Hi"), None).await;
        assert_eq!(body, ApiResponse::error(BAD_TYPE, "Type must be text or unicode"));
    }

    #[tokio::test]
    async fn test_low_balance_reply() {
        let (acc, service) = api_service(3).await;

        let (status, body) = handle_send(
            &service,
            params(KEY, "text", "01711000000,01811000000,01911000000", "Hi"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            ApiResponse::error(LOW_BALANCE, "You do not have enough balance to send 3 messages.")
        );
        assert_eq!(acc.db.sms().wallet(&acc.client).await.unwrap().get(QUOTA), 3);
    }

    #[tokio::test]
    async fn test_accepted_send_records_ip() {
        let (acc, service) = api_service(10).await;

        let (status, body) = handle_send(
            &service,
            params(KEY, "text", "01711000000", "Hello there"),
            Some("198.51.100.4".into()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert_eq!(body.message, "Success");

        let batch = body.batch_id.unwrap();
        let stored = acc.db.sms().batch_messages(&batch).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].gateway_type, GatewayType::Https);
        assert_eq!(stored[0].sender_ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(acc.db.sms().wallet(&acc.client).await.unwrap().get(QUOTA), 9);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5500))));

        assert_eq!(client_ip(&headers, &extensions).as_deref(), Some("10.0.0.7"));

        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, &extensions).as_deref(), Some("203.0.113.5"));

        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), None);
    }

    #[tokio::test]
    async fn test_served_routes() {
        let (_acc, service) = api_service(10).await;
        let server = ApiServer::new(
            ServerSettings {
                bind_addr: "127.0.0.1".into(),
                port: 0,
            },
            service,
        );
        let handle = server.start().await.unwrap();
        let base = format!("http://{}", handle.local_addr());
        let http = reqwest::Client::new();

        let health = http.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);

        let sent: ApiResponse = http
            .post(format!("{}/api/sms/send", base))
            .form(&[("api_key", KEY), ("type", "text"), ("phone", "01711000000"), ("message", "Hi")])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(sent.success);

        let refused = http.put(format!("{}/api/sms/send", base)).send().await.unwrap();
        assert_eq!(refused.status().as_u16(), 405);
        let body: ApiResponse = refused.json().await.unwrap();
        assert_eq!(body.error_code, Some(METHOD_NOT_ALLOWED));

        handle.shutdown().await.unwrap();
    }
}
