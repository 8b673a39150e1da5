//! In-memory wallet gateway implementing the HTTP contracts the client engine
//! consumes: payee validation, balance, both send-money answer styles, and the
//! notification API. The production backend lives elsewhere; this stub exists
//! so the engine can be exercised end to end in tests and local development.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use paisa_core::{
    Amount, NotificationCategory, NotificationId, NotificationRecord, parse_pay_payload,
    validate_pin,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
const DEFAULT_PIN: &str = "123456";
const DEFAULT_BALANCE_PAISE: u64 = 10_000_000;

#[derive(Debug)]
struct GatewayState {
    balance_paise: u64,
    pin: String,
    registered: HashMap<String, String>,
    notifications: Vec<NotificationRecord>,
    next_notification_id: NotificationId,
    request_log: Vec<String>,
    latency: HashMap<String, Duration>,
    fail_sends: bool,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self {
            balance_paise: DEFAULT_BALANCE_PAISE,
            pin: DEFAULT_PIN.to_owned(),
            registered: HashMap::new(),
            notifications: Vec::new(),
            next_notification_id: 1,
            request_log: Vec::new(),
            latency: HashMap::new(),
            fail_sends: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<RwLock<GatewayState>>,
    session_token: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(GatewayState::default())),
            session_token: None,
        }
    }

    /// Require `x-session-token` on every request; missing or wrong tokens
    /// get 401 so clients can exercise their authorization-error path.
    #[must_use]
    pub fn with_session_token(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GatewayState::default())),
            session_token: Some(token.into()),
        }
    }

    pub async fn register_payee(&self, identifier: &str, display_name: &str) {
        let mut state = self.inner.write().await;
        state
            .registered
            .insert(identifier.to_owned(), display_name.to_owned());
    }

    pub async fn set_balance(&self, amount: Amount) {
        self.inner.write().await.balance_paise = amount.paise();
    }

    pub async fn balance(&self) -> Amount {
        Amount::from_paise(self.inner.read().await.balance_paise)
    }

    pub async fn push_notification(
        &self,
        title: &str,
        message: &str,
        category: NotificationCategory,
    ) -> NotificationId {
        let mut state = self.inner.write().await;
        push_notification_locked(&mut state, title, message, category)
    }

    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.inner.read().await.notifications.clone()
    }

    /// Ordered log of `"METHOD path"` entries, for asserting call counts and
    /// fan-out ordering in tests.
    pub async fn request_log(&self) -> Vec<String> {
        self.inner.read().await.request_log.clone()
    }

    /// Delay responses whose log entry matches `op` exactly.
    pub async fn set_latency(&self, op: &str, delay: Duration) {
        self.inner.write().await.latency.insert(op.to_owned(), delay);
    }

    pub async fn set_fail_sends(&self, fail: bool) {
        self.inner.write().await.fail_sends = fail;
    }

    async fn admit(&self, headers: &HeaderMap, op: String) -> Result<(), StatusCode> {
        let delay = {
            let mut state = self.inner.write().await;
            let delay = state.latency.get(&op).copied();
            state.request_log.push(op);
            delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(expected) = &self.session_token {
            let presented = headers
                .get(SESSION_TOKEN_HEADER)
                .and_then(|value| value.to_str().ok());
            if presented != Some(expected.as_str()) {
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn push_notification_locked(
    state: &mut GatewayState,
    title: &str,
    message: &str,
    category: NotificationCategory,
) -> NotificationId {
    let id = state.next_notification_id;
    state.next_notification_id += 1;
    state.notifications.push(NotificationRecord {
        id,
        title: title.to_owned(),
        message: message.to_owned(),
        is_read: false,
        category,
        timestamp_unix_ms: now_unix_ms(),
    });
    id
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/qr/validate", post(validate_payee))
        .route("/api/balance", get(balance))
        .route("/send-money", post(send_money_redirect))
        .route("/send-money-qr", post(send_money_json))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/count", get(notification_count))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/{id}", delete(delete_notification))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route(
            "/api/notifications/delete-read",
            delete(delete_read_notifications),
        )
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), String> {
    info!(
        "gateway listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );
    axum::serve(listener, build_router(state))
        .await
        .map_err(|err| err.to_string())
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    qr_data: String,
}

#[derive(Debug, Serialize)]
struct PayeeUser {
    upi_id: String,
    username: String,
}

async fn validate_payee(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateRequest>,
) -> Response {
    if let Err(status) = state.admit(&headers, "POST /qr/validate".to_owned()).await {
        return status.into_response();
    }

    let payload = match parse_pay_payload(&request.qr_data) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("rejected payload: {err}");
            return Json(serde_json::json!({
                "success": false,
                "error": err.to_string(),
            }))
            .into_response();
        }
    };

    let gateway = state.inner.read().await;
    let registered_name = gateway.registered.get(&payload.identifier).cloned();
    let is_registered = registered_name.is_some();
    let username = registered_name
        .or(payload.display_name)
        .unwrap_or_else(|| "Unknown User".to_owned());

    Json(serde_json::json!({
        "success": true,
        "is_registered": is_registered,
        "user": PayeeUser {
            upi_id: payload.identifier,
            username,
        },
    }))
    .into_response()
}

async fn balance(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(status) = state.admit(&headers, "GET /api/balance".to_owned()).await {
        return status.into_response();
    }
    let gateway = state.inner.read().await;
    Json(serde_json::json!({
        "success": true,
        "balance": Amount::from_paise(gateway.balance_paise).to_decimal_string(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct SendMoneyForm {
    identifier: String,
    amount: String,
    pin: String,
    #[serde(default)]
    #[allow(dead_code)]
    payment_method: Option<String>,
}

enum SendOutcome {
    Ok { reference: u32 },
    Rejected(String),
}

async fn apply_send(state: &AppState, form: &SendMoneyForm) -> SendOutcome {
    let amount = match Amount::parse(&form.amount)
        .and_then(|a| a.check_transaction_limits().map(|()| a))
    {
        Ok(amount) => amount,
        Err(err) => return SendOutcome::Rejected(err.to_string()),
    };
    if validate_pin(&form.pin).is_err() {
        return SendOutcome::Rejected("invalid PIN".to_owned());
    }

    let mut gateway = state.inner.write().await;
    if gateway.fail_sends {
        return SendOutcome::Rejected("transfer temporarily unavailable".to_owned());
    }
    if form.pin != gateway.pin {
        return SendOutcome::Rejected("incorrect PIN".to_owned());
    }
    if amount.paise() > gateway.balance_paise {
        return SendOutcome::Rejected("insufficient balance".to_owned());
    }

    gateway.balance_paise -= amount.paise();
    let reference: u32 = rand::rng().random();
    push_notification_locked(
        &mut gateway,
        "Money Sent",
        &format!("{amount} sent to {}", form.identifier),
        NotificationCategory::Success,
    );
    SendOutcome::Ok { reference }
}

async fn send_money_redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SendMoneyForm>,
) -> Response {
    if let Err(status) = state.admit(&headers, "POST /send-money".to_owned()).await {
        return status.into_response();
    }
    match apply_send(&state, &form).await {
        SendOutcome::Ok { reference } => {
            Redirect::to(&format!("/payment-success/{reference}")).into_response()
        }
        SendOutcome::Rejected(error) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "success": false, "error": error })),
        )
            .into_response(),
    }
}

async fn send_money_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SendMoneyForm>,
) -> Response {
    if let Err(status) = state.admit(&headers, "POST /send-money-qr".to_owned()).await {
        return status.into_response();
    }
    match apply_send(&state, &form).await {
        SendOutcome::Ok { reference } => Json(serde_json::json!({
            "success": true,
            "redirect": format!("/payment-success/{reference}"),
        }))
        .into_response(),
        SendOutcome::Rejected(error) => {
            Json(serde_json::json!({ "success": false, "error": error })).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    unread_only: Option<bool>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    if let Err(status) = state
        .admit(&headers, "GET /api/notifications".to_owned())
        .await
    {
        return status.into_response();
    }

    let gateway = state.inner.read().await;
    let mut records: Vec<&NotificationRecord> = gateway
        .notifications
        .iter()
        .filter(|n| !query.unread_only.unwrap_or(false) || !n.is_read)
        .collect();
    // Newest first.
    records.sort_by(|a, b| b.id.cmp(&a.id));
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }

    Json(serde_json::json!({
        "success": true,
        "notifications": records,
    }))
    .into_response()
}

async fn notification_count(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(status) = state
        .admit(&headers, "GET /api/notifications/count".to_owned())
        .await
    {
        return status.into_response();
    }
    let gateway = state.inner.read().await;
    let count = gateway.notifications.iter().filter(|n| !n.is_read).count();
    Json(serde_json::json!({ "success": true, "count": count })).into_response()
}

fn unread_count(state: &GatewayState) -> usize {
    state.notifications.iter().filter(|n| !n.is_read).count()
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<NotificationId>,
) -> Response {
    if let Err(status) = state
        .admit(&headers, format!("POST /api/notifications/{id}/read"))
        .await
    {
        return status.into_response();
    }
    let mut gateway = state.inner.write().await;
    let found = gateway
        .notifications
        .iter_mut()
        .find(|n| n.id == id)
        .map(|n| n.is_read = true)
        .is_some();
    if !found {
        return StatusCode::NOT_FOUND.into_response();
    }
    let unread = unread_count(&gateway);
    Json(serde_json::json!({ "success": true, "unread_count": unread })).into_response()
}

async fn delete_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<NotificationId>,
) -> Response {
    if let Err(status) = state
        .admit(&headers, format!("DELETE /api/notifications/{id}"))
        .await
    {
        return status.into_response();
    }
    let mut gateway = state.inner.write().await;
    let before = gateway.notifications.len();
    gateway.notifications.retain(|n| n.id != id);
    if gateway.notifications.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    let unread = unread_count(&gateway);
    Json(serde_json::json!({ "success": true, "unread_count": unread })).into_response()
}

async fn mark_all_read(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(status) = state
        .admit(&headers, "POST /api/notifications/read-all".to_owned())
        .await
    {
        return status.into_response();
    }
    let mut gateway = state.inner.write().await;
    for record in &mut gateway.notifications {
        record.is_read = true;
    }
    Json(serde_json::json!({ "success": true, "unread_count": 0 })).into_response()
}

async fn delete_read_notifications(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(status) = state
        .admit(&headers, "DELETE /api/notifications/delete-read".to_owned())
        .await
    {
        return status.into_response();
    }
    let mut gateway = state.inner.write().await;
    gateway.notifications.retain(|n| !n.is_read);
    let unread = unread_count(&gateway);
    Json(serde_json::json!({ "success": true, "unread_count": unread })).into_response()
}
