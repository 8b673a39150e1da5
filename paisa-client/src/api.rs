//! HTTP client for the wallet gateway contracts. One method per endpoint over
//! a small set of private helpers; redirects are surfaced to the caller
//! because one of the payment endpoints answers with one.

use paisa_core::{Amount, CoreError, NotificationId, NotificationRecord, PayeeCandidate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("session expired or unauthorized")]
    Unauthorized,
    #[error("endpoint error ({status}): {message}")]
    Endpoint { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("response parse error: {0}")]
    Parse(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Parse(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct WalletApi {
    base_url: String,
    session_token: Option<String>,
    http: reqwest::Client,
}

/// Outcome of a successful payment submission, whichever answer style the
/// endpoint used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub redirect: String,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    success: bool,
    #[serde(default)]
    is_registered: bool,
    #[serde(default)]
    user: Option<ValidateUser>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateUser {
    upi_id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    success: bool,
    #[serde(default)]
    balance: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: bool,
    #[serde(default)]
    redirect: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    success: bool,
    #[serde(default)]
    notifications: Vec<NotificationRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    success: bool,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    success: bool,
    #[serde(default)]
    unread_count: u64,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMoneyForm<'a> {
    identifier: &'a str,
    amount: String,
    pin: &'a str,
    payment_method: &'a str,
}

impl WalletApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::build(base_url.into(), None)
    }

    pub fn with_session_token(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Self::build(base_url.into(), Some(token.into()))
    }

    fn build(base_url: String, session_token: Option<String>) -> Result<Self, ApiError> {
        // Redirects are a success signal from one of the payment endpoints,
        // so the client must see them rather than follow them.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            session_token,
            http,
        })
    }

    /// One round trip to the payee validation endpoint. The raw payload is
    /// whatever an identity source produced; the response is normalized into
    /// a candidate carrying that payload.
    pub async fn validate_payee(&self, raw_payload: &str) -> Result<PayeeCandidate, ApiError> {
        let response: ValidateResponse = self
            .request_json(
                self.http
                    .post(self.url("/qr/validate"))
                    .json(&serde_json::json!({ "qr_data": raw_payload })),
            )
            .await?;

        if !response.success {
            return Err(ApiError::Rejected(
                response.error.unwrap_or_else(|| "Invalid QR code".to_owned()),
            ));
        }
        let user = response
            .user
            .ok_or_else(|| ApiError::Parse("validation response missing user".to_owned()))?;
        Ok(PayeeCandidate {
            identifier: user.upi_id,
            display_name: user.username,
            is_registered: response.is_registered,
            qr_payload: Some(raw_payload.to_owned()),
        })
    }

    pub async fn balance(&self) -> Result<Amount, ApiError> {
        let response: BalanceResponse = self
            .request_json(self.http.get(self.url("/api/balance")))
            .await?;
        if !response.success {
            return Err(ApiError::Rejected(
                response.error.unwrap_or_else(|| "balance unavailable".to_owned()),
            ));
        }
        let text = response
            .balance
            .ok_or_else(|| ApiError::Parse("balance response missing balance".to_owned()))?;
        Ok(Amount::parse(&text)?)
    }

    /// Submit a payment. Candidates produced by a scan go through the QR
    /// endpoint (JSON `success` flag); the rest go through the plain endpoint
    /// (redirect on success). Both are handled here.
    pub async fn submit_payment(
        &self,
        candidate: &PayeeCandidate,
        amount: Amount,
        pin: &str,
    ) -> Result<PaymentReceipt, ApiError> {
        let (path, method) = if candidate.qr_payload.is_some() {
            ("/send-money-qr", "qr")
        } else {
            ("/send-money", "contact")
        };
        let form = SendMoneyForm {
            identifier: &candidate.identifier,
            amount: amount.to_decimal_string(),
            pin,
            payment_method: method,
        };

        let response = self
            .send(self.http.post(self.url(path)).form(&form))
            .await?;
        let status = response.status();

        if status.is_redirection() {
            let redirect = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("/")
                .to_owned();
            return Ok(PaymentReceipt { redirect });
        }

        let body: SendResponse = Self::parse_body(response).await?;
        if body.success {
            Ok(PaymentReceipt {
                redirect: body.redirect.unwrap_or_else(|| "/".to_owned()),
            })
        } else {
            Err(ApiError::Rejected(
                body.error.unwrap_or_else(|| "Payment failed".to_owned()),
            ))
        }
    }

    pub async fn notifications(
        &self,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationRecord>, ApiError> {
        let mut request = self
            .http
            .get(self.url("/api/notifications"))
            .query(&[("unread_only", unread_only)]);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response: ListResponse = self.request_json(request).await?;
        if !response.success {
            return Err(ApiError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "notification list unavailable".to_owned()),
            ));
        }
        Ok(response.notifications)
    }

    pub async fn notification_count(&self) -> Result<u64, ApiError> {
        let response: CountResponse = self
            .request_json(self.http.get(self.url("/api/notifications/count")))
            .await?;
        if !response.success {
            return Err(ApiError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "notification count unavailable".to_owned()),
            ));
        }
        Ok(response.count)
    }

    pub async fn mark_read(&self, id: NotificationId) -> Result<u64, ApiError> {
        self.mutation(
            self.http
                .post(self.url(&format!("/api/notifications/{id}/read"))),
        )
        .await
    }

    pub async fn delete_notification(&self, id: NotificationId) -> Result<u64, ApiError> {
        self.mutation(
            self.http
                .delete(self.url(&format!("/api/notifications/{id}"))),
        )
        .await
    }

    pub async fn mark_all_read(&self) -> Result<u64, ApiError> {
        self.mutation(self.http.post(self.url("/api/notifications/read-all")))
            .await
    }

    pub async fn delete_read(&self) -> Result<u64, ApiError> {
        self.mutation(
            self.http
                .delete(self.url("/api/notifications/delete-read")),
        )
        .await
    }

    pub async fn fetch_asset(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.send(self.http.get(self.url(path))).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Endpoint {
                status: status.as_u16(),
                message: format!("asset fetch failed for {path}"),
            });
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| ApiError::Transport(err.to_string()))
    }

    async fn mutation(&self, request: reqwest::RequestBuilder) -> Result<u64, ApiError> {
        let response: MutationResponse = self.request_json(request).await?;
        if !response.success {
            return Err(ApiError::Rejected(
                response.error.unwrap_or_else(|| "request failed".to_owned()),
            ));
        }
        Ok(response.unread_count)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = request;
        if let Some(token) = &self.session_token {
            request = request.header(SESSION_TOKEN_HEADER, token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        Ok(response)
    }

    async fn request_json<T>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send(request).await?;
        Self::parse_body(response).await
    }

    async fn parse_body<T>(response: reqwest::Response) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        match serde_json::from_slice::<T>(&bytes) {
            Ok(parsed) => Ok(parsed),
            Err(err) if status.is_success() => Err(ApiError::Parse(err.to_string())),
            Err(_) => Err(ApiError::Endpoint {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }
}
