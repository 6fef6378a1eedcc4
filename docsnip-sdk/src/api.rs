//! Payments API client used during bootstrap and escrow top-up.
//!
//! Only the handful of calls needed to provision a test marketplace are
//! modeled. Responses are kept as raw JSON since templates read them directly.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};

/// Test card number accepted by the sandbox for successful debits.
const TEST_CARD_NUMBER: &str = "4111111111111111";

/// Operations of the payments service the bootstrap relies on.
#[async_trait]
pub trait PaymentsApi: Send + Sync {
    /// Create a new API key, returning its secret.
    async fn create_api_key(&self) -> Result<String, ApiError>;

    /// Create the marketplace owned by `api_key`.
    async fn create_marketplace(&self, api_key: &str) -> Result<Value, ApiError>;

    /// Fetch a marketplace; fails with an auth status when the key is no longer valid.
    async fn fetch_marketplace(&self, api_key: &str, marketplace_uri: &str)
        -> Result<Value, ApiError>;

    /// Tokenize a test card on the marketplace.
    async fn create_card(&self, api_key: &str, marketplace_uri: &str) -> Result<Value, ApiError>;

    /// Debit `amount` (cents) from a card into the marketplace escrow.
    async fn debit_card(
        &self,
        api_key: &str,
        marketplace_uri: &str,
        card_uri: &str,
        amount: u64,
    ) -> Result<Value, ApiError>;
}

/// HTTP implementation of [`PaymentsApi`]. The secret is sent as the basic-auth user.
#[derive(Debug, Clone)]
pub struct HttpPaymentsApi {
    client: Client,
    api_location: String,
}

impl HttpPaymentsApi {
    pub fn new(api_location: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("docsnip/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_location: api_location.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn api_location(&self) -> &str {
        &self.api_location
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_location)
    }

    async fn send(request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::api_error(status.as_u16(), body));
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl PaymentsApi for HttpPaymentsApi {
    async fn create_api_key(&self) -> Result<String, ApiError> {
        let key = Self::send(self.client.post(self.url("/v1/api_keys"))).await?;
        key.get("secret")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::invalid_response("secret", "missing from api key response"))
    }

    async fn create_marketplace(&self, api_key: &str) -> Result<Value, ApiError> {
        Self::send(
            self.client
                .post(self.url("/v1/marketplaces"))
                .basic_auth(api_key, None::<&str>),
        )
        .await
    }

    async fn fetch_marketplace(
        &self,
        api_key: &str,
        marketplace_uri: &str,
    ) -> Result<Value, ApiError> {
        Self::send(
            self.client
                .get(self.url(marketplace_uri))
                .basic_auth(api_key, None::<&str>),
        )
        .await
    }

    async fn create_card(&self, api_key: &str, marketplace_uri: &str) -> Result<Value, ApiError> {
        Self::send(
            self.client
                .post(self.url(&format!("{marketplace_uri}/cards")))
                .basic_auth(api_key, None::<&str>)
                .json(&json!({
                    "card_number": TEST_CARD_NUMBER,
                    "expiration_month": 12,
                    "expiration_year": 2030,
                    "security_code": "123",
                })),
        )
        .await
    }

    async fn debit_card(
        &self,
        api_key: &str,
        marketplace_uri: &str,
        card_uri: &str,
        amount: u64,
    ) -> Result<Value, ApiError> {
        Self::send(
            self.client
                .post(self.url(&format!("{marketplace_uri}/debits")))
                .basic_auth(api_key, None::<&str>)
                .json(&json!({
                    "amount": amount,
                    "source_uri": card_uri,
                    "description": "docsnip escrow top-up",
                })),
        )
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {field} - {reason}")]
    InvalidResponse { field: String, reason: String },
}

impl ApiError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the cached credentials no longer work.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED.as_u16()
                    || *status == StatusCode::FORBIDDEN.as_u16()
                    || *status == StatusCode::NOT_FOUND.as_u16()
        )
    }
}

/// Read a required string field from an API object.
pub(crate) fn str_field<'a>(object: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::invalid_response(field, "missing or not a string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failure_statuses() {
        assert!(ApiError::api_error(401, "unauthorized").is_credential_failure());
        assert!(ApiError::api_error(403, "forbidden").is_credential_failure());
        assert!(ApiError::api_error(404, "gone").is_credential_failure());
        assert!(!ApiError::api_error(500, "boom").is_credential_failure());
        assert!(!ApiError::invalid_response("uri", "missing").is_credential_failure());
    }

    #[test]
    fn test_str_field() {
        let object = json!({"uri": "/v1/marketplaces/MP1", "in_escrow": 10});
        assert_eq!(str_field(&object, "uri").unwrap(), "/v1/marketplaces/MP1");
        assert!(str_field(&object, "in_escrow").is_err());
        assert!(str_field(&object, "id").is_err());
    }

    #[test]
    fn test_http_api_trims_location() {
        let api = HttpPaymentsApi::new("https://api.example.com/").unwrap();
        assert_eq!(api.api_location(), "https://api.example.com");
        assert_eq!(api.url("/v1/api_keys"), "https://api.example.com/v1/api_keys");
    }
}
