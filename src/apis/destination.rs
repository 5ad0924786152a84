use crate::error::{Result, SyncError};
use crate::throttle::Throttle;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

const API_BASE_URL: &str = "https://api.wildapricot.org/v2.2";
const TOKEN_URL: &str = "https://oauth.wildapricot.org/auth/token";

/// Fixed identifiers returned by the dry-run gateway instead of calling out.
pub const DRY_RUN_EVENT_ID: i64 = 12345;
pub const DRY_RUN_REGISTRATION_TYPE_ID: i64 = 98765;

/// The destination calls the event processor makes. `Live` submits over
/// HTTP; `DryRun` returns sentinel identifiers and logs the skipped call.
/// The implementation is chosen once at wiring time.
#[async_trait]
pub trait DestinationGateway: Send {
    /// Create an event, returning its new destination id.
    async fn add_event(&mut self, event: &Value) -> Result<i64>;

    /// Create an event registration type, returning its new id.
    async fn add_registration_type(&mut self, registration_type: &Value) -> Result<i64>;
}

/// Exchange an API key for a bearer token at the OAuth token endpoint.
pub async fn start_session(client: &reqwest::Client, api_key: &str) -> Result<String> {
    let response = client
        .post(TOKEN_URL)
        .basic_auth("APIKEY", Some(api_key))
        .form(&[("grant_type", "client_credentials"), ("scope", "auto")])
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(SyncError::DestinationApi {
            status: status.as_u16(),
            body,
        });
    }
    let token: Value = serde_json::from_str(&body)?;
    token
        .get("access_token")
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| SyncError::DestinationApi {
            status: status.as_u16(),
            body: "token response is missing access_token".to_string(),
        })
}

/// Wild Apricot API client, throttled and bearer-authorized, keyed by an
/// account id.
pub struct DestinationApi {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
    access_token: String,
    throttle: Throttle,
}

impl DestinationApi {
    pub fn new(
        client: reqwest::Client,
        account_id: String,
        access_token: String,
        throttle: Throttle,
    ) -> Self {
        DestinationApi {
            client,
            base_url: API_BASE_URL.to_string(),
            account_id,
            access_token,
            throttle,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn get_json(&mut self, url: &str) -> Result<Value> {
        self.throttle.throttle().await;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::DestinationApi {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// POST a JSON payload; the API answers creation requests with the new
    /// record's integer id as the response body.
    async fn post_for_id(&mut self, url: &str, payload: &Value) -> Result<i64> {
        self.throttle.throttle().await;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::DestinationApi {
                status: status.as_u16(),
                body,
            });
        }
        body.trim()
            .parse()
            .map_err(|_| SyncError::DestinationApi {
                status: status.as_u16(),
                body,
            })
    }

    /// The account's membership levels, used to resolve restriction level
    /// names at load time.
    pub async fn get_membership_levels(&mut self) -> Result<Vec<Value>> {
        let url = format!(
            "{}/accounts/{}/membershiplevels",
            self.base_url, self.account_id
        );
        let levels = self.get_json(&url).await?;
        levels
            .as_array()
            .cloned()
            .ok_or_else(|| SyncError::DestinationApi {
                status: 200,
                body: "membership level listing is not a JSON array".to_string(),
            })
    }
}

#[async_trait]
impl DestinationGateway for DestinationApi {
    async fn add_event(&mut self, event: &Value) -> Result<i64> {
        let url = format!("{}/accounts/{}/events", self.base_url, self.account_id);
        let event_id = self.post_for_id(&url, event).await?;
        debug!(event_id, "created destination event");
        Ok(event_id)
    }

    async fn add_registration_type(&mut self, registration_type: &Value) -> Result<i64> {
        let url = format!(
            "{}/accounts/{}/EventRegistrationTypes",
            self.base_url, self.account_id
        );
        self.post_for_id(&url, registration_type).await
    }
}

/// Dry-run gateway: no I/O, fixed sentinel identifiers, a structured log
/// line for every skipped call.
pub struct DryRunDestination;

#[async_trait]
impl DestinationGateway for DryRunDestination {
    async fn add_event(&mut self, event: &Value) -> Result<i64> {
        info!(
            name = event.get("Name").and_then(serde_json::Value::as_str).unwrap_or(""),
            "dry run: skipped event creation"
        );
        Ok(DRY_RUN_EVENT_ID)
    }

    async fn add_registration_type(&mut self, registration_type: &Value) -> Result<i64> {
        info!(
            name = registration_type
                .get("Name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(""),
            "dry run: skipped registration type creation"
        );
        Ok(DRY_RUN_REGISTRATION_TYPE_ID)
    }
}
