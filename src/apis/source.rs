use crate::error::{Result, SyncError};
use crate::source_event::RawSourceEvent;
use crate::throttle::Throttle;
use reqwest::StatusCode;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.meetup.com";

/// Fraction of Meetup's advertised rate limit this client allows itself.
const API_UTILIZATION_RATIO: f64 = 2.0 / 3.0;

/// Meetup events API client: paged upcoming-event retrieval for a group,
/// individual lookups by id, and a status probe whose rate-limit headers
/// calibrate the throttle.
pub struct SourceApi {
    client: reqwest::Client,
    base_url: String,
    group_url_name: String,
    events_wanted: u32,
    throttle: Throttle,
}

impl SourceApi {
    pub fn new(
        client: reqwest::Client,
        group_url_name: String,
        events_wanted: u32,
        throttle: Throttle,
    ) -> Self {
        SourceApi {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            group_url_name,
            events_wanted,
            throttle,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn set_throttle(&mut self, throttle: Throttle) {
        self.throttle = throttle;
    }

    /// Probe the API status endpoint and build a throttle from the
    /// advertised rate-limit ceiling and reset window. The probe itself is
    /// never rate limited.
    pub async fn make_calibrated_throttle(&self) -> Result<Throttle> {
        let url = format!("{}/status", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::SourceApi {
                status: status.as_u16(),
                body,
            });
        }
        let rate = header_number(&response, "X-RateLimit-Limit")?;
        let window = header_number(&response, "X-RateLimit-Reset")?;
        info!(rate, window, "calibrating Meetup throttle from status headers");
        Ok(Throttle::calibrated(
            rate as u32,
            window as f64,
            API_UTILIZATION_RATIO,
            "Meetup API",
        ))
    }

    /// Retrieve the upcoming events page for the configured group,
    /// requesting the featured-photo projection.
    pub async fn retrieve_events(&mut self) -> Result<Vec<RawSourceEvent>> {
        self.throttle.throttle().await;
        let url = format!("{}/{}/events", self.base_url, self.group_url_name);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("page", self.events_wanted.to_string()),
                ("fields", "featured_photo,featured".to_string()),
                ("scroll", "recent_past".to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::SourceApi {
                status: status.as_u16(),
                body,
            });
        }
        let events: Vec<RawSourceEvent> = serde_json::from_str(&body)?;
        debug!(count = events.len(), "retrieved upcoming Meetup events");
        Ok(events)
    }

    /// Retrieve a single event by id. Missing events are `None`, not
    /// errors: ids disappear when events are removed.
    pub async fn retrieve_event(&mut self, event_id: &str) -> Result<Option<RawSourceEvent>> {
        self.throttle.throttle().await;
        let url = format!(
            "{}/{}/events/{}",
            self.base_url, self.group_url_name, event_id
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(event_id, "Meetup event no longer exists");
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::SourceApi {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(serde_json::from_str(&body)?))
    }
}

fn header_number(response: &reqwest::Response, name: &str) -> Result<i64> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| SyncError::SourceApi {
            status: response.status().as_u16(),
            body: format!("status response is missing a numeric {name} header"),
        })
}
