use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Events without an advertised duration run three hours.
pub const DEFAULT_DURATION_MS: i64 = 3 * 60 * 60 * 1000;

static CODE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Z][A-Z0-9-]*(?:_[A-Z0-9-]+)*)\s*:\s*").expect("code prefix pattern")
});

static MEMBERS_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)members[ -]*only").expect("members-only pattern"));

/// Raw venue block from a Meetup event record. Online events carry a bare
/// venue name only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVenue {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "address_1")]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFee {
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPhoto {
    pub highres_link: Option<String>,
    pub photo_link: Option<String>,
    pub thumb_link: Option<String>,
}

impl RawPhoto {
    /// The highest-resolution link available.
    fn best_link(&self) -> Option<String> {
        self.highres_link
            .clone()
            .or_else(|| self.photo_link.clone())
            .or_else(|| self.thumb_link.clone())
    }
}

/// A Meetup event record as returned by the events API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSourceEvent {
    pub id: String,
    pub name: String,
    /// Start instant in epoch milliseconds.
    pub time: i64,
    pub duration: Option<i64>,
    /// Milliseconds east of UTC at the venue.
    #[serde(default)]
    pub utc_offset: i64,
    pub venue: Option<RawVenue>,
    pub rsvp_limit: Option<u32>,
    #[serde(default)]
    pub yes_rsvp_count: u32,
    pub fee: Option<RawFee>,
    pub featured_photo: Option<RawPhoto>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
}

/// Read-only projection over a raw Meetup event record. Constructed fresh
/// each run and never mutated.
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub venue: RawVenue,
    pub rsvp_limit: Option<u32>,
    pub yes_rsvp_count: u32,
    pub fee: f64,
    pub photo_url: Option<String>,
    pub status: String,
    pub featured: bool,
    pub description: String,
    pub link: String,
    pub accounting_codes: Vec<String>,
    pub members_only: bool,
}

impl SourceEvent {
    pub fn from_raw(raw: RawSourceEvent) -> Self {
        let offset_seconds = (raw.utc_offset / 1000) as i32;
        let offset =
            FixedOffset::east_opt(offset_seconds).unwrap_or_else(|| FixedOffset::east_opt(0).expect("UTC offset"));
        let start_utc =
            DateTime::from_timestamp_millis(raw.time).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let duration = raw.duration.unwrap_or(DEFAULT_DURATION_MS);
        let end_utc = DateTime::from_timestamp_millis(raw.time + duration)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        SourceEvent {
            accounting_codes: parse_accounting_codes(&raw.name),
            members_only: MEMBERS_ONLY.is_match(&raw.name),
            id: raw.id,
            title: raw.name,
            start: start_utc.with_timezone(&offset),
            end: end_utc.with_timezone(&offset),
            venue: raw.venue.unwrap_or_default(),
            rsvp_limit: raw.rsvp_limit,
            yes_rsvp_count: raw.yes_rsvp_count,
            fee: raw.fee.map(|f| f.amount).unwrap_or(0.0),
            photo_url: raw.featured_photo.and_then(|p| p.best_link()),
            status: raw.status,
            featured: raw.featured,
            description: raw.description,
            link: raw.link,
        }
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }

    /// Venue fields assembled into a single location string, blanks dropped.
    pub fn location(&self) -> String {
        let partial = [
            self.venue.name.as_str(),
            self.venue.address.as_str(),
            self.venue.city.as_str(),
            self.venue.state.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
        [partial.as_str(), self.venue.zip.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Parse the leading colon-terminated accounting codes from an event title.
/// Each prefix splits on underscores into individual codes.
fn parse_accounting_codes(title: &str) -> Vec<String> {
    let mut rest = title;
    let mut codes = Vec::new();
    while let Some(caps) = CODE_PREFIX.captures(rest) {
        match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(prefix)) => {
                codes.extend(prefix.as_str().split('_').map(str::to_string));
                rest = &rest[whole.end()..];
            }
            _ => break,
        }
    }
    codes
}
