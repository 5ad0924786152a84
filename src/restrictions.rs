use crate::error::{Result, SyncError};
use crate::tagger::TagList;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A Wild Apricot membership level reference. Field names match the API's
/// JSON keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberLevel {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Url")]
    pub url: String,
}

/// Directory of membership levels by name, loaded from the destination API.
#[derive(Debug, Default)]
pub struct MemberLevelDirectory {
    named_levels: HashMap<String, MemberLevel>,
}

impl MemberLevelDirectory {
    pub fn new(named_levels: HashMap<String, MemberLevel>) -> Self {
        MemberLevelDirectory { named_levels }
    }

    /// Build the directory from the API's membership-level listing.
    pub fn from_api_json(levels: &[serde_json::Value]) -> Self {
        let named_levels = levels
            .iter()
            .filter_map(|level| {
                let name = level.get("Name")?.as_str()?.to_string();
                let id = level.get("Id")?.as_i64()?;
                let url = level.get("Url")?.as_str()?.to_string();
                Some((name, MemberLevel { id, url }))
            })
            .collect();
        MemberLevelDirectory { named_levels }
    }

    pub fn named_level(&self, name: &str) -> Result<MemberLevel> {
        self.named_levels
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownMemberLevel(name.to_string()))
    }

    pub fn named_levels(&self, names: &[String]) -> Result<Vec<MemberLevel>> {
        names.iter().map(|name| self.named_level(name)).collect()
    }
}

/// Registration policy for guests of a registered member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestPolicy {
    Disabled,
    NumberOfGuests,
    CollectContactDetails,
    CollectFullInfo,
}

impl GuestPolicy {
    /// The destination API's keyword for this policy.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            GuestPolicy::Disabled => "Disabled",
            GuestPolicy::NumberOfGuests => "NumberOfGuests",
            GuestPolicy::CollectContactDetails => "CollectContactDetails",
            GuestPolicy::CollectFullInfo => "CollectFullInfo",
        }
    }
}

/// One ordered restriction rule: events whose title matches the pattern and
/// whose price category is admitted get this rule's registration policy.
#[derive(Debug, Clone)]
pub struct EventRestriction {
    pub name: String,
    pub pattern: Regex,
    pub match_free_events: bool,
    pub match_paid_events: bool,
    pub member_levels: Vec<MemberLevel>,
    pub guest_policy: GuestPolicy,
}

impl EventRestriction {
    pub fn matches(&self, title: &str, price: f64) -> bool {
        if !self.pattern.is_match(title) {
            return false;
        }
        if price > 0.0 {
            self.match_paid_events
        } else {
            self.match_free_events
        }
    }

    /// The trailing catch-all rule appended to every configured list.
    pub fn default_rule() -> Self {
        EventRestriction {
            name: "RSVP".to_string(),
            pattern: Regex::new("^").expect("anchor pattern"),
            match_free_events: true,
            match_paid_events: true,
            member_levels: Vec::new(),
            guest_policy: GuestPolicy::Disabled,
        }
    }
}

/// Return the first rule matching a title and price. The loader appends a
/// total default rule, so a miss means the rule list was built by hand
/// without it: a programming invariant violation, not a data condition.
pub fn select_restriction<'a>(
    restrictions: &'a [EventRestriction],
    title: &str,
    price: f64,
) -> Result<&'a EventRestriction> {
    restrictions
        .iter()
        .find(|restriction| restriction.matches(title, price))
        .ok_or_else(|| SyncError::NoRestrictionMatch {
            title: title.to_string(),
        })
}

/// One configured restriction entry, typically from the TOML config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestrictionSpec {
    pub name: Option<String>,
    pub pattern: Option<String>,
    /// "free", "paid", or omitted for both.
    pub price: Option<String>,
    /// A level name or list of names; empty selects no level restriction.
    #[serde(default)]
    pub levels: TagList,
    /// "count", "contact", "full", or omitted for disabled.
    pub guests: Option<String>,
    #[serde(flatten)]
    pub unknown: HashMap<String, toml::Value>,
}

/// Compiles restriction rules from configuration, resolving member level
/// names and validating keywords. All failures here are fatal configuration
/// errors raised before any event is processed.
pub struct EventRestrictionLoader<'a> {
    levels: &'a MemberLevelDirectory,
}

impl<'a> EventRestrictionLoader<'a> {
    pub fn new(levels: &'a MemberLevelDirectory) -> Self {
        EventRestrictionLoader { levels }
    }

    /// Load the configured rules in order and append the catch-all default
    /// so selection is total.
    pub fn load(&self, specs: &[RestrictionSpec]) -> Result<Vec<EventRestriction>> {
        let mut restrictions = specs
            .iter()
            .map(|spec| self.load_restriction(spec))
            .collect::<Result<Vec<_>>>()?;
        restrictions.push(EventRestriction::default_rule());
        Ok(restrictions)
    }

    fn load_restriction(&self, spec: &RestrictionSpec) -> Result<EventRestriction> {
        if !spec.unknown.is_empty() {
            let mut names: Vec<&str> = spec.unknown.keys().map(String::as_str).collect();
            names.sort_unstable();
            warn!(?names, "unknown names in restriction configuration");
        }
        let (match_free_events, match_paid_events) = parse_price(spec.price.as_deref())?;
        let level_names = spec.levels.clone().into_tags();
        Ok(EventRestriction {
            name: spec.name.clone().unwrap_or_else(|| "RSVP".to_string()),
            pattern: compile_pattern(spec.pattern.as_deref().unwrap_or("^"))?,
            match_free_events,
            match_paid_events,
            member_levels: self.levels.named_levels(&level_names)?,
            guest_policy: parse_guest_policy(spec.guests.as_deref())?,
        })
    }
}

/// Compile a title pattern for case-insensitive searching.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| SyncError::InvalidRestrictionPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}

/// Parse a price category keyword into (match free, match paid) flags.
pub fn parse_price(price: Option<&str>) -> Result<(bool, bool)> {
    match price {
        None => Ok((true, true)),
        Some("free") => Ok((true, false)),
        Some("paid") => Ok((false, true)),
        Some(other) => Err(SyncError::InvalidPriceCategory(other.to_string())),
    }
}

/// Parse a guest policy keyword.
pub fn parse_guest_policy(policy: Option<&str>) -> Result<GuestPolicy> {
    match policy {
        None => Ok(GuestPolicy::Disabled),
        Some("count") => Ok(GuestPolicy::NumberOfGuests),
        Some("contact") => Ok(GuestPolicy::CollectContactDetails),
        Some("full") => Ok(GuestPolicy::CollectFullInfo),
        Some(other) => Err(SyncError::InvalidGuestPolicy(other.to_string())),
    }
}
