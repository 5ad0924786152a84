use crate::source_event::SourceEvent;
use serde::Deserialize;
use std::collections::HashMap;

/// Marker tag applied to featured events.
const FEATURED_TAG: &str = "featured";

/// A configured tag list may be written as a single bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagList {
    One(String),
    Many(Vec<String>),
}

impl TagList {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            TagList::One(tag) if tag.is_empty() => Vec::new(),
            TagList::One(tag) => vec![tag],
            TagList::Many(tags) => tags,
        }
    }
}

impl Default for TagList {
    fn default() -> Self {
        TagList::Many(Vec::new())
    }
}

/// Derives destination tags from an event's accounting codes. Wild Apricot
/// filters event listings by tag, so codes map to audience-facing tags.
pub struct EventTagger {
    codes_to_tags: HashMap<String, Vec<String>>,
    all_event_tags: Vec<String>,
}

impl EventTagger {
    pub fn new(
        raw_codes_to_tags: HashMap<String, TagList>,
        raw_all_event_tags: TagList,
    ) -> Self {
        let codes_to_tags = raw_codes_to_tags
            .into_iter()
            .map(|(code, tags)| (code, tags.into_tags()))
            .collect();
        EventTagger {
            codes_to_tags,
            all_event_tags: raw_all_event_tags.into_tags(),
        }
    }

    /// Ordered tag list for an event, duplicates removed, first occurrence
    /// wins: featured marker, then global tags, then accounting-code tags.
    pub fn tag_event(&self, event: &SourceEvent) -> Vec<String> {
        let mut tags = Vec::new();
        if event.featured {
            tags.push(FEATURED_TAG.to_string());
        }
        tags.extend(self.all_event_tags.iter().cloned());
        tags.extend(self.tag_codes(&event.accounting_codes));
        dedup_first_seen(tags)
    }

    /// Tags for a list of accounting codes: one combined tag joining the
    /// codes, then each code's configured tags. Unknown codes contribute
    /// nothing.
    fn tag_codes(&self, codes: &[String]) -> Vec<String> {
        if codes.is_empty() {
            return Vec::new();
        }
        let mut tags = vec![codes.join("_")];
        for code in codes {
            if let Some(code_tags) = self.codes_to_tags.get(code) {
                tags.extend(code_tags.iter().cloned());
            }
        }
        tags
    }
}

fn dedup_first_seen(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter().filter(|tag| seen.insert(tag.clone())).collect()
}
