use crate::apis::source::SourceApi;
use crate::cache::KnownEvent;
use crate::error::Result;
use crate::source_event::SourceEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

/// Looks up the current form of a source event by id. `None` means the
/// event no longer exists (removed or cancelled).
#[async_trait]
pub trait EventLookup {
    async fn get_event(&mut self, event_id: &str) -> Result<Option<SourceEvent>>;
}

/// By-id lookup backed by the upcoming-events list, falling back to an API
/// fetch for ids not on it. Fetch results are memoized for the run.
pub struct EventRetriever<'a> {
    api: &'a mut SourceApi,
    events_by_id: HashMap<String, Option<SourceEvent>>,
}

impl<'a> EventRetriever<'a> {
    pub fn new(api: &'a mut SourceApi, upcoming_events: &[SourceEvent]) -> Self {
        let events_by_id = upcoming_events
            .iter()
            .map(|event| (event.id.clone(), Some(event.clone())))
            .collect();
        EventRetriever { api, events_by_id }
    }
}

#[async_trait]
impl EventLookup for EventRetriever<'_> {
    async fn get_event(&mut self, event_id: &str) -> Result<Option<SourceEvent>> {
        if let Some(cached) = self.events_by_id.get(event_id) {
            return Ok(cached.clone());
        }
        let fetched = self
            .api
            .retrieve_event(event_id)
            .await?
            .map(SourceEvent::from_raw)
            .filter(|event| !event.is_cancelled());
        self.events_by_id
            .insert(event_id.to_string(), fetched.clone());
        Ok(fetched)
    }
}

/// Reconciles the known-events mapping against live source data before a
/// run: outdated entries go, renamed ids are corrected, and explicitly
/// skipped ids are forced in so they are never re-offered.
pub struct EventMappingUpdater<L> {
    lookup: L,
    earliest_start_time: chrono::DateTime<chrono::Utc>,
    skip_ids: Vec<String>,
}

impl<L: EventLookup> EventMappingUpdater<L> {
    pub fn new(
        lookup: L,
        earliest_start_time: chrono::DateTime<chrono::Utc>,
        skip_ids: Vec<String>,
    ) -> Self {
        EventMappingUpdater {
            lookup,
            earliest_start_time,
            skip_ids,
        }
    }

    pub async fn update(
        &mut self,
        mapping: HashMap<String, KnownEvent>,
    ) -> Result<HashMap<String, KnownEvent>> {
        let mut updated = self.clean_mapping(mapping).await?;
        for skip_id in self.skip_ids.clone() {
            if let Some(event) = self.lookup.get_event(&skip_id).await? {
                info!(source_id = %event.id, "recording skipped event");
                updated.insert(
                    event.id.clone(),
                    KnownEvent {
                        // Skip entries were never submitted; 0 is not a
                        // real destination id.
                        destination_id: 0,
                        start: event.start_utc(),
                    },
                );
            } else {
                debug!(source_id = %skip_id, "skipped event no longer exists");
            }
        }
        Ok(updated)
    }

    /// Drop outdated entries and substitute each survivor's current source
    /// id, dropping entries whose events no longer exist.
    async fn clean_mapping(
        &mut self,
        mapping: HashMap<String, KnownEvent>,
    ) -> Result<HashMap<String, KnownEvent>> {
        let mut cleaned = HashMap::new();
        for (source_id, known) in mapping {
            if known.start < self.earliest_start_time {
                debug!(source_id = %source_id, start = %known.start, "dropping outdated mapping entry");
                continue;
            }
            match self.lookup.get_event(&source_id).await? {
                Some(event) => {
                    if event.id != source_id {
                        info!(old = %source_id, new = %event.id, "source event id changed");
                    }
                    cleaned.insert(event.id, known);
                }
                None => {
                    debug!(source_id = %source_id, "dropping mapping entry for removed event");
                }
            }
        }
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_event::RawSourceEvent;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct MapLookup {
        events: HashMap<String, SourceEvent>,
    }

    #[async_trait]
    impl EventLookup for MapLookup {
        async fn get_event(&mut self, event_id: &str) -> Result<Option<SourceEvent>> {
            Ok(self.events.get(event_id).cloned())
        }
    }

    fn event(id: &str, epoch_ms: i64) -> SourceEvent {
        let raw: RawSourceEvent = serde_json::from_value(json!({
            "id": id,
            "name": "AC: Mending Monday",
            "time": epoch_ms,
        }))
        .unwrap();
        SourceEvent::from_raw(raw)
    }

    fn known(destination_id: i64, start: chrono::DateTime<Utc>) -> KnownEvent {
        KnownEvent {
            destination_id,
            start,
        }
    }

    fn earliest() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 11, 10, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn outdated_entries_are_dropped() {
        let lookup = MapLookup {
            events: HashMap::from([("old".to_string(), event("old", 1604966400000))]),
        };
        let mut updater = EventMappingUpdater::new(lookup, earliest(), Vec::new());
        let mapping = HashMap::from([(
            "old".to_string(),
            known(101, Utc.with_ymd_and_hms(2020, 11, 9, 19, 0, 0).unwrap()),
        )]);
        let updated = updater.update(mapping).await.unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn surviving_entries_keep_their_data() {
        let start = Utc.with_ymd_and_hms(2020, 11, 13, 19, 0, 0).unwrap();
        let lookup = MapLookup {
            events: HashMap::from([("274139316".to_string(), event("274139316", 1605312000000))]),
        };
        let mut updater = EventMappingUpdater::new(lookup, earliest(), Vec::new());
        let mapping = HashMap::from([("274139316".to_string(), known(4041234, start))]);
        let updated = updater.update(mapping).await.unwrap();
        assert_eq!(updated.get("274139316"), Some(&known(4041234, start)));
    }

    #[tokio::test]
    async fn renamed_ids_are_corrected() {
        let start = Utc.with_ymd_and_hms(2020, 11, 13, 19, 0, 0).unwrap();
        // The retriever resolves the stale id to the event's current id.
        let lookup = MapLookup {
            events: HashMap::from([("stale-id".to_string(), event("fresh-id", 1605312000000))]),
        };
        let mut updater = EventMappingUpdater::new(lookup, earliest(), Vec::new());
        let mapping = HashMap::from([("stale-id".to_string(), known(4041234, start))]);
        let updated = updater.update(mapping).await.unwrap();
        assert!(updated.contains_key("fresh-id"));
        assert!(!updated.contains_key("stale-id"));
    }

    #[tokio::test]
    async fn removed_events_are_dropped() {
        let start = Utc.with_ymd_and_hms(2020, 11, 13, 19, 0, 0).unwrap();
        let lookup = MapLookup {
            events: HashMap::new(),
        };
        let mut updater = EventMappingUpdater::new(lookup, earliest(), Vec::new());
        let mapping = HashMap::from([("gone".to_string(), known(4041234, start))]);
        let updated = updater.update(mapping).await.unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn skip_ids_are_forced_into_the_mapping() {
        let lookup = MapLookup {
            events: HashMap::from([("skipme".to_string(), event("skipme", 1605312000000))]),
        };
        let mut updater =
            EventMappingUpdater::new(lookup, earliest(), vec!["skipme".to_string()]);
        let updated = updater.update(HashMap::new()).await.unwrap();
        let entry = updated.get("skipme").unwrap();
        assert_eq!(entry.destination_id, 0);
        assert_eq!(
            entry.start,
            Utc.with_ymd_and_hms(2020, 11, 14, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn missing_skip_ids_are_ignored() {
        let lookup = MapLookup {
            events: HashMap::new(),
        };
        let mut updater =
            EventMappingUpdater::new(lookup, earliest(), vec!["vanished".to_string()]);
        let updated = updater.update(HashMap::new()).await.unwrap();
        assert!(updated.is_empty());
    }
}
