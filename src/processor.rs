use crate::apis::destination::DestinationGateway;
use crate::cache::{KnownEvent, KnownEventsCache};
use crate::error::Result;
use crate::photo_cache::PhotoCache;
use crate::registration::RegistrationTypeMaker;
use crate::report::Reporter;
use crate::source_event::SourceEvent;
use crate::tagger::EventTagger;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info};

/// Per-event pipeline: eligibility filter, photo acquisition, tagging,
/// event submission, registration types, cache recording. Terminal on the
/// first matching branch; a photo failure abandons only its event.
pub struct EventProcessor {
    earliest_start_time: DateTime<Utc>,
    latest_start_time: DateTime<Utc>,
    known_events: KnownEventsCache,
    photo_cache: PhotoCache,
    tagger: EventTagger,
    registration_maker: RegistrationTypeMaker,
    destination: Box<dyn DestinationGateway>,
    reporter: Reporter,
}

impl EventProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        earliest_start_time: DateTime<Utc>,
        latest_start_time: DateTime<Utc>,
        known_events: KnownEventsCache,
        photo_cache: PhotoCache,
        tagger: EventTagger,
        registration_maker: RegistrationTypeMaker,
        destination: Box<dyn DestinationGateway>,
        reporter: Reporter,
    ) -> Self {
        EventProcessor {
            earliest_start_time,
            latest_start_time,
            known_events,
            photo_cache,
            tagger,
            registration_maker,
            destination,
            reporter,
        }
    }

    /// True when an event needs no processing: outside the retention
    /// window, or already submitted in an earlier run. No side effects.
    pub fn can_ignore(&self, event: &SourceEvent) -> bool {
        let start = event.start_utc();
        start < self.earliest_start_time
            || start > self.latest_start_time
            || self.known_events.contains(&event.id)
    }

    pub async fn process(&mut self, event: &SourceEvent) -> Result<()> {
        if self.can_ignore(event) {
            debug!(source_id = %event.id, title = %event.title, "ignoring event");
            return Ok(());
        }
        let photo = match self.photo_cache.resolve(event).await {
            Ok(photo) => photo,
            Err(err) if err.is_photo_error() => {
                error!(
                    source_id = %event.id,
                    title = %event.title,
                    error = %err,
                    "photo failure; skipping event"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let tags = self.tagger.tag_event(event);
        let payload = build_event_payload(event, photo.path.as_deref(), &tags);
        let destination_id = self.destination.add_event(&payload).await?;
        info!(source_id = %event.id, destination_id, title = %event.title, "added event");

        let (acknowledgement, public) = self.registration_maker.make(event, destination_id)?;
        self.destination
            .add_registration_type(&acknowledgement.to_json())
            .await?;
        self.destination
            .add_registration_type(&public.to_json())
            .await?;

        self.known_events.insert(
            event.id.clone(),
            KnownEvent {
                destination_id,
                start: event.start_utc(),
            },
        );

        self.reporter.report_event(event);
        if let Some(name) = &photo.downloaded_name {
            self.reporter.report_photo_name(name);
        }
        self.reporter.report_registration_type(&acknowledgement);
        self.reporter.report_registration_type(&public);
        self.reporter.report()?;
        Ok(())
    }

    /// Flush the run summary and hand the caches back for checkpointing.
    pub fn finish(mut self) -> Result<(KnownEventsCache, PhotoCache)> {
        self.reporter.report_downloads()?;
        Ok((self.known_events, self.photo_cache))
    }
}

/// The destination event-creation payload: open access, timezone offsets
/// preserved, and an HTML description embedding the photo and a back-link
/// to the source event page.
fn build_event_payload(event: &SourceEvent, photo_path: Option<&str>, tags: &[String]) -> Value {
    json!({
        "Name": event.title,
        "EventType": "Regular",
        "StartDate": event.start.to_rfc3339(),
        "StartTimeSpecified": true,
        "EndDate": event.end.to_rfc3339(),
        "EndTimeSpecified": true,
        "Location": event.location(),
        "RegistrationEnabled": true,
        "RegistrationsLimit": event.rsvp_limit,
        "AccessLevel": "Public",
        "Tags": tags,
        "Details": {
            "DescriptionHtml": build_description_html(event, photo_path),
            "AccessControl": { "AccessLevel": "Public" },
        },
    })
}

fn build_description_html(event: &SourceEvent, photo_path: Option<&str>) -> String {
    let mut html = String::new();
    if let Some(path) = photo_path {
        html.push_str(&format!("<p><img src=\"{path}\"></p>"));
    }
    html.push_str(&event.description);
    if !event.link.is_empty() {
        html.push_str(&format!(
            "<p>Please RSVP on <a href=\"{}\">Meetup</a>.</p>",
            event.link
        ));
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::destination::DestinationGateway;
    use crate::apis::photos::PhotoTransfer;
    use crate::cache::PhotoUrlCache;
    use crate::error::SyncError;
    use crate::restrictions::EventRestriction;
    use crate::source_event::RawSourceEvent;
    use crate::tagger::TagList;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    /// Gateway double that records submissions and assigns sequential ids.
    #[derive(Clone, Default)]
    struct RecordingGateway {
        events: Arc<Mutex<Vec<Value>>>,
        registration_types: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl DestinationGateway for RecordingGateway {
        async fn add_event(&mut self, event: &Value) -> Result<i64> {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            Ok(4041000 + events.len() as i64)
        }

        async fn add_registration_type(&mut self, registration_type: &Value) -> Result<i64> {
            let mut types = self.registration_types.lock().unwrap();
            types.push(registration_type.clone());
            Ok(types.len() as i64)
        }
    }

    struct StubTransfer {
        fail_download: bool,
    }

    #[async_trait]
    impl PhotoTransfer for StubTransfer {
        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            if self.fail_download {
                return Err(SyncError::PhotoDownload {
                    url: url.to_string(),
                    reason: "HTTP status 500".to_string(),
                });
            }
            Ok(JPEG_BYTES.to_vec())
        }

        async fn upload(&self, _path: &str, _bytes: &[u8], _content_type: &str) -> Result<()> {
            Ok(())
        }
    }

    fn sample_event() -> SourceEvent {
        let raw: RawSourceEvent = serde_json::from_value(json!({
            "id": "pfsbvrybcpbmb",
            "name": "AC: Mending Monday (Test Event)",
            "time": 1604966400000i64,
            "duration": 7200000,
            "utc_offset": -18000000,
            "venue": {"name": "Online event"},
            "yes_rsvp_count": 3,
            "status": "upcoming",
            "link": "https://www.meetup.com/NOVA-Makers/events/pfsbvrybcpbmb/",
            "featured_photo": {
                "highres_link": "https://cdn.example.com/highres_491187465.jpeg"
            },
        }))
        .unwrap();
        SourceEvent::from_raw(raw)
    }

    fn processor_with(
        gateway: RecordingGateway,
        fail_download: bool,
        known: Vec<(&str, KnownEvent)>,
    ) -> EventProcessor {
        let dir = tempfile::tempdir().unwrap();
        let mut known_events = KnownEventsCache::load(&dir.path().join("events.json")).unwrap();
        for (id, entry) in known {
            known_events.insert(id.to_string(), entry);
        }
        let photo_cache = PhotoCache::new(
            "/resources/Pictures/Events".to_string(),
            PhotoUrlCache::load(&dir.path().join("photos.json")).unwrap(),
            Box::new(StubTransfer { fail_download }),
        );
        let tagger = EventTagger::new(
            HashMap::from([(
                "AC".to_string(),
                TagList::Many(vec!["arts-and-crafts".to_string(), "the-studio".to_string()]),
            )]),
            TagList::One("meetup-global-tag".to_string()),
        );
        let maker = RegistrationTypeMaker::new(vec![EventRestriction::default_rule()]);
        EventProcessor::new(
            Utc.with_ymd_and_hms(2020, 11, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 11, 1, 0, 0, 0).unwrap(),
            known_events,
            photo_cache,
            tagger,
            maker,
            Box::new(gateway),
            Reporter::silent(),
        )
    }

    #[test]
    fn events_before_the_earliest_cutoff_are_ignored() {
        let processor = processor_with(RecordingGateway::default(), false, Vec::new());
        let mut event = sample_event();
        event.start = "2020-10-09T19:00:00-05:00".parse().unwrap();
        assert!(processor.can_ignore(&event));
    }

    #[test]
    fn events_after_the_latest_cutoff_are_ignored() {
        let processor = processor_with(RecordingGateway::default(), false, Vec::new());
        let mut event = sample_event();
        event.start = "2022-10-09T19:00:00-05:00".parse().unwrap();
        assert!(processor.can_ignore(&event));
    }

    #[test]
    fn known_events_are_ignored() {
        let known = KnownEvent {
            destination_id: 4041234,
            start: Utc.with_ymd_and_hms(2020, 11, 10, 0, 0, 0).unwrap(),
        };
        let processor =
            processor_with(RecordingGateway::default(), false, vec![("pfsbvrybcpbmb", known)]);
        assert!(processor.can_ignore(&sample_event()));
    }

    #[test]
    fn in_window_unseen_events_are_not_ignored() {
        let processor = processor_with(RecordingGateway::default(), false, Vec::new());
        assert!(!processor.can_ignore(&sample_event()));
    }

    #[tokio::test]
    async fn processing_submits_event_and_both_registration_types() {
        let gateway = RecordingGateway::default();
        let mut processor = processor_with(gateway.clone(), false, Vec::new());
        processor.process(&sample_event()).await.unwrap();

        let events = gateway.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let payload = &events[0];
        assert_eq!(payload["Name"], "AC: Mending Monday (Test Event)");
        assert_eq!(payload["StartDate"], "2020-11-09T19:00:00-05:00");
        assert_eq!(payload["EndDate"], "2020-11-09T21:00:00-05:00");
        assert_eq!(payload["Location"], "Online event");
        assert_eq!(
            payload["Tags"],
            json!(["meetup-global-tag", "AC", "arts-and-crafts", "the-studio"])
        );
        let html = payload["Details"]["DescriptionHtml"].as_str().unwrap();
        assert!(html.contains("AC_Mending_Monday_Test_Event_2020-11-09.jpeg"));
        assert!(html.contains("https://www.meetup.com/NOVA-Makers/events/pfsbvrybcpbmb/"));

        let types = gateway.registration_types.lock().unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0]["Name"], "Meetup RSVP");
        assert_eq!(types[0]["MaximumRegistrantsCount"], 3);
        assert_eq!(types[1]["Name"], "RSVP");
        assert_eq!(types[1]["MaximumRegistrantsCount"], Value::Null);
        assert_eq!(types[1]["EventId"], 4041001);
    }

    #[tokio::test]
    async fn processing_records_the_event_as_known() {
        let gateway = RecordingGateway::default();
        let mut processor = processor_with(gateway, false, Vec::new());
        let event = sample_event();
        processor.process(&event).await.unwrap();
        assert!(processor.can_ignore(&event));
    }

    #[tokio::test]
    async fn reprocessing_a_known_event_submits_nothing() {
        let gateway = RecordingGateway::default();
        let mut processor = processor_with(gateway.clone(), false, Vec::new());
        let event = sample_event();
        processor.process(&event).await.unwrap();
        processor.process(&event).await.unwrap();
        assert_eq!(gateway.events.lock().unwrap().len(), 1);
        assert_eq!(gateway.registration_types.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn photo_failure_abandons_only_the_event() {
        let gateway = RecordingGateway::default();
        let mut processor = processor_with(gateway.clone(), true, Vec::new());
        let event = sample_event();
        processor.process(&event).await.unwrap();
        // No submission and no cache mutation for the failed event.
        assert!(gateway.events.lock().unwrap().is_empty());
        assert!(!processor.can_ignore(&event));
    }
}
