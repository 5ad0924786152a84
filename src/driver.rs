use crate::cache::KnownEventsCache;
use crate::error::Result;
use crate::mapping_updater::{EventLookup, EventMappingUpdater};
use crate::photo_cache::PhotoCache;
use crate::processor::EventProcessor;
use crate::registration::RegistrationTypeMaker;
use crate::report::Reporter;
use crate::source_event::SourceEvent;
use crate::tagger::EventTagger;
use chrono::{DateTime, Utc};
use tracing::info;

pub struct RunPlan {
    pub earliest_start_time: DateTime<Utc>,
    pub latest_start_time: DateTime<Utc>,
    pub skip_ids: Vec<String>,
    pub dry_run: bool,
}

/// One full synchronization pass: reconcile the known-events mapping,
/// feed every retrieved event through the processor, then checkpoint both
/// caches. A dry run leaves the cache files untouched.
#[allow(clippy::too_many_arguments)]
pub async fn run<L: EventLookup>(
    plan: RunPlan,
    events: &[SourceEvent],
    lookup: L,
    mut known_events: KnownEventsCache,
    photo_cache: PhotoCache,
    tagger: EventTagger,
    registration_maker: RegistrationTypeMaker,
    destination: Box<dyn crate::apis::destination::DestinationGateway>,
    reporter: Reporter,
) -> Result<()> {
    let mut updater = EventMappingUpdater::new(
        lookup,
        plan.earliest_start_time,
        plan.skip_ids.clone(),
    );
    let reconciled = updater.update(known_events.take_events()).await?;
    known_events.replace_events(reconciled);

    let mut processor = EventProcessor::new(
        plan.earliest_start_time,
        plan.latest_start_time,
        known_events,
        photo_cache,
        tagger,
        registration_maker,
        destination,
        reporter,
    );
    for event in events {
        processor.process(event).await?;
    }
    let (known_events, photo_cache) = processor.finish()?;

    if plan.dry_run {
        info!("dry run: cache files left untouched");
    } else {
        known_events.store()?;
        photo_cache.persist()?;
    }
    info!(known_events = known_events.len(), "run complete");
    Ok(())
}
