use apricot_sync::apis::destination::{
    start_session, DestinationApi, DestinationGateway, DryRunDestination,
};
use apricot_sync::apis::photos::{DryRunPhotoTransfer, LivePhotoTransfer, PhotoTransfer};
use apricot_sync::apis::source::SourceApi;
use apricot_sync::cache::{KnownEventsCache, PhotoUrlCache};
use apricot_sync::config::{Config, Secrets};
use apricot_sync::driver::{run, RunPlan};
use apricot_sync::error::Result;
use apricot_sync::logging::init_logging;
use apricot_sync::mapping_updater::EventRetriever;
use apricot_sync::photo_cache::PhotoCache;
use apricot_sync::registration::RegistrationTypeMaker;
use apricot_sync::report::Reporter;
use apricot_sync::restrictions::{EventRestrictionLoader, MemberLevelDirectory};
use apricot_sync::source_event::SourceEvent;
use apricot_sync::tagger::EventTagger;
use apricot_sync::throttle::Throttle;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "apricot_sync")]
#[command(about = "Meetup to Wild Apricot event synchronizer")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log planned changes without contacting the destination
    #[arg(long)]
    dryrun: bool,

    /// Print a report of added events to standard output
    #[arg(long)]
    report: bool,

    /// Additional event ids to mark as skipped (repeatable)
    #[arg(long)]
    skip: Vec<String>,

    /// Enable debug-level logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = sync(&cli).await {
        if e.is_config_error() {
            // Configuration mistakes get a plain message, not a trace.
            eprintln!("{e}");
        } else {
            error!("synchronization failed: {e}");
            eprintln!("Synchronization failed: {e}");
        }
        std::process::exit(1);
    }
}

async fn sync(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let secrets = Secrets::from_env()?;
    let client = reqwest::Client::new();

    let access_token = start_session(&client, &secrets.destination_api_key).await?;
    let destination_throttle = Throttle::sliding(
        config.destination.requests_per_window,
        config.destination.window_seconds,
    );
    let mut destination = DestinationApi::new(
        client.clone(),
        secrets.destination_account_id.clone(),
        access_token,
        destination_throttle,
    );

    let levels = MemberLevelDirectory::from_api_json(&destination.get_membership_levels().await?);
    let restrictions = EventRestrictionLoader::new(&levels).load(&config.restrictions)?;
    let registration_maker = RegistrationTypeMaker::new(restrictions);
    let tagger = EventTagger::new(config.tags.codes, config.tags.all_events);

    let mut source = SourceApi::new(
        client.clone(),
        config.source.group_url_name.clone(),
        config.source.events_wanted,
        Throttle::open(),
    );
    let calibrated = source.make_calibrated_throttle().await?;
    source.set_throttle(calibrated);

    let events: Vec<SourceEvent> = source
        .retrieve_events()
        .await?
        .into_iter()
        .map(SourceEvent::from_raw)
        .filter(|event| !event.is_cancelled())
        .collect();
    info!(count = events.len(), "retrieved upcoming events");

    let known_events = KnownEventsCache::load(&config.cache.known_events_path)?;
    let photo_urls = PhotoUrlCache::load(&config.cache.photo_urls_path)?;

    let transfer: Box<dyn PhotoTransfer> = if cli.dryrun {
        Box::new(DryRunPhotoTransfer)
    } else {
        Box::new(LivePhotoTransfer::new(
            client.clone(),
            config.photos.upload_base_url.clone(),
            secrets.photo_username.clone(),
            secrets.photo_password.clone(),
        ))
    };
    let photo_cache = PhotoCache::new(config.photos.directory.clone(), photo_urls, transfer);

    let gateway: Box<dyn DestinationGateway> = if cli.dryrun {
        info!("dry run: no events will be added");
        Box::new(DryRunDestination)
    } else {
        Box::new(destination)
    };

    let reporter = if cli.report {
        Reporter::new(Box::new(std::io::stdout()))
    } else {
        Reporter::silent()
    };

    let mut skip_ids = config.source.skip_event_ids.clone();
    skip_ids.extend(cli.skip.iter().cloned());
    let plan = RunPlan {
        earliest_start_time: config.source.earliest_start_time,
        latest_start_time: config.source.latest_start_time,
        skip_ids,
        dry_run: cli.dryrun,
    };

    let lookup = EventRetriever::new(&mut source, &events);
    run(
        plan,
        &events,
        lookup,
        known_events,
        photo_cache,
        tagger,
        registration_maker,
        gateway,
        reporter,
    )
    .await
}
