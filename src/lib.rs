pub mod apis;
pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod mapping_updater;
pub mod photo_cache;
pub mod processor;
pub mod registration;
pub mod report;
pub mod restrictions;
pub mod source_event;
pub mod tagger;
pub mod throttle;
