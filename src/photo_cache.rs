use crate::apis::photos::PhotoTransfer;
use crate::cache::{PhotoUrlCache, NO_PHOTO};
use crate::error::Result;
use crate::source_event::SourceEvent;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Longest photo name stem before the date suffix.
const MAX_STEM_LEN: usize = 31;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^A-Za-z0-9_]").expect("non-word pattern"));
static UNDERSCORE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new("__+").expect("underscore-run pattern"));
static TRAILING_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^_]*$").expect("trailing-word pattern"));

/// What a photo resolution produced: the destination path (None for
/// photo-less events) and, when this run downloaded a new photo, its file
/// name for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPhoto {
    pub path: Option<String>,
    pub downloaded_name: Option<String>,
}

/// Maps source photo URLs to destination photo paths, transferring each
/// photo at most once across all runs.
pub struct PhotoCache {
    destination_directory: String,
    urls: PhotoUrlCache,
    transfer: Box<dyn PhotoTransfer>,
}

impl PhotoCache {
    pub fn new(
        destination_directory: String,
        urls: PhotoUrlCache,
        transfer: Box<dyn PhotoTransfer>,
    ) -> Self {
        PhotoCache {
            destination_directory,
            urls,
            transfer,
        }
    }

    /// Resolve an event's photo to its destination path, downloading and
    /// uploading on first sight only.
    pub async fn resolve(&mut self, event: &SourceEvent) -> Result<ResolvedPhoto> {
        if let Some(path) = self.urls.get(event.photo_url.as_deref()) {
            debug!(event_id = %event.id, "photo already cached");
            return Ok(ResolvedPhoto {
                path,
                downloaded_name: None,
            });
        }
        // get() misses only when a URL is present and unseen.
        let url = event.photo_url.clone().unwrap_or_else(|| NO_PHOTO.to_string());
        let file_name = self.copy_photo_to_destination(event, &url).await?;
        let path = self.destination_path(&file_name);
        self.urls.insert(url, path.clone());
        Ok(ResolvedPhoto {
            path: Some(path),
            downloaded_name: Some(file_name),
        })
    }

    pub fn persist(&self) -> Result<()> {
        self.urls.store()
    }

    async fn copy_photo_to_destination(
        &mut self,
        event: &SourceEvent,
        url: &str,
    ) -> Result<String> {
        let proposed_name = proposed_file_name(&event.title, event.start.date_naive(), url);
        let bytes = self.transfer.download(url).await?;
        let file_name = correct_extension(&proposed_name, &bytes);
        let content_type = content_type_for(&file_name);
        let path = self.destination_path(&file_name);
        self.transfer.upload(&path, &bytes, &content_type).await?;
        Ok(file_name)
    }

    fn destination_path(&self, file_name: &str) -> String {
        format!(
            "{}/{}",
            self.destination_directory.trim_end_matches('/'),
            file_name
        )
    }
}

/// Deterministic destination photo name for an event title and start date:
/// non-word characters become underscores, runs collapse, the stem is cut
/// to 31 characters at an underscore boundary, and the ISO date follows.
pub fn photo_name(title: &str, date: NaiveDate) -> String {
    let suffixed = format!("{title}_");
    let underscored = NON_WORD.replace_all(&suffixed, "_");
    let tightened = UNDERSCORE_RUNS.replace_all(&underscored, "_");
    let clipped: String = tightened.chars().take(MAX_STEM_LEN).collect();
    let stem = TRAILING_WORD.replace(&clipped, "");
    format!("{}{}", stem, date.format("%Y-%m-%d"))
}

fn proposed_file_name(title: &str, date: NaiveDate, url: &str) -> String {
    format!("{}{}", photo_name(title, date), url_extension(url))
}

/// The extension of a URL's path component, dot included, or empty.
fn url_extension(url: &str) -> String {
    let path = url
        .split_once("//")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    match path.rsplit('/').next().and_then(|name| name.rsplit_once('.')) {
        Some((_, ext)) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

/// Replace the filename extension with the one matching the downloaded
/// bytes' magic numbers. Unrecognized content keeps the proposed name.
fn correct_extension(file_name: &str, bytes: &[u8]) -> String {
    let Some(detected) = image_extension(bytes) else {
        return file_name.to_string();
    };
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    format!("{stem}.{detected}")
}

/// Image type sniffing over leading magic bytes, covering the formats the
/// source CDN serves.
fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else {
        None
    }
}

fn content_type_for(file_name: &str) -> String {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    format!("image/{extension}")
}
