use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Meetup API request failed: HTTP status {status}: {body}")]
    SourceApi { status: u16, body: String },

    #[error("Wild Apricot API request failed: HTTP status {status}: {body}")]
    DestinationApi { status: u16, body: String },

    #[error("photo download from {url} failed: {reason}")]
    PhotoDownload { url: String, reason: String },

    #[error("photo upload to {path} failed: {reason}")]
    PhotoUpload { path: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event restriction pattern {pattern:?} is invalid: {message}")]
    InvalidRestrictionPattern { pattern: String, message: String },

    #[error("Event price restriction {0:?} must be \"free\", \"paid\", or omitted")]
    InvalidPriceCategory(String),

    #[error("Guest policy {0:?} must be \"count\", \"contact\", \"full\", or omitted")]
    InvalidGuestPolicy(String),

    #[error("Unknown member level name {0:?}")]
    UnknownMemberLevel(String),

    #[error("Missing environment variable {0}")]
    MissingEnvVar(String),

    #[error("Cache file {path} has an unreadable schema: {message}")]
    CacheSchema { path: String, message: String },

    #[error("no event restriction matched title {title:?}; the default rule is missing")]
    NoRestrictionMatch { title: String },
}

impl SyncError {
    /// True for failures the event processor absorbs per event instead of
    /// aborting the run.
    pub fn is_photo_error(&self) -> bool {
        matches!(
            self,
            SyncError::PhotoDownload { .. } | SyncError::PhotoUpload { .. }
        )
    }

    /// True for operator-facing startup failures reported without a backtrace.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::InvalidRestrictionPattern { .. }
                | SyncError::InvalidPriceCategory(_)
                | SyncError::InvalidGuestPolicy(_)
                | SyncError::UnknownMemberLevel(_)
                | SyncError::MissingEnvVar(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
