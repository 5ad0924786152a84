use crate::error::{Result, SyncError};
use async_trait::async_trait;
use tracing::info;

/// Body returned by the dry-run download in place of real photo bytes.
pub const DRY_RUN_PHOTO_BYTES: &[u8] = &[];

/// Moves photo bytes between the services: a GET from the source's CDN and
/// an authenticated PUT to the destination's file store. `DryRun` performs
/// neither and logs the skipped calls.
#[async_trait]
pub trait PhotoTransfer: Send {
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    async fn upload(&self, destination_path: &str, bytes: &[u8], content_type: &str)
        -> Result<()>;
}

/// Live transfer. The upload channel carries its own credentials, distinct
/// from the API session.
pub struct LivePhotoTransfer {
    client: reqwest::Client,
    upload_base_url: String,
    username: String,
    password: String,
}

impl LivePhotoTransfer {
    pub fn new(
        client: reqwest::Client,
        upload_base_url: String,
        username: String,
        password: String,
    ) -> Self {
        LivePhotoTransfer {
            client,
            upload_base_url,
            username,
            password,
        }
    }
}

#[async_trait]
impl PhotoTransfer for LivePhotoTransfer {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|err| SyncError::PhotoDownload {
                    url: url.to_string(),
                    reason: err.to_string(),
                })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::PhotoDownload {
                url: url.to_string(),
                reason: format!("HTTP status {status}"),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SyncError::PhotoDownload {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        destination_path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.upload_base_url.trim_end_matches('/'),
            destination_path.trim_start_matches('/')
        );
        let response = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|err| SyncError::PhotoUpload {
                path: destination_path.to_string(),
                reason: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::PhotoUpload {
                path: destination_path.to_string(),
                reason: format!("HTTP status {status}"),
            });
        }
        info!(path = destination_path, "uploaded photo");
        Ok(())
    }
}

/// Dry-run transfer: empty download, no upload, skipped calls logged.
pub struct DryRunPhotoTransfer;

#[async_trait]
impl PhotoTransfer for DryRunPhotoTransfer {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!(url, "dry run: skipped photo download");
        Ok(DRY_RUN_PHOTO_BYTES.to_vec())
    }

    async fn upload(
        &self,
        destination_path: &str,
        _bytes: &[u8],
        _content_type: &str,
    ) -> Result<()> {
        info!(path = destination_path, "dry run: skipped photo upload");
        Ok(())
    }
}
