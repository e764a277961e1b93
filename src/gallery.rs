//! Client for the listing/deletion service behind the gallery.
//!
//! The upload manager never calls this; hosts refresh the gallery after a
//! completion notification.

use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;
use crate::upload::{message_from_body, Result, UploadError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    files: Vec<MediaFile>,
}

#[derive(Deserialize)]
struct DeleteResponse {
    deleted: String,
}

#[derive(Debug, Clone)]
pub struct GalleryClient {
    client: Client,
    endpoint: Url,
}

impl GalleryClient {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }

    pub async fn list(&self) -> Result<Vec<MediaFile>> {
        let response = self.client.get(self.endpoint.clone()).send().await?;
        let response = Self::check(response, "Failed to load files").await?;

        let body = response.bytes().await?;
        let list: ListResponse = serde_json::from_slice(&body)?;

        Ok(list.files)
    }

    /// Delete one object, returning the key the service acknowledged.
    pub async fn delete(&self, key: &str) -> Result<String> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", key);

        let response = self.client.delete(url).send().await?;
        let response = Self::check(response, "Failed to delete file").await?;

        let body = response.bytes().await?;
        let deleted: DeleteResponse = serde_json::from_slice(&body)?;

        Ok(deleted.deleted)
    }

    async fn check(response: Response, fallback: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = message_from_body(&body).unwrap_or_else(|| fallback.to_string());
        Err(UploadError::server_error(status.as_u16(), Some(message)))
    }
}
