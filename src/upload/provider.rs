use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use super::errors::{message_from_body, Result, UploadError};
use super::types::{CreateUploadRequest, UploadTarget};

/// Issues write destinations for single objects.
///
/// Implementations enforce the upload policy; a refusal must carry a message
/// that can be shown to the user.
#[async_trait]
pub trait UploadTargetProvider: Send + Sync {
    async fn request_upload(&self, request: &CreateUploadRequest) -> Result<UploadTarget>;
}

/// Provider backed by an HTTP issuance endpoint.
///
/// Posts `{fileName, contentType, size}` as JSON and expects
/// `{key, upload: {url, fields}}` back. Error responses carry `{message}`.
#[derive(Debug, Clone)]
pub struct HttpTargetProvider {
    client: Client,
    endpoint: Url,
}

impl HttpTargetProvider {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl UploadTargetProvider for HttpTargetProvider {
    async fn request_upload(&self, request: &CreateUploadRequest) -> Result<UploadTarget> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = message_from_body(&body)
                .unwrap_or_else(|| "Unable to create upload target".to_string());
            return Err(UploadError::server_error(status.as_u16(), Some(message)));
        }

        let body = response.bytes().await?;
        let target: UploadTarget = serde_json::from_slice(&body)?;

        Ok(target)
    }
}
