use std::io::Cursor;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use super::errors::{message_from_body, Result, UploadError};
use super::file::UploadFile;
use super::progress::ProgressSender;
use super::progress_stream::ProgressStream;
use super::types::Destination;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Performs the object-store write for one task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `file` to `destination`, reporting byte progress on `progress`.
    async fn send(&self, destination: &Destination, file: &UploadFile, progress: ProgressSender) -> Result<()>;
}

/// Multipart POST of the required fields followed by the `file` part.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Granularity of progress ticks.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn build_form(&self, destination: &Destination, file: &UploadFile, progress: ProgressSender) -> Result<Form> {
        let total = file.size();
        let reader = ReaderStream::with_capacity(Cursor::new(file.data().clone()), self.chunk_size);
        let body = Body::wrap_stream(ProgressStream::new(reader, Some(total), progress));

        let part = Part::stream_with_length(body, total)
            .file_name(file.name().to_string())
            .mime_str(file.content_type())?;

        // Object stores ignore every field after `file`
        let form = destination
            .required_fields
            .iter()
            .fold(Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()))
            .part("file", part);

        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, destination: &Destination, file: &UploadFile, progress: ProgressSender) -> Result<()> {
        let form = self.build_form(destination, file, progress)?;

        let response = self
            .client
            .post(&destination.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::server_error(status.as_u16(), message_from_body(&body)));
        }

        Ok(())
    }
}
