use std::collections::HashMap;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;
use super::types::{PendingPreview, UploadId, UploadTask};

const PREVIEW_SCHEME: &str = "blob:media-vault/";

struct PreviewEntry {
    url: String,
    data: Bytes,
}

/// Memory-only previews of files that have not settled yet.
///
/// Owned by the manager worker; inserted on enqueue, removed on settle.
#[derive(Default)]
pub struct PreviewRegistry {
    previews: HashMap<UploadId, PreviewEntry>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, task: &UploadTask) -> PendingPreview {
        let url = format!("{}{}", PREVIEW_SCHEME, Uuid::new_v4());
        let entry = PreviewEntry {
            url: url.clone(),
            data: task.file.data().clone(),
        };

        if let Some(previous) = self.previews.insert(task.id, entry) {
            warn!(upload_id = %task.id, url = %previous.url, "Replaced a live preview");
        }

        PendingPreview {
            id: task.id,
            url,
            name: task.file.name().to_string(),
        }
    }

    /// Revoke the preview of `upload_id`. Returns `false` if there was none.
    pub fn release(&mut self, upload_id: UploadId) -> bool {
        match self.previews.remove(&upload_id) {
            Some(_) => true,
            None => {
                warn!(%upload_id, "Preview already released");
                false
            }
        }
    }

    /// Bytes behind a live preview url.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        self.previews
            .values()
            .find(|entry| entry.url == url)
            .map(|entry| entry.data.clone())
    }

    pub fn contains(&self, upload_id: UploadId) -> bool {
        self.previews.contains_key(&upload_id)
    }

    pub fn len(&self) -> usize {
        self.previews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }
}
