use std::collections::BTreeMap;
use std::time::Duration;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::file::UploadFile;
use super::validation::ValidationPolicy;

/// Default number of uploads allowed in flight at once.
pub const DEFAULT_PARALLEL_UPLOADS: usize = 3;

/// Default ceiling for a single transfer.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Waiting in the backlog
    Idle,
    /// Dispatched, target requested or transfer running
    Uploading,
    /// Object written
    Success,
    /// Settled with a failure
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }

    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;

        matches!(
            (self, next),
            (Idle, Uploading) | (Uploading, Uploading) | (Uploading, Success) | (Uploading, Error)
        )
    }
}

/// One file's journey from enqueue to terminal state.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: UploadId,
    pub file: UploadFile,
}

impl UploadTask {
    pub fn new(file: UploadFile) -> Self {
        Self {
            id: UploadId::new(),
            file,
        }
    }
}

/// Snapshot of a task's progress, as delivered to `on_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub id: UploadId,
    pub file_name: String,
    pub size: u64,
    pub status: UploadStatus,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadProgress {
    pub(crate) fn idle(task: &UploadTask) -> Self {
        Self {
            id: task.id,
            file_name: task.file.name().to_string(),
            size: task.file.size(),
            status: UploadStatus::Idle,
            percent: 0.0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreview {
    pub id: UploadId,
    pub url: String,
    pub name: String,
}

/// Payload sent to the upload target provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

impl CreateUploadRequest {
    pub fn for_file(file: &UploadFile) -> Self {
        Self {
            file_name: file.name().to_string(),
            content_type: file.content_type().to_string(),
            size: file.size(),
        }
    }
}

/// Where and how to write one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(rename = "url")]
    pub endpoint: String,
    #[serde(rename = "fields", default)]
    pub required_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    #[serde(rename = "key")]
    pub object_key: String,
    #[serde(rename = "upload")]
    pub destination: Destination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleted {
    pub id: UploadId,
    pub object_key: String,
}

/// A file turned away by the validation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

/// Result of handing a raw selection to the manager.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub accepted: Vec<UploadId>,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks waiting for a free slot
    pub queued: usize,
    /// Tasks currently in flight
    pub active: usize,
    pub max_parallel: usize,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A preview was issued for a newly enqueued task
    Preview(PendingPreview),

    /// Progress or status change of a task
    Progress(UploadProgress),

    /// Task written to the object store
    Completed(UploadCompleted),

    /// File refused before it became a task
    Rejected(Rejection),
}

impl UploadEvent {
    pub fn upload_id(&self) -> Option<UploadId> {
        match self {
            UploadEvent::Preview(preview) => Some(preview.id),
            UploadEvent::Progress(progress) => Some(progress.id),
            UploadEvent::Completed(completed) => Some(completed.id),
            UploadEvent::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum uploads in flight
    pub max_parallel: usize,

    /// Deadline for a single transfer, `None` defers to the transport
    pub transfer_timeout: Option<Duration>,

    /// Pre-admission checks applied by `submit`
    pub validation: ValidationPolicy,

    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_PARALLEL_UPLOADS,
            transfer_timeout: Some(DEFAULT_TRANSFER_TIMEOUT),
            validation: ValidationPolicy::default(),
            event_capacity: 256,
        }
    }
}

pub(crate) enum ManagerCommand {
    Enqueue {
        files: Vec<UploadFile>,
        reply: oneshot::Sender<Vec<UploadId>>,
    },

    GetProgress {
        upload_id: UploadId,
        reply: oneshot::Sender<Option<UploadProgress>>,
    },

    GetAllProgress {
        reply: oneshot::Sender<Vec<UploadProgress>>,
    },

    Stats {
        reply: oneshot::Sender<QueueStats>,
    },

    ResolvePreview {
        url: String,
        reply: oneshot::Sender<Option<Bytes>>,
    },

    /// Forget progress snapshots of settled tasks
    ClearSettled {
        reply: oneshot::Sender<usize>,
    },

    /// Reply once every listed task has settled
    WaitSettled {
        ids: Vec<UploadId>,
        reply: oneshot::Sender<Vec<UploadProgress>>,
    },
}

const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadTask>();
        assert_send::<UploadEvent>();
        assert_send::<ManagerCommand>();
    }
};
