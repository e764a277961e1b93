pub mod config;
pub mod gallery;
pub mod upload;
pub mod utils;

pub use upload::{
    HttpTargetProvider,
    HttpTransport,
    ProgressSender,
    Result,
    Transport,
    UploadCallbacks,
    UploadError,
    UploadFile,
    UploadManager,
    UploadManagerHandle,
    UploadTargetProvider,
};

pub use upload::types::{
    Destination,
    PendingPreview,
    Rejection,
    UploadCompleted,
    UploadEvent,
    UploadId,
    UploadProgress,
    UploadStatus,
    UploadTarget,
};
