mod callbacks;
mod errors;
mod file;
mod manager;
mod manager_worker;
mod preview;
mod progress;
mod progress_stream;
mod provider;
mod transport;
mod worker;
pub mod types;
pub mod validation;

pub use callbacks::UploadCallbacks;
pub use errors::{message_from_body, Result, UploadError, FALLBACK_MESSAGE};
pub use file::UploadFile;
pub use manager::{FilteredEventReceiver, UploadManager, UploadManagerBuilder, UploadManagerHandle};
pub use preview::PreviewRegistry;
pub use progress::{compute_percent, ProgressSender, TransferTick};
pub use progress_stream::ProgressStream;
pub use provider::{HttpTargetProvider, UploadTargetProvider};
pub use transport::{HttpTransport, Transport, DEFAULT_CHUNK_SIZE};
