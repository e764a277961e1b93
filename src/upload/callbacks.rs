use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use super::types::{PendingPreview, Rejection, UploadCompleted, UploadEvent, UploadProgress};

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Optional notification hooks for the host application.
///
/// Handlers run on the manager's worker task and should return quickly.
/// A panicking handler is logged and skipped; the event is still broadcast.
#[derive(Default)]
pub struct UploadCallbacks {
    on_preview: Option<Handler<PendingPreview>>,
    on_progress: Option<Handler<UploadProgress>>,
    on_complete: Option<Handler<UploadCompleted>>,
    on_rejected: Option<Handler<Rejection>>,
}

impl UploadCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_preview<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PendingPreview) + Send + Sync + 'static,
    {
        self.on_preview = Some(Box::new(handler));
        self
    }

    pub fn on_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(&UploadProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(handler));
        self
    }

    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&UploadCompleted) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(handler));
        self
    }

    pub fn on_rejected<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Rejection) + Send + Sync + 'static,
    {
        self.on_rejected = Some(Box::new(handler));
        self
    }
}

impl std::fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_preview", &self.on_preview.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

/// Fans every notification out to the callbacks and to broadcast subscribers.
#[derive(Clone)]
pub(crate) struct EventEmitter {
    callbacks: Arc<UploadCallbacks>,
    event_tx: broadcast::Sender<UploadEvent>,
}

impl EventEmitter {
    pub(crate) fn new(callbacks: UploadCallbacks, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            callbacks: Arc::new(callbacks),
            event_tx,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn preview(&self, preview: PendingPreview) {
        invoke("on_preview", &self.callbacks.on_preview, &preview);
        self.broadcast(UploadEvent::Preview(preview));
    }

    pub(crate) fn progress(&self, progress: UploadProgress) {
        invoke("on_progress", &self.callbacks.on_progress, &progress);
        self.broadcast(UploadEvent::Progress(progress));
    }

    pub(crate) fn completed(&self, completed: UploadCompleted) {
        invoke("on_complete", &self.callbacks.on_complete, &completed);
        self.broadcast(UploadEvent::Completed(completed));
    }

    pub(crate) fn rejected(&self, rejection: Rejection) {
        invoke("on_rejected", &self.callbacks.on_rejected, &rejection);
        self.broadcast(UploadEvent::Rejected(rejection));
    }

    fn broadcast(&self, event: UploadEvent) {
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }
}

fn invoke<T>(name: &'static str, handler: &Option<Handler<T>>, value: &T) {
    if let Some(handler) = handler {
        if panic::catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
            warn!(callback = name, "Upload callback panicked");
        }
    }
}
