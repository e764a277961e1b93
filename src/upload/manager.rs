use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;
use super::callbacks::{EventEmitter, UploadCallbacks};
use super::errors::{Result, UploadError};
use super::file::UploadFile;
use super::manager_worker::UploadManagerWorker;
use super::provider::UploadTargetProvider;
use super::transport::Transport;
use super::types::{
    ManagerCommand, ManagerConfig, QueueStats, Submission, UploadEvent, UploadId, UploadProgress,
};
use super::validation::{validate_files, ValidationPolicy};
use super::worker::UploadWorker;

/// Cheap, cloneable handle to a running upload manager.
#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    emitter: EventEmitter,
    validation: ValidationPolicy,
}

/// Upload manager plus the join handle of its worker task.
pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    /// Stop accepting work and wait for every accepted task to settle.
    ///
    /// Other clones of the manager keep the worker alive until they are dropped.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| UploadError::internal_error(format!("Worker panic: {}", err)))
    }
}

pub struct UploadManagerBuilder {
    provider: Arc<dyn UploadTargetProvider>,
    transport: Arc<dyn Transport>,
    config: ManagerConfig,
    callbacks: UploadCallbacks,
}

impl UploadManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.config.max_parallel = max_parallel;
        self
    }

    pub fn transfer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.transfer_timeout = timeout;
        self
    }

    pub fn validation(mut self, validation: ValidationPolicy) -> Self {
        self.config.validation = validation;
        self
    }

    pub fn callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Spawn the worker task. Must be called inside a tokio runtime.
    pub fn build(self) -> UploadManagerHandle {
        let mut config = self.config;
        if config.max_parallel == 0 {
            warn!("max_parallel must be at least 1, using 1");
            config.max_parallel = 1;
        }

        let (command_tx, command_rx) = mpsc::channel(100);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new(self.callbacks, config.event_capacity);

        let worker = UploadWorker {
            provider: self.provider,
            transport: self.transport,
            transfer_timeout: config.transfer_timeout,
            report_tx,
        };

        let manager_worker = UploadManagerWorker::new(&config, worker, emitter.clone(), report_rx);
        let worker_handle = tokio::spawn(manager_worker.run(command_rx));

        let manager = UploadManager {
            command_tx,
            emitter,
            validation: config.validation,
        };

        UploadManagerHandle {
            manager,
            worker_handle,
        }
    }
}

impl UploadManager {
    pub fn builder(provider: Arc<dyn UploadTargetProvider>, transport: Arc<dyn Transport>) -> UploadManagerBuilder {
        UploadManagerBuilder {
            provider,
            transport,
            config: ManagerConfig::default(),
            callbacks: UploadCallbacks::default(),
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)
    }

    /// Queue one task per file, in order, and start as many as capacity allows.
    ///
    /// No validation happens here; see [`UploadManager::submit`].
    pub async fn enqueue(&self, files: Vec<UploadFile>) -> Result<Vec<UploadId>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        self.request(|reply| ManagerCommand::Enqueue { files, reply }).await
    }

    /// Entry point for a raw selection: validate, report rejections, enqueue the rest.
    pub async fn submit(&self, files: Vec<UploadFile>) -> Result<Submission> {
        let mut rejected = Vec::new();
        let accepted = validate_files(files, &self.validation, |rejection| {
            self.emitter.rejected(rejection.clone());
            rejected.push(rejection);
        });

        let accepted = self.enqueue(accepted).await?;

        Ok(Submission { accepted, rejected })
    }

    pub async fn progress(&self, upload_id: UploadId) -> Result<Option<UploadProgress>> {
        self.request(|reply| ManagerCommand::GetProgress { upload_id, reply }).await
    }

    /// Snapshots of every known task, in enqueue order.
    pub async fn all_progress(&self) -> Result<Vec<UploadProgress>> {
        self.request(|reply| ManagerCommand::GetAllProgress { reply }).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.request(|reply| ManagerCommand::Stats { reply }).await
    }

    /// Bytes behind a preview url, while its task has not settled.
    pub async fn resolve_preview(&self, url: &str) -> Result<Option<Bytes>> {
        let url = url.to_string();
        self.request(|reply| ManagerCommand::ResolvePreview { url, reply }).await
    }

    /// Drop snapshots of settled tasks, returning how many were removed.
    pub async fn clear_settled(&self) -> Result<usize> {
        self.request(|reply| ManagerCommand::ClearSettled { reply }).await
    }

    /// Wait until every task in `ids` has settled and return their final snapshots.
    ///
    /// Unlike counting terminal events on a subscription, this cannot miss a
    /// settle when a subscriber lags. Unknown ids are skipped.
    pub async fn wait_settled(&self, ids: &[UploadId]) -> Result<Vec<UploadProgress>> {
        let ids = ids.to_vec();
        self.request(|reply| ManagerCommand::WaitSettled { ids, reply }).await
    }

    /// Subscribe to every notification.
    ///
    /// A subscriber that falls behind by more than the configured capacity
    /// gets `RecvError::Lagged` and misses the overwritten events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.emitter.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&UploadEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.emitter.subscribe(),
            filter,
        }
    }
}

pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
