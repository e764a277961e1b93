use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use super::callbacks::EventEmitter;
use super::errors::Result;
use super::file::UploadFile;
use super::preview::PreviewRegistry;
use super::progress::{compute_percent, TransferTick};
use super::types::{
    ManagerCommand, ManagerConfig, QueueStats, UploadCompleted, UploadId, UploadProgress,
    UploadStatus, UploadTask,
};
use super::worker::{UploadWorker, WorkerReport};

/// Caller parked until a set of tasks settles.
struct SettleWaiter {
    ids: Vec<UploadId>,
    pending: HashSet<UploadId>,
    reply: oneshot::Sender<Vec<UploadProgress>>,
}

/// Single owner of the backlog, the active set, the previews and the
/// progress snapshots. Commands and executor reports are handled one at a
/// time, so admission never races with settlement.
pub(crate) struct UploadManagerWorker {
    max_parallel: usize,
    worker: UploadWorker,
    emitter: EventEmitter,
    previews: PreviewRegistry,
    backlog: VecDeque<UploadTask>,
    active: HashSet<UploadId>,
    progress: HashMap<UploadId, UploadProgress>,
    order: Vec<UploadId>,
    waiters: Vec<SettleWaiter>,
    report_rx: mpsc::UnboundedReceiver<WorkerReport>,
}

impl UploadManagerWorker {
    pub(crate) fn new(
        config: &ManagerConfig,
        worker: UploadWorker,
        emitter: EventEmitter,
        report_rx: mpsc::UnboundedReceiver<WorkerReport>,
    ) -> Self {
        Self {
            max_parallel: config.max_parallel.max(1),
            worker,
            emitter,
            previews: PreviewRegistry::new(),
            backlog: VecDeque::new(),
            active: HashSet::new(),
            progress: HashMap::new(),
            order: Vec::new(),
            waiters: Vec::new(),
            report_rx,
        }
    }

    /// Main loop. Returns once every handle is dropped and all accepted
    /// tasks have settled.
    pub(crate) async fn run(mut self, mut command_rx: mpsc::Receiver<ManagerCommand>) {
        let mut accepting = true;

        loop {
            if !accepting && self.is_idle() {
                break;
            }

            tokio::select! {
                command = command_rx.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(queued = self.backlog.len(), active = self.active.len(), "Command channel closed, draining");
                        accepting = false;
                    }
                },
                Some(report) = self.report_rx.recv() => {
                    self.handle_report(report);
                }
            }
        }

        debug!("Upload manager worker stopped");
    }

    fn is_idle(&self) -> bool {
        self.backlog.is_empty() && self.active.is_empty()
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Enqueue { files, reply } => {
                let ids = self.enqueue(files);
                let _ = reply.send(ids);
            }
            ManagerCommand::GetProgress { upload_id, reply } => {
                let _ = reply.send(self.progress.get(&upload_id).cloned());
            }
            ManagerCommand::GetAllProgress { reply } => {
                let _ = reply.send(self.snapshots(&self.order));
            }
            ManagerCommand::Stats { reply } => {
                let _ = reply.send(QueueStats {
                    queued: self.backlog.len(),
                    active: self.active.len(),
                    max_parallel: self.max_parallel,
                });
            }
            ManagerCommand::ResolvePreview { url, reply } => {
                let _ = reply.send(self.previews.resolve(&url));
            }
            ManagerCommand::ClearSettled { reply } => {
                let _ = reply.send(self.clear_settled());
            }
            ManagerCommand::WaitSettled { ids, reply } => self.wait_settled(ids, reply),
        }
    }

    fn snapshots(&self, ids: &[UploadId]) -> Vec<UploadProgress> {
        ids.iter().filter_map(|id| self.progress.get(id).cloned()).collect()
    }

    /// Unknown ids and tasks that already settled do not hold the reply back.
    fn wait_settled(&mut self, ids: Vec<UploadId>, reply: oneshot::Sender<Vec<UploadProgress>>) {
        let pending: HashSet<UploadId> = ids
            .iter()
            .filter(|id| self.progress.get(*id).is_some_and(|p| !p.status.is_terminal()))
            .copied()
            .collect();

        if pending.is_empty() {
            let _ = reply.send(self.snapshots(&ids));
        } else {
            self.waiters.push(SettleWaiter { ids, pending, reply });
        }
    }

    fn notify_waiters(&mut self, upload_id: UploadId) {
        for mut waiter in std::mem::take(&mut self.waiters) {
            waiter.pending.remove(&upload_id);
            if waiter.pending.is_empty() {
                let _ = waiter.reply.send(self.snapshots(&waiter.ids));
            } else {
                self.waiters.push(waiter);
            }
        }
    }

    fn enqueue(&mut self, files: Vec<UploadFile>) -> Vec<UploadId> {
        let mut ids = Vec::with_capacity(files.len());

        for file in files {
            let task = UploadTask::new(file);
            let preview = self.previews.create(&task);
            self.emitter.preview(preview);

            let progress = UploadProgress::idle(&task);
            self.progress.insert(task.id, progress.clone());
            self.order.push(task.id);
            self.emitter.progress(progress);

            debug!(upload_id = %task.id, file_name = task.file.name(), "Task enqueued");
            ids.push(task.id);
            self.backlog.push_back(task);
        }

        self.process_queue();
        ids
    }

    /// Admit backlog tasks in FIFO order while there is a free slot.
    fn process_queue(&mut self) {
        while self.active.len() < self.max_parallel {
            match self.backlog.pop_front() {
                Some(task) => self.start_upload(task),
                None => break,
            }
        }
    }

    fn start_upload(&mut self, task: UploadTask) {
        let upload_id = task.id;
        self.active.insert(upload_id);

        if let Some(progress) = self.transition(upload_id, UploadStatus::Uploading) {
            progress.percent = 0.0;
            let progress = progress.clone();
            self.emitter.progress(progress);
        }

        debug!(%upload_id, active = self.active.len(), queued = self.backlog.len(), "Upload dispatched");
        tokio::spawn(self.worker.clone().run(task));
    }

    fn handle_report(&mut self, report: WorkerReport) {
        match report {
            WorkerReport::Progress { upload_id, tick } => self.handle_progress(upload_id, tick),
            WorkerReport::Settled { upload_id, outcome } => self.handle_settled(upload_id, outcome),
        }
    }

    fn handle_progress(&mut self, upload_id: UploadId, tick: TransferTick) {
        if !self.active.contains(&upload_id) {
            debug!(%upload_id, "Dropping progress for a task that is not in flight");
            return;
        }

        let Some(progress) = self.progress.get_mut(&upload_id) else {
            return;
        };

        let percent = compute_percent(tick, progress.size);
        if percent <= progress.percent {
            return;
        }

        progress.percent = percent;
        let progress = progress.clone();
        self.emitter.progress(progress);
    }

    fn handle_settled(&mut self, upload_id: UploadId, outcome: Result<String>) {
        if !self.active.remove(&upload_id) {
            warn!(%upload_id, "Settle reported for a task that is not in flight");
            return;
        }

        // Revoke before the terminal event goes out
        self.previews.release(upload_id);

        match outcome {
            Ok(object_key) => {
                if let Some(progress) = self.transition(upload_id, UploadStatus::Success) {
                    progress.percent = 100.0;
                    let progress = progress.clone();
                    self.emitter.progress(progress);
                }

                info!(%upload_id, %object_key, "Upload succeeded");
                self.emitter.completed(UploadCompleted { id: upload_id, object_key });
            }
            Err(err) => {
                let message = err.describe();
                warn!(%upload_id, error = %message, "Upload failed");

                if let Some(progress) = self.transition(upload_id, UploadStatus::Error) {
                    progress.error = Some(message);
                    let progress = progress.clone();
                    self.emitter.progress(progress);
                }
            }
        }

        self.notify_waiters(upload_id);
        self.process_queue();
    }

    /// Move a snapshot to `next`, refusing transitions out of a terminal state.
    fn transition(&mut self, upload_id: UploadId, next: UploadStatus) -> Option<&mut UploadProgress> {
        let progress = self.progress.get_mut(&upload_id)?;

        if !progress.status.can_transition_to(next) {
            warn!(%upload_id, from = ?progress.status, to = ?next, "Rejected status transition");
            return None;
        }

        progress.status = next;
        Some(progress)
    }

    fn clear_settled(&mut self) -> usize {
        let before = self.progress.len();
        self.progress.retain(|_, progress| !progress.status.is_terminal());
        let progress = &self.progress;
        self.order.retain(|id| progress.contains_key(id));
        before - self.progress.len()
    }
}
