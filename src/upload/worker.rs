use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use super::errors::{Result, UploadError};
use super::progress::{ProgressSender, TransferTick};
use super::provider::UploadTargetProvider;
use super::transport::Transport;
use super::types::{CreateUploadRequest, UploadId, UploadTask};

/// Messages an executor sends back to the manager worker.
#[derive(Debug)]
pub(crate) enum WorkerReport {
    Progress {
        upload_id: UploadId,
        tick: TransferTick,
    },

    /// Terminal outcome, the object key on success
    Settled {
        upload_id: UploadId,
        outcome: Result<String>,
    },
}

/// Drives one task from target issuance to the end of the transfer.
#[derive(Clone)]
pub(crate) struct UploadWorker {
    pub(crate) provider: Arc<dyn UploadTargetProvider>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) transfer_timeout: Option<Duration>,
    pub(crate) report_tx: mpsc::UnboundedSender<WorkerReport>,
}

impl UploadWorker {
    /// Run `task` and always report exactly one `Settled`, even if the
    /// upload future panics.
    pub(crate) async fn run(self, task: UploadTask) {
        let upload_id = task.id;
        let report_tx = self.report_tx.clone();

        let outcome = match tokio::spawn(self.execute(task)).await {
            Ok(outcome) => outcome,
            Err(err) => Err(UploadError::internal_error(format!("Upload task panicked: {}", err))),
        };

        let _ = report_tx.send(WorkerReport::Settled { upload_id, outcome });
    }

    async fn execute(self, task: UploadTask) -> Result<String> {
        let request = CreateUploadRequest::for_file(&task.file);
        let target = self.provider.request_upload(&request).await?;
        debug!(upload_id = %task.id, object_key = %target.object_key, "Upload target issued");

        let progress = ProgressSender::new(task.id, self.report_tx.clone());
        let transfer = self.transport.send(&target.destination, &task.file, progress);

        match self.transfer_timeout {
            Some(limit) => tokio::time::timeout(limit, transfer)
                .await
                .map_err(|_| UploadError::Timeout(limit))??,
            None => transfer.await?,
        }

        Ok(target.object_key)
    }
}
