use tokio::sync::mpsc;
use super::types::UploadId;
use super::worker::WorkerReport;

/// Byte count reported by a transport while a transfer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTick {
    pub loaded: u64,
    /// Total bytes of the request, when the transport knows it
    pub total: Option<u64>,
}

/// Handed to a [`Transport`](super::transport::Transport) for one transfer.
///
/// Ticks land on the manager worker's queue in the order they are reported.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    upload_id: UploadId,
    report_tx: mpsc::UnboundedSender<WorkerReport>,
}

impl ProgressSender {
    pub(crate) fn new(upload_id: UploadId, report_tx: mpsc::UnboundedSender<WorkerReport>) -> Self {
        Self {
            upload_id,
            report_tx,
        }
    }

    pub fn report(&self, loaded: u64, total: Option<u64>) {
        let _ = self.report_tx.send(WorkerReport::Progress {
            upload_id: self.upload_id,
            tick: TransferTick { loaded, total },
        });
    }
}

/// Percent of a transfer, clamped to `[0, 100]`.
///
/// Without a usable total the known file size stands in for it.
pub fn compute_percent(tick: TransferTick, file_size: u64) -> f64 {
    let percent = match tick.total {
        Some(total) if total > 0 => (tick.loaded as f64 * 100.0) / total as f64,
        _ if file_size > 0 => (tick.loaded as f64 / file_size as f64).min(1.0) * 100.0,
        _ => 0.0,
    };

    percent.clamp(0.0, 100.0)
}
