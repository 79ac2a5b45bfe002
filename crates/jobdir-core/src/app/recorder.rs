//! Result Recorder - 実行結果を store に反映する
//!
//! worker slot 上で呼ばれる（dispatcher のループでは呼ばない）。
//! semaphore の permit はこの関数が所有し、どの経路で抜けても解放される。

use tokio::sync::OwnedSemaphorePermit;
use tracing::{error, info, warn};

use super::blocking;
use crate::domain::{JobId, TaskFailure};
use crate::store::FileJobStore;

/// Move a finished job to `done` or `error`.
///
/// On failure the detail goes to the error log first, then the record is
/// renamed. Store errors are logged and swallowed.
pub async fn record(
    store: &FileJobStore,
    job_id: JobId,
    outcome: Result<(), TaskFailure>,
    permit: OwnedSemaphorePermit,
) {
    let _permit = permit;

    match outcome {
        Ok(()) => match blocking(store, move |s| s.mark_done(&job_id)).await {
            Ok(()) => info!(job_id = %job_id, "job done"),
            Err(err) => error!(job_id = %job_id, error = %err, "failed to mark job done"),
        },
        Err(failure) => {
            warn!(
                job_id = %job_id,
                task = %failure.task,
                kind = ?failure.kind,
                message = %failure.message,
                "job failed"
            );
            let entry = failure.to_log_entry();
            if let Err(err) = blocking(store, move |s| s.append_error(&job_id, &entry)).await {
                warn!(job_id = %job_id, error = %err, "failed to write error log");
            }
            if let Err(err) = blocking(store, move |s| s.mark_failed(&job_id)).await {
                error!(job_id = %job_id, error = %err, "failed to mark job failed");
            }
        }
    }
}
