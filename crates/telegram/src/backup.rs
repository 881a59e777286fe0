//! Bulk replication of an id range between channels.
//!
//! A backup walks a closed, ascending range of message ids and copies each
//! one from the source channel to the target. Sparse ranges are normal: a
//! missing message is a counted failure, not an abort. The job runs as its
//! own task so an hours-long range never starves the dispatch loop.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::transport::Transport;

/// One bulk-replication invocation. Lives in memory only: a crash mid-job
/// loses progress and the job must be restarted with a new range.
#[derive(Debug, Clone)]
pub struct BackupJob {
    /// Chat that receives the start and completion notifications.
    pub requester_chat: i64,
    pub target_chat: i64,
    pub source_chat: i64,
    pub start_id: i32,
    pub end_id: i32,
    /// Hard-floor pause after every copy attempt, success or failure.
    pub delay: Duration,
}

/// Final tally of a backup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub succeeded: u32,
    pub failed: u32,
}

impl BackupReport {
    #[must_use]
    pub fn total(self) -> u32 {
        self.succeeded + self.failed
    }
}

impl BackupJob {
    /// Detach the job onto the runtime.
    ///
    /// Deliberately returns nothing: there is no cancellation handle for an
    /// in-flight backup. The only way to stop one early is to terminate the
    /// process, losing the (unpersisted) progress.
    pub fn spawn(self, transport: Arc<dyn Transport>) {
        tokio::spawn(async move {
            self.run(transport.as_ref()).await;
        });
    }

    /// Run the loop to completion and report the tally to the requester.
    ///
    /// Invariant: `succeeded + failed == end_id - start_id + 1`. No per-item
    /// error escapes the loop; an unreachable source or target just shows up
    /// as failures on every id.
    pub async fn run(&self, transport: &dyn Transport) -> BackupReport {
        info!(
            source = self.source_chat,
            target = self.target_chat,
            start = self.start_id,
            end = self.end_id,
            "backup started"
        );
        if let Err(e) = transport
            .send_text(
                self.requester_chat,
                &format!(
                    "⏳ Backup started: messages {}..{} → chat {}.",
                    self.start_id, self.end_id, self.target_chat
                ),
            )
            .await
        {
            warn!(error = %e, "failed to send backup start notification");
        }

        let mut report = BackupReport::default();
        for id in self.start_id..=self.end_id {
            match transport
                .copy_message(self.target_chat, self.source_chat, id)
                .await
            {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    // Expected for sparse ranges; keep going.
                    debug!(id, error = %e, "backup item skipped");
                    report.failed += 1;
                }
            }
            tokio::time::sleep(self.delay).await;
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "backup finished"
        );
        if let Err(e) = transport
            .send_text(
                self.requester_chat,
                &format!(
                    "✅ Backup finished.\nTotal: {}\nCopied: {}\nFailed: {}",
                    report.total(),
                    report.succeeded,
                    report.failed
                ),
            )
            .await
        {
            warn!(error = %e, "failed to send backup completion notification");
        }
        report
    }
}
