//! "Recovered" signal delivered to the notification collaborator
//!
//! Fired exactly once per successful recovery. Rendering the alert is the
//! consumer's job.

use tokio::sync::mpsc;

use crate::models::RecoveredFile;

pub trait RecoveryListener: Send + Sync {
    fn recovered(&self, file: &RecoveredFile);
}

/// Logs each recovery; the default when nothing else is wired up
#[derive(Debug, Default)]
pub struct LogListener;

impl RecoveryListener for LogListener {
    fn recovered(&self, file: &RecoveredFile) {
        tracing::info!(
            variant = %file.variant,
            category = %file.category,
            file = %file.file_name,
            path = %file.recovered_path.display(),
            "Deleted media has been recovered"
        );
    }
}

/// Forwards recoveries into a channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<RecoveredFile>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RecoveredFile>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecoveryListener for ChannelListener {
    fn recovered(&self, file: &RecoveredFile) {
        if self.tx.send(file.clone()).is_err() {
            tracing::debug!(file = %file.file_name, "Recovery listener channel closed");
        }
    }
}
