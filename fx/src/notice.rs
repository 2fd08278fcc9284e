//! User-facing failure notifications.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ErrorKind, FxError};

/// A failure as shown to the user: a title and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: ErrorKind,
    pub title: String,
    pub message: String,
}

impl From<&FxError> for Notice {
    fn from(error: &FxError) -> Self {
        Self {
            kind: error.kind(),
            title: error.title().to_string(),
            message: error.to_string(),
        }
    }
}

/// Sending half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    /// Create a notifier and the receiver that consumes its notices.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, notice: Notice) {
        if let Err(mpsc::error::SendError(notice)) = self.tx.send(notice) {
            warn!(
                title = %notice.title,
                message = %notice.message,
                "Notice dropped, no receiver"
            );
        }
    }

    pub fn report(&self, error: &FxError) {
        self.publish(Notice::from(error));
    }
}
