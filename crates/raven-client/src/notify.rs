use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ClientError, ErrorSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-visible notification: a toast, or an inline banner/field error.
#[derive(Debug, Clone)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub surface: ErrorSurface,
    pub text: String,
}

/// Fan-out of notices to whatever UI is listening.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn success(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.send(NoticeLevel::Success, ErrorSurface::Toast, text);
    }

    /// Report a failure once. `context` says what the user was doing.
    pub fn error(&self, context: &str, err: &ClientError) {
        warn!("{}: {}", context, err);
        self.send(NoticeLevel::Error, err.surface(), format!("{}: {}", context, err));
    }

    fn send(&self, level: NoticeLevel, surface: ErrorSurface, text: String) {
        let _ = self.tx.send(Notice {
            id: Uuid::new_v4(),
            level,
            surface,
            text,
        });
    }
}
