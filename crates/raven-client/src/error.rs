use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Where an error ends up in front of the user. Nothing is fatal: every
/// failure is caught at the call site and surfaced once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSurface {
    /// Transient notification
    Toast,
    /// Inline banner inside the affected row or card
    InlineBanner,
    /// Inline text next to the offending form field
    InlineField,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{method} failed ({status}): {message}")]
    Remote {
        method: String,
        status: u16,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid response from {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is already in progress")]
    Busy(String),

    #[error("Real-time connection error: {0}")]
    Realtime(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Local store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn surface(&self) -> ErrorSurface {
        match self {
            Self::NotFound(_) => ErrorSurface::InlineBanner,
            Self::Validation(_) => ErrorSurface::InlineField,
            _ => ErrorSurface::Toast,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(e: anyhow::Error) -> Self {
        Self::Store(e.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Realtime(Box::new(e))
    }
}
