use thiserror::Error;

/// User-correctable input problems. Rejected before any store is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ports must be within 1-65535 (got {start}-{end})")]
    PortOutOfRange { start: u32, end: u32 },
    #[error("start port {start} is after end port {end}")]
    StartAfterEnd { start: u32, end: u32 },
    #[error("not a port number: {0}")]
    NotANumber(String),
    #[error("expected 'start-end', got '{0}'")]
    Malformed(String),
    #[error("enter a port or a 'start-end' range")]
    Empty,
}

/// A remote operation failed to produce a result at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} task aborted: {message}")]
    Aborted {
        operation: &'static str,
        message: String,
    },
}

impl TransportError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        TransportError::Backend {
            operation,
            message: message.into(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            TransportError::Backend { operation, .. }
            | TransportError::Aborted { operation, .. } => operation,
        }
    }
}
