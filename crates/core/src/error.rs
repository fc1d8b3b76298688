use thiserror::Error;

/// Error kinds surfaced to API clients and stored in the event log (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Validation,
    TooManyRequests,
    Server,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::TooManyRequests => "too_many_requests",
            ErrorKind::Server => "server",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum StupidError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("[{kind}] {message}")]
    Kinded { kind: ErrorKind, message: String },

    #[error("{0}")]
    Other(String),
}

impl StupidError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Kinded { kind: ErrorKind::BadRequest, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::Kinded { kind: ErrorKind::NotFound, message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Kinded { kind: ErrorKind::Validation, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StupidError::Kinded { kind, .. } => *kind,
            _ => ErrorKind::Server,
        }
    }
}
