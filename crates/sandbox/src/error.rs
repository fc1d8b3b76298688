use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("sandbox returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("sandbox did not become ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("browser did not connect after {attempts} attempts")]
    BrowserUnavailable { attempts: u32 },

    #[error("failed to provision sandbox: {0}")]
    Provision(String),

    #[error("sandbox response could not be parsed: {0}")]
    InvalidResponse(String),
}
