pub mod browser;
pub mod error;
pub mod result;
pub mod session;

pub use browser::Browser;
pub use error::SandboxError;
pub use result::SandboxResult;
pub use session::SandboxSession;
