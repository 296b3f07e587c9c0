//! # setup-agent-error
//!
//! Unified error handling for setup-agent.
//!
//! - **ErrorKind**: what went wrong (e.g. `InferenceFailed`, `CommandBlocked`)
//! - **ErrorStatus**: whether a retry can help (Permanent, Temporary, Persistent)
//! - **Context**: key-value pairs that locate the failure
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use setup_agent_error::{Error, ErrorKind};
//!
//! fn locate() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ArtifactNotFound, "no archive in dist/")
//!         .with_operation("installer::locate_artifact")
//!         .with_context("dist_dir", "dist"))
//! }
//! ```
//!
//! Every fallible function returns `Result<T, setup_agent_error::Error>`.
//! An error is handled once; callers further up only append context.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the setup-agent Error
pub type Result<T> = std::result::Result<T, Error>;
