//! Self-install and self-uninstall of the `setup-agent` binary.
//!
//! Both run synchronously and stop at the first failing step. The only
//! shared state they touch is the user's shell rc files, which are backed
//! up before every edit.

pub mod install;
pub mod rc_file;
pub mod uninstall;

pub use install::{InstallOptions, InstallReport, Installer, BINARY_NAME};
pub use rc_file::{RcFile, END_MARKER, MARKER};
pub use uninstall::{UninstallOptions, UninstallReport, Uninstaller};
