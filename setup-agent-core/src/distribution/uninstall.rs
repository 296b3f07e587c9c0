//! Reverses the installer

use setup_agent_error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::install::{default_bin_dir, default_rc_files, BINARY_NAME};
use super::rc_file::RcFile;

/// Other places a `setup-agent` binary may have been dropped into
pub fn known_bin_dirs() -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();
    if let Some(home) = dirs::home_dir() {
        dirs_found.push(home.join(".local").join("bin"));
        dirs_found.push(home.join(".cargo").join("bin"));
    }
    dirs_found.push(PathBuf::from("/usr/local/bin"));
    dirs_found
}

#[derive(Debug, Clone)]
pub struct UninstallOptions {
    /// Directory the installer manages
    pub bin_dir: PathBuf,
    /// Swept for leftover binaries after the managed one is gone
    pub leftover_dirs: Vec<PathBuf>,
    pub rc_files: Vec<RcFile>,
}

impl UninstallOptions {
    pub fn for_user() -> Result<Self> {
        Ok(Self {
            bin_dir: default_bin_dir()?,
            leftover_dirs: known_bin_dirs(),
            rc_files: default_rc_files()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallReport {
    /// No binary and no PATH block were found
    NotInstalled,
    Removed {
        binaries: Vec<PathBuf>,
        rc_cleaned: Vec<PathBuf>,
    },
}

pub struct Uninstaller {
    options: UninstallOptions,
}

impl Uninstaller {
    pub fn new(options: UninstallOptions) -> Self {
        Self { options }
    }

    pub fn run(&self) -> Result<UninstallReport> {
        let mut binaries = Vec::new();

        let managed = self.options.bin_dir.join(BINARY_NAME);
        if remove_binary(&managed)? {
            binaries.push(managed);
        }
        for dir in &self.options.leftover_dirs {
            let leftover = dir.join(BINARY_NAME);
            if !binaries.contains(&leftover) && remove_binary(&leftover)? {
                binaries.push(leftover);
            }
        }

        let mut rc_cleaned = Vec::new();
        for rc in &self.options.rc_files {
            if rc.remove_path_block()? {
                rc_cleaned.push(rc.path().to_path_buf());
            }
        }

        if binaries.is_empty() && rc_cleaned.is_empty() {
            tracing::info!("setup-agent is not installed");
            return Ok(UninstallReport::NotInstalled);
        }
        tracing::info!(
            binaries = binaries.len(),
            rc_files = rc_cleaned.len(),
            "setup-agent uninstalled"
        );
        Ok(UninstallReport::Removed {
            binaries,
            rc_cleaned,
        })
    }
}

fn remove_binary(path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    fs::remove_file(path).map_err(|e| {
        Error::from(e)
            .with_operation("uninstaller::remove_binary")
            .with_context("path", path.display().to_string())
    })?;
    tracing::debug!(path = %path.display(), "removed binary");
    Ok(true)
}
