//! Installs the released binary into a user bin directory

use flate2::read::GzDecoder;
use setup_agent_error::{Error, ErrorKind, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use super::rc_file::RcFile;

pub const BINARY_NAME: &str = "setup-agent";
const ARCHIVE_PREFIX: &str = "setup-agent-";
const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const DEFAULT_DIST_DIR: &str = "dist";
pub const DEFAULT_BUILD_COMMAND: &str = "sh packaging/build.sh";

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        Error::config_invalid("cannot determine the home directory")
            .with_operation("distribution::home_dir")
    })
}

/// `~/.local/bin`, the directory the installer manages
pub fn default_bin_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".local").join("bin"))
}

/// The zsh and bash rc files of the current user
pub fn default_rc_files() -> Result<Vec<RcFile>> {
    Ok(RcFile::for_home(&home_dir()?))
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Where release artifacts are looked up
    pub dist_dir: PathBuf,
    pub bin_dir: PathBuf,
    /// Shell command run when no artifact exists; `None` disables the build
    pub build_command: Option<String>,
    pub rc_files: Vec<RcFile>,
}

impl InstallOptions {
    /// Defaults for the current user: `./dist`, `~/.local/bin`, the
    /// packaging build script and the zsh/bash rc files
    pub fn for_user() -> Result<Self> {
        Ok(Self {
            dist_dir: PathBuf::from(DEFAULT_DIST_DIR),
            bin_dir: default_bin_dir()?,
            build_command: Some(DEFAULT_BUILD_COMMAND.to_string()),
            rc_files: default_rc_files()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub artifact: PathBuf,
    /// True when the artifact had to be built first
    pub built: bool,
    pub binary: PathBuf,
    /// Rc files that received the PATH block in this run
    pub rc_updated: Vec<PathBuf>,
}

fn is_artifact(name: &str) -> bool {
    name == BINARY_NAME || (name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX))
}

pub struct Installer {
    options: InstallOptions,
}

impl Installer {
    pub fn new(options: InstallOptions) -> Self {
        Self { options }
    }

    /// Locate or build, install, add to PATH, verify. The first failing
    /// step aborts.
    pub fn run(&self) -> Result<InstallReport> {
        let (artifact, built) = match self.locate_artifact()? {
            Some(artifact) => (artifact, false),
            None => {
                self.build()?;
                let artifact = self.locate_artifact()?.ok_or_else(|| {
                    Error::artifact_not_found(self.options.dist_dir.display().to_string())
                        .with_operation("installer::run")
                })?;
                (artifact, true)
            }
        };
        tracing::info!(artifact = %artifact.display(), built, "installing artifact");

        self.ensure_bin_dir()?;
        let binary = self.install(&artifact)?;

        let mut rc_updated = Vec::new();
        for rc in &self.options.rc_files {
            if rc.append_path_block(&self.options.bin_dir)? {
                rc_updated.push(rc.path().to_path_buf());
            }
        }

        self.verify()?;
        Ok(InstallReport {
            artifact,
            built,
            binary,
            rc_updated,
        })
    }

    /// The newest archive or bare binary in the dist dir
    pub fn locate_artifact(&self) -> Result<Option<PathBuf>> {
        let dir = &self.options.dist_dir;
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            if !path.is_file() || !is_artifact(&name.to_string_lossy()) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    fn build(&self) -> Result<()> {
        let Some(command) = &self.options.build_command else {
            return Err(Error::artifact_not_found(
                self.options.dist_dir.display().to_string(),
            )
            .with_operation("installer::build"));
        };

        tracing::info!(command = %command, "no artifact found, building");
        let status = Command::new("sh").arg("-c").arg(command).status().map_err(|e| {
            Error::new(ErrorKind::BuildFailed, format!("cannot run build command: {}", e))
                .with_operation("installer::build")
                .set_source(e)
        })?;
        if !status.success() {
            return Err(Error::new(
                ErrorKind::BuildFailed,
                format!("build command exited with {}", status),
            )
            .with_operation("installer::build")
            .with_context("command", command.clone()));
        }
        Ok(())
    }

    /// The bin dir plays the package manager: it only has to exist
    fn ensure_bin_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.options.bin_dir).map_err(|e| {
            Error::from(e)
                .with_operation("installer::ensure_bin_dir")
                .with_context("bin_dir", self.options.bin_dir.display().to_string())
        })
    }

    fn install(&self, artifact: &Path) -> Result<PathBuf> {
        let target = self.options.bin_dir.join(BINARY_NAME);
        let is_archive = artifact
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(ARCHIVE_SUFFIX));

        if is_archive {
            extract_binary(artifact, &target)?;
        } else {
            fs::copy(artifact, &target)?;
        }
        make_executable(&target)?;
        tracing::info!(binary = %target.display(), "binary installed");
        Ok(target)
    }

    fn verify(&self) -> Result<PathBuf> {
        let bin_dir = &self.options.bin_dir;
        which::which_in(BINARY_NAME, Some(bin_dir), bin_dir).map_err(|e| {
            Error::install_failed(format!(
                "{} is not an executable in {}",
                BINARY_NAME,
                bin_dir.display()
            ))
            .with_operation("installer::verify")
            .set_source(e)
        })
    }
}

/// Copy the `setup-agent` entry of a release archive to `target`
fn extract_binary(archive: &Path, target: &Path) -> Result<()> {
    let decoder = GzDecoder::new(File::open(archive)?);
    let mut archive_reader = tar::Archive::new(decoder);

    for entry in archive_reader.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();
        let is_binary = path.file_name().is_some_and(|n| n == BINARY_NAME);
        if is_binary && entry.header().entry_type().is_file() {
            tracing::debug!(entry = %path.display(), "unpacking binary");
            entry.unpack(target)?;
            return Ok(());
        }
    }

    Err(Error::install_failed(format!(
        "archive {} contains no {} binary",
        archive.display(),
        BINARY_NAME
    ))
    .with_operation("installer::extract_binary"))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::rc_file::MARKER;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    struct Sandbox {
        _dir: tempfile::TempDir,
        dist: PathBuf,
        bin: PathBuf,
        home: PathBuf,
    }

    fn sandbox() -> Sandbox {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        Sandbox {
            dist,
            bin: home.join(".local/bin"),
            home,
            _dir: dir,
        }
    }

    fn options(sb: &Sandbox, build_command: Option<String>) -> InstallOptions {
        InstallOptions {
            dist_dir: sb.dist.clone(),
            bin_dir: sb.bin.clone(),
            build_command,
            rc_files: RcFile::for_home(&sb.home),
        }
    }

    fn write_archive(path: &Path) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let body = b"#!/bin/sh\necho setup-agent\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "setup-agent-0.1.0/setup-agent", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_install_from_archive_twice() {
        let sb = sandbox();
        fs::create_dir_all(&sb.dist).unwrap();
        write_archive(&sb.dist.join("setup-agent-0.1.0-x86_64-unknown-linux-gnu.tar.gz"));
        fs::write(sb.dist.join("notes.txt"), "ignored").unwrap();
        let installer = Installer::new(options(&sb, None));

        let report = installer.run().unwrap();
        assert!(!report.built);
        assert_eq!(report.binary, sb.bin.join(BINARY_NAME));
        assert_eq!(report.rc_updated.len(), 2);
        assert!(fs::read_to_string(&report.binary).unwrap().contains("echo setup-agent"));

        let again = installer.run().unwrap();
        assert!(again.rc_updated.is_empty());
        for rc in RcFile::for_home(&sb.home) {
            let text = fs::read_to_string(rc.path()).unwrap();
            assert_eq!(text.matches(MARKER).count(), 1);
        }
    }

    #[test]
    fn test_missing_artifact_triggers_build() {
        let sb = sandbox();
        let command = format!(
            "mkdir -p '{dist}' && printf '#!/bin/sh\\n' > '{dist}/setup-agent'",
            dist = sb.dist.display()
        );
        let installer = Installer::new(options(&sb, Some(command)));
        assert!(installer.locate_artifact().unwrap().is_none());

        let report = installer.run().unwrap();

        assert!(report.built);
        assert_eq!(report.artifact, sb.dist.join(BINARY_NAME));
        assert_eq!(fs::read_dir(&sb.dist).unwrap().count(), 1);
        assert!(sb.bin.join(BINARY_NAME).is_file());
    }

    #[test]
    fn test_build_without_artifact_fails() {
        let sb = sandbox();
        let installer = Installer::new(options(&sb, Some("true".into())));

        let err = installer.run().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
        assert!(!sb.bin.exists());
        assert!(!sb.home.join(".zshrc").exists());
    }

    #[test]
    fn test_failing_build_reported() {
        let sb = sandbox();
        let installer = Installer::new(options(&sb, Some("exit 3".into())));

        let err = installer.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildFailed);
    }

    #[test]
    fn test_default_build_script_output_is_an_artifact() {
        let script = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../packaging/build.sh"));
        assert!(DEFAULT_BUILD_COMMAND.ends_with("packaging/build.sh"));
        // no Cargo.lock is shipped, so a locked build fails on a fresh checkout
        assert!(!script.contains("--locked"));
        assert!(script.contains(r#"name="setup-agent-${version}-${target}""#));
        assert!(script.contains(r#"tar -C dist -czf "dist/${name}.tar.gz""#));
        assert_eq!(DEFAULT_DIST_DIR, "dist");
        assert!(is_artifact("setup-agent-0.1.0-x86_64-unknown-linux-gnu.tar.gz"));
    }

    #[test]
    fn test_archive_without_binary() {
        let sb = sandbox();
        fs::create_dir_all(&sb.dist).unwrap();
        let path = sb.dist.join("setup-agent-0.1.0.tar.gz");
        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_cksum();
        builder.append_data(&mut header, "README", &b"hi"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = Installer::new(options(&sb, None)).run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstallFailed);
    }
}
