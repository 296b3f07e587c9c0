//! The PATH block the installer keeps in the user's shell rc files

use setup_agent_error::{Error, Result};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

pub const MARKER: &str = "# >>> setup-agent PATH >>>";
pub const END_MARKER: &str = "# <<< setup-agent <<<";

/// Rc files the PATH block is written to, relative to the home directory
pub const RC_FILES: [&str; 2] = [".zshrc", ".bashrc"];

/// A shell rc file, edited in place with a `<rc>.bak` copy taken first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcFile {
    path: PathBuf,
}

impl RcFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The zsh and bash rc files under `home`
    pub fn for_home(home: &Path) -> Vec<Self> {
        RC_FILES.iter().map(|name| Self::new(home.join(name))).collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Contents, or `None` when the file does not exist
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e)
                .with_operation("rc_file::read")
                .with_context("path", self.path.display().to_string())),
        }
    }

    fn backup(&self) -> Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).map_err(|e| {
                Error::from(e)
                    .with_operation("rc_file::backup")
                    .with_context("path", self.path.display().to_string())
            })?;
        }
        Ok(())
    }

    pub fn has_marker(&self) -> Result<bool> {
        Ok(self
            .read()?
            .is_some_and(|text| text.lines().any(|l| l.trim() == MARKER)))
    }

    /// Add `dir` to PATH. Returns false when the block is already there.
    pub fn append_path_block(&self, dir: &Path) -> Result<bool> {
        let current = self.read()?.unwrap_or_default();
        if current.lines().any(|l| l.trim() == MARKER) {
            tracing::debug!(rc = %self.path.display(), "PATH block already present");
            return Ok(false);
        }

        self.backup()?;
        let mut text = current;
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&path_block(dir));
        fs::write(&self.path, text)?;
        tracing::info!(rc = %self.path.display(), dir = %dir.display(), "added PATH block");
        Ok(true)
    }

    /// Strip every PATH block. Returns false when there was none.
    pub fn remove_path_block(&self) -> Result<bool> {
        let Some(current) = self.read()? else {
            return Ok(false);
        };
        if !current.lines().any(|l| l.trim() == MARKER) {
            return Ok(false);
        }

        self.backup()?;
        let lines: Vec<&str> = current.lines().collect();
        let mut kept: Vec<&str> = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if lines[i].trim() != MARKER {
                kept.push(lines[i]);
                i += 1;
                continue;
            }
            // drop the blank separator written with the block
            if kept.last().is_some_and(|l| l.trim().is_empty()) {
                kept.pop();
            }
            // a block is the marker, one PATH export and the end marker;
            // anything else after the marker belongs to the user
            i += 1;
            if lines
                .get(i)
                .is_some_and(|l| l.trim_start().starts_with("export PATH="))
            {
                i += 1;
            }
            if lines.get(i).is_some_and(|l| l.trim() == END_MARKER) {
                i += 1;
            } else {
                tracing::warn!(rc = %self.path.display(), "PATH block has no end marker");
            }
        }

        let mut text = kept.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(&self.path, text)?;
        tracing::info!(rc = %self.path.display(), "removed PATH block");
        Ok(true)
    }
}

fn path_block(dir: &Path) -> String {
    format!(
        "\n{}\nexport PATH=\"{}:$PATH\"\n{}\n",
        MARKER,
        dir.display(),
        END_MARKER
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let rc = RcFile::new(dir.path().join(".zshrc"));
        fs::write(rc.path(), "alias ll='ls -l'").unwrap();

        assert!(rc.append_path_block(Path::new("/opt/bin")).unwrap());
        assert!(!rc.append_path_block(Path::new("/opt/bin")).unwrap());

        let text = fs::read_to_string(rc.path()).unwrap();
        assert_eq!(text.matches(MARKER).count(), 1);
        assert!(text.starts_with("alias ll='ls -l'\n"));
        assert!(text.contains("export PATH=\"/opt/bin:$PATH\"\n"));
        assert_eq!(fs::read_to_string(rc.backup_path()).unwrap(), "alias ll='ls -l'");
        assert!(rc.has_marker().unwrap());
    }

    #[test]
    fn test_append_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let rc = RcFile::new(dir.path().join(".bashrc"));
        assert!(!rc.has_marker().unwrap());

        rc.append_path_block(Path::new("/home/me/.local/bin")).unwrap();

        assert!(rc.has_marker().unwrap());
        assert!(!rc.backup_path().exists());
    }

    #[test]
    fn test_remove_restores_user_content() {
        let dir = tempfile::tempdir().unwrap();
        let rc = RcFile::new(dir.path().join(".zshrc"));
        let original = "export EDITOR=vim\nalias gs='git status'\n";
        fs::write(rc.path(), original).unwrap();

        rc.append_path_block(Path::new("/opt/bin")).unwrap();
        fs::write(
            rc.path(),
            fs::read_to_string(rc.path()).unwrap() + "source ~/.profile\n",
        )
        .unwrap();
        assert!(rc.remove_path_block().unwrap());

        let text = fs::read_to_string(rc.path()).unwrap();
        assert_eq!(text, format!("{}source ~/.profile\n", original));
        assert!(!rc.has_marker().unwrap());
        assert!(fs::read_to_string(rc.backup_path()).unwrap().contains(MARKER));
    }

    #[test]
    fn test_remove_keeps_lines_after_unterminated_block() {
        let dir = tempfile::tempdir().unwrap();
        let rc = RcFile::new(dir.path().join(".zshrc"));
        fs::write(
            rc.path(),
            format!(
                "export A=1\n{}\nexport PATH=\"/x:$PATH\"\nalias gs='git status'\nexport EDITOR=vim\n",
                MARKER
            ),
        )
        .unwrap();

        assert!(rc.remove_path_block().unwrap());

        assert_eq!(
            fs::read_to_string(rc.path()).unwrap(),
            "export A=1\nalias gs='git status'\nexport EDITOR=vim\n"
        );
    }

    #[test]
    fn test_remove_without_block_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let rc = RcFile::new(dir.path().join(".zshrc"));
        assert!(!rc.remove_path_block().unwrap());

        fs::write(rc.path(), "export A=1\n").unwrap();
        assert!(!rc.remove_path_block().unwrap());
        assert!(!rc.backup_path().exists());
        assert_eq!(fs::read_to_string(rc.path()).unwrap(), "export A=1\n");
    }
}
