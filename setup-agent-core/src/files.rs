//! Discovery and loading of guideline documents inside a project

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Document types that may hold setup guidelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedExtension {
    Markdown,
    Pdf,
    Html,
    Text,
    ReStructuredText,
}

impl SupportedExtension {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            "html" => Some(Self::Html),
            "txt" => Some(Self::Text),
            "rst" => Some(Self::ReStructuredText),
            _ => None,
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}

fn strip_html(html: &str) -> String {
    static BLOCKS: OnceLock<Option<Regex>> = OnceLock::new();
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();

    let blocks = BLOCKS
        .get_or_init(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").ok());
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").ok());

    let mut text = html.to_string();
    if let Some(re) = blocks {
        text = re.replace_all(&text, "").into_owned();
    }
    if let Some(re) = tags {
        text = re.replace_all(&text, "\n").into_owned();
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lists and reads files below a project root.
///
/// Listing results are paths relative to the root, with `/` separators,
/// sorted for stable prompts.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn entries(&self, dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => {
                let mut paths: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| !is_hidden(p))
                    .collect();
                paths.sort();
                paths
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "cannot list directory: {}", e);
                Vec::new()
            }
        }
    }

    /// Non-hidden directories directly under the root
    pub fn list_direct_subdirectories(&self) -> Vec<String> {
        self.entries(&self.root)
            .into_iter()
            .filter(|p| p.is_dir())
            .map(|p| self.relative(&p))
            .collect()
    }

    /// Supported files anywhere below `dir` (relative to the root)
    pub fn list_supported_files(&self, dir: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.join(dir)];
        while let Some(current) = pending.pop() {
            for path in self.entries(&current) {
                if path.is_dir() {
                    pending.push(path);
                } else if SupportedExtension::from_path(&path).is_some() {
                    found.push(self.relative(&path));
                }
            }
        }
        found.sort();
        found
    }

    /// Supported files directly inside `dir` (relative to the root)
    pub fn list_direct_files(&self, dir: &str) -> Vec<String> {
        self.entries(&self.root.join(dir))
            .into_iter()
            .filter(|p| p.is_file() && SupportedExtension::from_path(p).is_some())
            .map(|p| self.relative(&p))
            .collect()
    }

    /// Text content of a document; empty when it cannot be read
    pub fn load_document(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let kind = SupportedExtension::from_path(&full);
        if kind == Some(SupportedExtension::Pdf) {
            tracing::warn!(file = %full.display(), "PDF documents are not supported, skipping");
            return String::new();
        }

        let raw = match fs::read(&full) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(file = %full.display(), "failed to load document: {}", e);
                return String::new();
            }
        };

        match kind {
            Some(SupportedExtension::Html) => strip_html(&raw),
            _ => raw,
        }
    }
}
