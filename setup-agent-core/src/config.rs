//! Run configuration, read once at startup

use serde::{Deserialize, Serialize};
use setup_agent_error::{Error, Result};
use setup_agent_llm::LlmSettings;
use std::path::{Path, PathBuf};

/// Load `.env` from the working directory.
///
/// A missing file is fine; a malformed one is logged and ignored.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!("failed to parse .env: {}", e);
            None
        }
    }
}

pub const LANGSMITH_TRACING_VAR: &str = "LANGSMITH_TRACING";
pub const LANGSMITH_PROJECT_VAR: &str = "LANGSMITH_PROJECT";
const DEFAULT_LANGSMITH_PROJECT: &str = "default";

/// `LANGSMITH_*` observability settings.
///
/// Runs are not exported to LangSmith. When tracing is switched on, the
/// project name is attached to the workflow span so log lines can be
/// matched to it; `LANGSMITH_API_KEY` and `LANGSMITH_ENDPOINT` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observability {
    pub project: Option<String>,
}

impl Observability {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(LANGSMITH_TRACING_VAR)
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"));
        if !enabled {
            return Self::default();
        }
        let project = lookup(LANGSMITH_PROJECT_VAR)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGSMITH_PROJECT.to_string());
        Self {
            project: Some(project),
        }
    }

    /// Span the workflow runs in; disabled when tracing is off
    pub fn span(&self) -> tracing::Span {
        match &self.project {
            Some(project) => tracing::info_span!("setup", langsmith_project = %project),
            None => tracing::Span::none(),
        }
    }
}

/// Everything a workflow run needs to know up front
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Canonical path of the project being set up
    pub project_root: PathBuf,
    /// Guideline files chosen up front; empty means discover them
    #[serde(default)]
    pub guideline_files: Vec<PathBuf>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub llm: LlmSettings,
    /// Shell transcript destination
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl SetupConfig {
    pub fn new(project_root: impl AsRef<Path>) -> Result<Self> {
        let raw = project_root.as_ref();
        let project_root = raw.canonicalize().map_err(|e| {
            Error::config_invalid(format!("project root {} is not accessible", raw.display()))
                .with_operation("config::new")
                .set_source(e)
        })?;
        if !project_root.is_dir() {
            return Err(Error::config_invalid(format!(
                "project root {} is not a directory",
                project_root.display()
            ))
            .with_operation("config::new"));
        }

        Ok(Self {
            project_root,
            guideline_files: Vec::new(),
            task: None,
            llm: LlmSettings::default(),
            log_file: None,
        })
    }

    /// Keep only the files that exist; relative paths resolve against the
    /// project root
    pub fn with_guideline_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.guideline_files = files
            .into_iter()
            .filter_map(|f| {
                let f = f.as_ref();
                let path = if f.is_absolute() {
                    f.to_path_buf()
                } else {
                    self.project_root.join(f)
                };
                if path.is_file() {
                    Some(path)
                } else {
                    tracing::warn!(file = %f.display(), "guideline file does not exist, ignoring");
                    None
                }
            })
            .collect();
        self
    }

    pub fn with_task(mut self, task: Option<String>) -> Self {
        self.task = task.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_llm(mut self, llm: LlmSettings) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.llm
            .validate()
            .map_err(|e| e.with_operation("config::validate"))
    }
}
