//! Finds the documentation that explains how to set up the project

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::LlmProvider;
use std::path::Path;

use crate::agents::prompts;
use crate::files::FileLoader;
use crate::prompter::{labels, Prompter};
use crate::runtime::Runtime;
use crate::state::{GraphState, GuidelineFile};

pub const SELECT_GUIDELINES: &str = "Select guideline files to use";
pub const OTHER_PATH: &str = "Other: (Enter manual path)";
pub const MANUAL_PATH: &str = "Please enter the file path (or press Enter to finish):";
const NOTHING_SELECTED: &str = "You must choose at least one option.";
const NO_VALID_FILE: &str = "You must choose at least one valid file.";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PickedEntries {
    /// Entries copied exactly as listed
    pub picked_entries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuidelineFileCheck {
    pub is_guideline: bool,
    pub reason: String,
}

fn bullet_list(title: &str, entries: &[String]) -> String {
    let items: Vec<String> = entries.iter().map(|e| format!("- {}", e)).collect();
    format!("{}:\n{}", title, items.join("\n"))
}

/// Path shown for a configured file: relative to the root when inside it
fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

pub struct GuidelinesRetriever;

impl GuidelinesRetriever {
    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        if !rt.config.guideline_files.is_empty() {
            let files: Vec<GuidelineFile> = rt
                .config
                .guideline_files
                .iter()
                .map(|path| GuidelineFile {
                    file: display_path(&rt.config.project_root, path),
                    content: rt.files.load_document(path),
                })
                .collect();
            tracing::info!(files = files.len(), "using configured guideline files");
            state.possible_guideline_files = files.clone();
            state.selected_guideline_files = files;
            return Ok(());
        }

        tracing::info!("retrieving guidelines from the project");
        let candidates = self.collect_supported_files(rt).await?;
        let relevant = self.filter_files(rt, &candidates).await?;
        state.possible_guideline_files = self.check_contents(rt, &relevant).await;
        state.selected_guideline_files = select_guidelines(
            rt.prompter.as_ref(),
            &rt.files,
            &state.possible_guideline_files,
            &[],
        )?;
        Ok(())
    }

    async fn collect_supported_files<P: LlmProvider>(
        &self,
        rt: &Runtime<P>,
    ) -> Result<Vec<String>> {
        let subdirs = rt.files.list_direct_subdirectories();
        let picked = if subdirs.is_empty() {
            Vec::new()
        } else {
            let result: PickedEntries = rt
                .llm
                .invoke(
                    prompts::FILTER_SUBDIRS,
                    &bullet_list("List of subdirectories", &subdirs),
                )
                .await?;
            result
                .picked_entries
                .into_iter()
                .filter(|d| subdirs.contains(d))
                .collect()
        };

        let mut files: Vec<String> = picked
            .iter()
            .flat_map(|d| rt.files.list_supported_files(d))
            .collect();
        files.extend(rt.files.list_direct_files(""));
        tracing::info!(files = files.len(), "supported files found");
        Ok(files)
    }

    async fn filter_files<P: LlmProvider>(
        &self,
        rt: &Runtime<P>,
        files: &[String],
    ) -> Result<Vec<String>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let result: PickedEntries = rt
            .llm
            .invoke(prompts::FILTER_FILES, &bullet_list("List of files", files))
            .await?;
        Ok(files
            .iter()
            .filter(|f| result.picked_entries.contains(f))
            .cloned()
            .collect())
    }

    /// A failed check drops the file rather than the whole discovery
    async fn check_contents<P: LlmProvider>(
        &self,
        rt: &Runtime<P>,
        files: &[String],
    ) -> Vec<GuidelineFile> {
        let mut guidelines = Vec::new();
        for file in files {
            let content = rt.files.load_document(file);
            if content.trim().is_empty() {
                continue;
            }

            let input = format!("File path: {}\nContent Preview:\n{}", file, content);
            match rt
                .llm
                .invoke::<GuidelineFileCheck>(prompts::CHECK_FILE_CONTENT, &input)
                .await
            {
                Ok(check) if check.is_guideline => {
                    tracing::debug!(file = %file, reason = %check.reason, "guideline file");
                    guidelines.push(GuidelineFile {
                        file: file.clone(),
                        content,
                    });
                }
                Ok(check) => {
                    tracing::debug!(file = %file, reason = %check.reason, "not a guideline file");
                }
                Err(e) => tracing::warn!(file = %file, "guideline check failed: {}", e),
            }
        }
        guidelines
    }
}

/// Let the user confirm which guideline files to use.
///
/// Files are listed shallowest first. `current` is pre-selected, or the
/// first file when nothing is selected yet. An extra option accepts paths
/// typed by hand.
pub fn select_guidelines(
    prompter: &dyn Prompter,
    files: &FileLoader,
    possible: &[GuidelineFile],
    current: &[GuidelineFile],
) -> Result<Vec<GuidelineFile>> {
    if possible.is_empty() {
        tracing::warn!("no guideline files found");
        return Ok(Vec::new());
    }

    let mut sorted = possible.to_vec();
    sorted.sort_by_key(|g| g.file.split('/').count());

    let mut choices = labels(sorted.iter().map(|g| g.file.as_str()));
    choices.push(OTHER_PATH.to_string());
    let mut defaults: Vec<bool> = if current.is_empty() {
        (0..sorted.len()).map(|i| i == 0).collect()
    } else {
        sorted
            .iter()
            .map(|g| current.iter().any(|c| c.file == g.file))
            .collect()
    };
    defaults.push(false);

    let picked = loop {
        let picked = prompter.multi_select(SELECT_GUIDELINES, &choices, &defaults)?;
        if !picked.is_empty() {
            break picked;
        }
        prompter.announce(NOTHING_SELECTED);
    };

    let mut selection: Vec<GuidelineFile> = picked
        .iter()
        .filter_map(|&i| sorted.get(i))
        .cloned()
        .collect();

    if picked.contains(&sorted.len()) {
        for path in manual_paths(prompter, !selection.is_empty())? {
            if selection.iter().any(|g| g.file == path) {
                continue;
            }
            let content = files.load_document(&path);
            if content.is_empty() {
                tracing::warn!(file = %path, "manual guideline file is empty or unreadable");
                continue;
            }
            selection.push(GuidelineFile {
                file: path,
                content,
            });
        }
    }

    tracing::info!(files = selection.len(), "guideline files selected");
    Ok(selection)
}

/// Paths typed until an empty line; the first must be non-empty when
/// nothing else is selected
fn manual_paths(prompter: &dyn Prompter, have_selection: bool) -> Result<Vec<String>> {
    let mut paths: Vec<String> = Vec::new();
    loop {
        let need_one = !have_selection && paths.is_empty();
        let validate = |text: &str| {
            if need_one && text.trim().is_empty() {
                Err(NO_VALID_FILE.to_string())
            } else {
                Ok(())
            }
        };
        let path = prompter.input_validated(MANUAL_PATH, &validate)?;
        let path = path.trim();
        if path.is_empty() {
            return Ok(paths);
        }
        paths.push(path.to_string());
    }
}
