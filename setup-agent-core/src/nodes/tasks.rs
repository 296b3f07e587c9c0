//! Works out what the developer wants to do with the project

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::LlmProvider;

use crate::agents::prompts;
use crate::prompter::{labels, Prompter};
use crate::runtime::Runtime;
use crate::state::GraphState;

pub const CHOOSE_TASK: &str = "Which task would you like to perform?";
pub const CUSTOM_TASK: &str = "Other: (Define custom task)";
pub const DESCRIBE_TASK: &str = "Please describe your custom task:";
const EMPTY_TASK: &str = "Task description cannot be empty.";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeveloperTasks {
    /// Distinct high-level goals, one sentence each
    pub tasks: Vec<String>,
}

/// Pick one of `tasks` or describe a new one
pub fn select_task(prompter: &dyn Prompter, tasks: &[String], message: &str) -> Result<String> {
    let mut choices = tasks.to_vec();
    choices.push(CUSTOM_TASK.to_string());

    let picked = prompter.select(message, &choices, 0)?;
    if let Some(task) = tasks.get(picked) {
        return Ok(task.clone());
    }

    let validate = |text: &str| {
        if text.trim().is_empty() {
            Err(EMPTY_TASK.to_string())
        } else {
            Ok(())
        }
    };
    let task = prompter.input_validated(DESCRIBE_TASK, &validate)?;
    Ok(task.trim().to_string())
}

pub struct TaskIdentifier;

impl TaskIdentifier {
    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        // a configured task runs once
        if let Some(task) = rt
            .config
            .task
            .as_ref()
            .filter(|t| !state.finished_tasks.contains(t))
        {
            tracing::info!(task = %task, "using configured task");
            state.chosen_task = Some(task.clone());
            return Ok(());
        }

        if state.selected_guideline_files.is_empty() {
            tracing::warn!("no guideline files to identify tasks from");
            state.possible_tasks.clear();
            return Ok(());
        }

        rt.announce("Analyzing documentation to identify developer tasks.");
        let found: DeveloperTasks = rt
            .llm
            .invoke(prompts::IDENTIFY_TASKS, &state.merged_guidelines())
            .await?;

        let mut tasks: Vec<String> = Vec::new();
        for task in found.tasks.iter().map(|t| t.trim()) {
            if !task.is_empty() && !tasks.iter().any(|t| t == task) {
                tasks.push(task.to_string());
            }
        }
        tracing::info!(tasks = tasks.len(), "developer tasks identified");

        let chosen = select_task(rt.prompter.as_ref(), &tasks, CHOOSE_TASK)?;
        state.possible_tasks = tasks;
        state.chosen_task = Some(chosen);
        Ok(())
    }
}
