//! Workflow state shared by every node

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Separator placed between merged guideline files
pub const FILE_SEPARATOR: &str = "==========\n";

/// Every node of the workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Node {
    Start,
    GuidelinesRetrieverNode,
    TaskIdentifierNode,
    PlannerAgent,
    InstallerAgent,
    RunnerAgent,
    AuditorAgent,
    SuccessVerifierAgent,
    ContinueProcessNode,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Start => "START",
            Node::GuidelinesRetrieverNode => "GUIDELINES_RETRIEVER_NODE",
            Node::TaskIdentifierNode => "TASK_IDENTIFIER_NODE",
            Node::PlannerAgent => "PLANNER_AGENT",
            Node::InstallerAgent => "INSTALLER_AGENT",
            Node::RunnerAgent => "RUNNER_AGENT",
            Node::AuditorAgent => "AUDITOR_AGENT",
            Node::SuccessVerifierAgent => "SUCCESS_VERIFIER_AGENT",
            Node::ContinueProcessNode => "CONTINUE_PROCESS_NODE",
            Node::End => "END",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The agents a planned step may be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAgent {
    /// Sets up tools, dependencies and environment
    InstallerAgent,
    /// Runs or starts the application
    RunnerAgent,
}

impl From<StepAgent> for Node {
    fn from(agent: StepAgent) -> Self {
        match agent {
            StepAgent::InstallerAgent => Node::InstallerAgent,
            StepAgent::RunnerAgent => Node::RunnerAgent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Substep {
    /// Detailed substep description
    pub description: String,
    /// CLI commands to run, in order
    #[serde(default)]
    pub suggested_commands: Vec<String>,
}

/// A step of the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub description: String,
    pub substeps: Vec<Substep>,
    pub assigned_agent: Node,
    pub run_in_separate_shell: bool,
    /// Shell the step runs in; `None` means the main shell
    pub shell_id: Option<Uuid>,
}

impl Step {
    pub fn new(description: impl Into<String>, assigned_agent: Node) -> Self {
        Self {
            description: description.into(),
            substeps: Vec::new(),
            assigned_agent,
            run_in_separate_shell: false,
            shell_id: None,
        }
    }

    pub fn with_substeps(mut self, substeps: Vec<Substep>) -> Self {
        self.substeps = substeps;
        self
    }

    /// All suggested commands, one per line
    pub fn suggested_commands(&self) -> String {
        self.substeps
            .iter()
            .flat_map(|s| s.suggested_commands.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A step as the planner model emits it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedStep {
    /// High-level summary of the step
    pub description: String,
    pub assigned_agent: StepAgent,
    /// True when a command starts a long-running process
    #[serde(default)]
    pub run_in_separate_shell: bool,
    #[serde(default)]
    pub substeps: Vec<Substep>,
}

impl From<PlannedStep> for Step {
    fn from(planned: PlannedStep) -> Self {
        Self {
            description: planned.description,
            substeps: planned.substeps,
            assigned_agent: planned.assigned_agent.into(),
            run_in_separate_shell: planned.run_in_separate_shell,
            shell_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedStep {
    pub step: Step,
    pub output: String,
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedStep {
    pub step: Step,
    pub reason: String,
    pub guidance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineFile {
    pub file: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub description: String,
    pub error: String,
}

impl WorkflowError {
    pub fn new(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            error: error.into(),
        }
    }
}

/// State threaded through the workflow graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    /// `None` until the planner has run its first analysis
    pub plan: Option<VecDeque<Step>>,
    pub finished_steps: Vec<FinishedStep>,
    pub failed_steps: Vec<FailedStep>,
    pub errors: Vec<WorkflowError>,
    pub next_node: Option<Node>,
    pub possible_guideline_files: Vec<GuidelineFile>,
    pub selected_guideline_files: Vec<GuidelineFile>,
    pub possible_tasks: Vec<String>,
    pub chosen_task: Option<String>,
    pub finished_tasks: Vec<String>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of the selected guideline files joined by [`FILE_SEPARATOR`]
    pub fn merged_guidelines(&self) -> String {
        self.selected_guideline_files
            .iter()
            .map(|g| g.content.as_str())
            .collect::<Vec<_>>()
            .join(FILE_SEPARATOR)
    }

    pub fn plan_is_empty(&self) -> bool {
        self.plan.as_ref().map_or(true, VecDeque::is_empty)
    }
}
