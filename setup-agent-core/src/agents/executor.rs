//! Installer and runner: execute the step at the front of the plan.
//!
//! Both agents share the flow. The user sees the suggested commands and
//! picks Continue, Skip or Learn more. Continue hands the step to the tool
//! loop in the step's shell; whatever that shell printed becomes the
//! finished step's output for the auditor.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::{ChatMessage, LlmProvider};
use std::collections::VecDeque;

use super::prompts;
use crate::prompter::labels;
use crate::runtime::Runtime;
use crate::state::{
    FinishedStep, GraphState, Node, Step, StepAgent, WorkflowError, FILE_SEPARATOR,
};
use crate::tools::{run_agent_loop, AgentScope, Tool};

pub const CHOOSE_ACTION: &str = "Choose an action:";
pub const CONTINUE: &str = "Continue";
pub const SKIP: &str = "Skip";
pub const LEARN_MORE: &str = "Learn more";
pub const SKIPPED_OUTPUT: &str = "Command skipped by user";

const RUNNER_TOOLS: [Tool; 7] = [
    Tool::RunCommand,
    Tool::Authenticate,
    Tool::UserInput,
    Tool::PromptUserInput,
    Tool::PromptUserSelection,
    Tool::ArrowKeys,
    Tool::KeyboardKeys,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepExplanation {
    /// Why the step is needed for the overall workflow
    pub purpose: String,
    /// What the commands will do to the system
    pub actions: String,
    /// Risks: reversibility, system-wide impact
    pub safe: String,
}

impl std::fmt::Display for StepExplanation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Purpose: {}\nActions: {}\nSafe to run: {}",
            self.purpose, self.actions, self.safe
        )
    }
}

/// Commands of each substep joined by ", ", substeps split by the file separator
pub fn commands_text(step: &Step) -> String {
    step.substeps
        .iter()
        .map(|s| s.suggested_commands.join(", "))
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR)
}

pub(crate) fn finished_text(finished: &[FinishedStep]) -> String {
    if finished.is_empty() {
        return "none".to_string();
    }
    finished
        .iter()
        .map(|f| f.step.description.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy)]
pub struct StepExecutor {
    agent: StepAgent,
}

impl StepExecutor {
    pub fn installer() -> Self {
        Self {
            agent: StepAgent::InstallerAgent,
        }
    }

    pub fn runner() -> Self {
        Self {
            agent: StepAgent::RunnerAgent,
        }
    }

    pub fn node(&self) -> Node {
        self.agent.into()
    }

    fn tools(&self) -> &'static [Tool] {
        match self.agent {
            StepAgent::InstallerAgent => &Tool::ALL,
            StepAgent::RunnerAgent => &RUNNER_TOOLS,
        }
    }

    fn description(&self) -> &'static str {
        match self.agent {
            StepAgent::InstallerAgent => prompts::INSTALLER_DESCRIPTION,
            StepAgent::RunnerAgent => prompts::RUNNER_DESCRIPTION,
        }
    }

    pub fn execution_prompt(&self, step: &Step, finished: &[FinishedStep]) -> String {
        let commands = commands_text(step);
        let done = finished_text(finished);
        match self.agent {
            StepAgent::InstallerAgent => prompts::render(
                prompts::INSTALLATION_PROMPT,
                &[
                    ("step", step.description.as_str()),
                    ("installed", done.as_str()),
                    ("commands", commands.as_str()),
                    ("rules", prompts::INSTALLER_RULES),
                ],
            ),
            StepAgent::RunnerAgent => prompts::render(
                prompts::STEP_RUNNING_PROMPT,
                &[
                    ("step", step.description.as_str()),
                    ("finished", done.as_str()),
                    ("commands", commands.as_str()),
                    ("rules", prompts::RUNNER_RULES),
                ],
            ),
        }
    }

    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        let Some(step) = state.plan.as_mut().and_then(VecDeque::pop_front) else {
            tracing::warn!(agent = %self.node(), "no remaining steps");
            return Ok(());
        };

        if step.assigned_agent != self.node() {
            tracing::warn!(
                agent = %self.node(),
                assigned = %step.assigned_agent,
                "step is assigned to another agent"
            );
            if let Some(plan) = state.plan.as_mut() {
                plan.push_front(step);
            }
            return Ok(());
        }

        rt.announce(&format!("Next step: {}", step.description));
        let commands = step.suggested_commands();
        if !commands.is_empty() {
            rt.announce(&format!("Suggested commands:\n{}", commands));
        }

        let choices = labels([CONTINUE, SKIP, LEARN_MORE]);
        loop {
            match rt.prompter.select(CHOOSE_ACTION, &choices, 0)? {
                0 => return self.execute(rt, state, step).await,
                1 => {
                    tracing::info!("skipping step: {}", step.description);
                    state.finished_steps.push(FinishedStep {
                        step,
                        output: SKIPPED_OUTPUT.to_string(),
                        skipped: true,
                    });
                    return Ok(());
                }
                _ => {
                    let explanation = self.explain(rt, &step).await;
                    rt.announce(&format!(
                        "\n=== Step Explanation ===\n{}\n========================\n",
                        explanation
                    ));
                }
            }
        }
    }

    async fn explain<P: LlmProvider>(&self, rt: &Runtime<P>, step: &Step) -> String {
        let input = format!(
            "Step description: {}\nSuggested commands: {}",
            step.description,
            step.suggested_commands()
        );
        match rt
            .llm
            .invoke::<StepExplanation>(prompts::STEP_EXPLANATION, &input)
            .await
        {
            Ok(explanation) => explanation.to_string(),
            Err(e) => {
                tracing::error!("failed to explain step '{}': {}", step.description, e);
                format!("Could not retrieve explanation: {}", e)
            }
        }
    }

    async fn execute<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
        mut step: Step,
    ) -> Result<()> {
        rt.shells.get_shell(step.shell_id).clean_step_buffer();

        let messages = vec![
            ChatMessage::system(self.description()),
            ChatMessage::user(self.execution_prompt(&step, &state.finished_steps)),
        ];
        let scope = AgentScope {
            name: self.node().as_str(),
            shell_id: step.shell_id,
            tools: self.tools(),
        };

        match run_agent_loop(rt, &scope, messages).await {
            Ok(transcript) => {
                tracing::info!(agent = %self.node(), "step finished: {}", transcript.answer);
                if self.agent == StepAgent::RunnerAgent {
                    step.assigned_agent = Node::RunnerAgent;
                }
                let output = rt.shells.get_shell(step.shell_id).step_buffer().to_string();
                state.finished_steps.push(FinishedStep {
                    step,
                    output,
                    skipped: false,
                });
            }
            Err(e) => {
                tracing::error!(agent = %self.node(), "error during '{}': {}", step.description, e);
                state
                    .errors
                    .push(WorkflowError::new(step.description, e.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompter::{Answer, ScriptedPrompter};
    use crate::shell::FakeTerminal;
    use crate::state::Substep;
    use crate::testing;
    use setup_agent_llm::mock::MockReply;
    use std::sync::Arc;

    fn install_step() -> Step {
        Step::new("Install dependencies", Node::InstallerAgent).with_substeps(vec![
            Substep {
                description: "node".into(),
                suggested_commands: vec!["brew install node".into(), "node -v".into()],
            },
            Substep {
                description: "deps".into(),
                suggested_commands: vec!["npm install".into()],
            },
        ])
    }

    fn state_with(step: Step) -> GraphState {
        GraphState {
            plan: Some(VecDeque::from([step])),
            ..Default::default()
        }
    }

    #[test]
    fn test_execution_prompts() {
        let step = install_step();
        assert_eq!(commands_text(&step), "brew install node, node -v==========\nnpm install");

        let prompt = StepExecutor::installer().execution_prompt(&step, &[]);
        assert!(prompt.starts_with(
            "Requirement: Install dependencies\nThings done so far during the installation process: none\n"
        ));

        let done = FinishedStep {
            step: Step::new("Clone submodules", Node::InstallerAgent),
            output: String::new(),
            skipped: false,
        };
        let prompt = StepExecutor::runner().execution_prompt(&step, &[done.clone(), done]);
        assert!(prompt.starts_with("Step to execute: Install dependencies\n"));
        assert!(prompt.contains("Steps completed so far: Clone submodules, Clone submodules\n"));
    }

    #[tokio::test]
    async fn test_skip_records_skipped_step() {
        let prompter = Arc::new(ScriptedPrompter::new([Answer::choice(SKIP)]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = state_with(install_step());

        StepExecutor::installer().invoke(&mut rt, &mut state).await.unwrap();

        assert!(state.plan_is_empty());
        let finished = &state.finished_steps[0];
        assert!(finished.skipped);
        assert_eq!(finished.output, SKIPPED_OUTPUT);
        let transcript = prompter.transcript();
        assert!(transcript.contains(&"Next step: Install dependencies".to_string()));
        assert!(transcript
            .iter()
            .any(|l| l.starts_with("Suggested commands:\nbrew install node")));
    }

    #[tokio::test]
    async fn test_step_for_other_agent_is_put_back() {
        let prompter = Arc::new(ScriptedPrompter::default());
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = state_with(install_step());

        StepExecutor::runner().invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.plan.as_ref().unwrap().len(), 1);
        assert!(state.finished_steps.is_empty());
        assert!(prompter.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_learn_more_then_continue_runs_tool_loop() {
        let terminal = FakeTerminal::ready().respond(["npm install", "added 5 packages", "$ "]);
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(LEARN_MORE),
            Answer::choice(CONTINUE),
        ]));
        let mut rt = testing::runtime(
            vec![
                MockReply::json(serde_json::json!({
                    "purpose": "Installs packages",
                    "actions": "Downloads npm dependencies",
                    "safe": "Yes"
                })),
                MockReply::tool_call("run_command_tool", serde_json::json!({"command": "npm install"})),
                MockReply::text("Dependencies installed."),
            ],
            prompter.clone(),
            vec![terminal],
        )
        .await;
        let mut state = state_with(install_step());

        StepExecutor::installer().invoke(&mut rt, &mut state).await.unwrap();

        let finished = &state.finished_steps[0];
        assert!(!finished.skipped);
        assert!(finished.output.contains("added 5 packages"));
        assert!(prompter.transcript().iter().any(|l| l.contains(
            "=== Step Explanation ===\nPurpose: Installs packages\nActions: Downloads npm dependencies\nSafe to run: Yes"
        )));

        let requests = rt.llm.provider().requests();
        assert!(requests[1].messages[1]
            .text()
            .starts_with("Requirement: Install dependencies"));
        assert_eq!(requests[1].tools.as_ref().unwrap().len(), Tool::ALL.len());
    }

    #[tokio::test]
    async fn test_failed_explanation_is_reported() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(LEARN_MORE),
            Answer::choice(SKIP),
        ]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = state_with(install_step());

        StepExecutor::installer().invoke(&mut rt, &mut state).await.unwrap();

        assert!(prompter
            .transcript()
            .iter()
            .any(|l| l.contains("Could not retrieve explanation:")));
        assert!(state.finished_steps[0].skipped);
    }

    #[tokio::test]
    async fn test_loop_failure_becomes_workflow_error() {
        let prompter = Arc::new(ScriptedPrompter::new([Answer::choice(CONTINUE)]));
        let mut rt = testing::runtime(vec![], prompter, vec![]).await;
        let mut step = install_step();
        step.assigned_agent = Node::RunnerAgent;
        let mut state = state_with(step);

        StepExecutor::runner().invoke(&mut rt, &mut state).await.unwrap();

        assert!(state.finished_steps.is_empty());
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].description, "Install dependencies");
        assert!(state.plan_is_empty());
    }
}
