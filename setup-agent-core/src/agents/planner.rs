//! Turns guidelines, failures and reported errors into the step plan

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::LlmProvider;
use std::collections::VecDeque;

use super::prompts;
use crate::runtime::Runtime;
use crate::state::{GraphState, Node, PlannedStep, Step, Substep};

pub const NO_GUIDELINES_STEP: &str = "No README found - unable to plan installation.";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadmeAnalysis {
    /// Ordered steps that achieve the goal, each with substeps, the agent that
    /// runs it and whether it needs its own shell
    pub plan: Vec<PlannedStep>,
}

fn cd_substep(root: &str) -> Substep {
    Substep {
        description: "Navigate to the project root directory".to_string(),
        suggested_commands: vec![format!("cd {}", shell_words::quote(root))],
    }
}

fn cd_step(root: &str) -> Step {
    Step::new("Navigate to the App project directory", Node::InstallerAgent)
        .with_substeps(vec![cd_substep(root)])
}

pub struct Planner;

impl Planner {
    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        tracing::info!("planning unified step sequence");

        if state.plan.is_none() {
            self.first_analysis(rt, state).await?;
        }
        self.handle_failed_steps(rt, state).await?;
        self.handle_errors(rt, state).await?;
        self.decide_next_agent(state);
        Ok(())
    }

    async fn first_analysis<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        if state.selected_guideline_files.is_empty() {
            tracing::warn!("no guideline files selected; nothing to plan from");
            state.plan = Some(VecDeque::from([Step::new(
                NO_GUIDELINES_STEP,
                Node::InstallerAgent,
            )]));
            return Ok(());
        }

        let root = rt.config.project_root.display().to_string();
        let input = format!(
            "raw_texts: {}\nproject_root:{}\n**GOAL**: {}",
            state.merged_guidelines(),
            root,
            state.chosen_task.as_deref().unwrap_or_default()
        );
        let analysis: ReadmeAnalysis = rt
            .llm
            .invoke(&prompts::planning_prompt(prompts::FIRST_GUIDELINES_ANALYSIS), &input)
            .await?;

        let mut steps = vec![cd_step(&root)];
        steps.extend(analysis.plan.into_iter().map(Step::from));
        let steps = self.assign_shells(rt, steps).await?;
        tracing::info!(steps = steps.len(), "initial plan ready");
        state.plan = Some(steps.into());
        Ok(())
    }

    /// New fixes first, then the failed steps again, then the rest
    async fn handle_failed_steps<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        if state.failed_steps.is_empty() {
            return Ok(());
        }

        let failed = serde_json::to_string_pretty(&state.failed_steps).unwrap_or_default();
        let analysis: ReadmeAnalysis = rt
            .llm
            .invoke(
                &prompts::planning_prompt(prompts::HANDLE_FAILED_STEPS),
                &format!("failed_steps: {}", failed),
            )
            .await?;

        let fixes = self
            .assign_shells(rt, analysis.plan.into_iter().map(Step::from).collect())
            .await?;
        let retried = std::mem::take(&mut state.failed_steps)
            .into_iter()
            .map(|f| f.step);
        let rest = state.plan.take().unwrap_or_default();
        tracing::info!(fixes = fixes.len(), "replanned after failed steps");

        state.plan = Some(fixes.into_iter().chain(retried).chain(rest).collect());
        Ok(())
    }

    async fn handle_errors<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        if state.errors.is_empty() {
            return Ok(());
        }

        let errors = serde_json::to_string_pretty(&state.errors).unwrap_or_default();
        let analysis: ReadmeAnalysis = rt
            .llm
            .invoke(
                &prompts::planning_prompt(prompts::HANDLE_ERRORS),
                &format!("errors: {}", errors),
            )
            .await?;

        let fixes = self
            .assign_shells(rt, analysis.plan.into_iter().map(Step::from).collect())
            .await?;
        let rest = state.plan.take().unwrap_or_default();
        tracing::info!(fixes = fixes.len(), "replanned after errors");

        state.plan = Some(fixes.into_iter().chain(rest).collect());
        state.errors.clear();
        Ok(())
    }

    /// Steps with long-running processes get a fresh shell that starts in
    /// the project root
    async fn assign_shells<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        mut steps: Vec<Step>,
    ) -> Result<Vec<Step>> {
        let root = rt.config.project_root.display().to_string();
        for step in steps.iter_mut().filter(|s| s.run_in_separate_shell) {
            step.substeps.insert(0, cd_substep(&root));
            step.shell_id = Some(rt.shells.register_new_shell().await?);
        }
        Ok(steps)
    }

    fn decide_next_agent(&self, state: &mut GraphState) {
        let next = match state.plan.as_ref().and_then(|p| p.front()) {
            Some(step) => step.assigned_agent,
            None => Node::SuccessVerifierAgent,
        };
        tracing::info!(next = %next, "planner routing");
        state.next_node = Some(next);
    }
}
