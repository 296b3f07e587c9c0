//! Verifies the last finished step and records failures for the planner

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::{ChatMessage, LlmProvider};

use super::executor::finished_text;
use super::prompts;
use crate::runtime::Runtime;
use crate::state::{FailedStep, FinishedStep, GraphState, Node};
use crate::tools::{run_agent_loop, AgentScope, Tool};

/// Trailing characters of step output the auditor looks at
pub const OUTPUT_WINDOW: usize = 65536;
pub const NO_OUTPUT: &str = "No output recorded.";
pub const AUDITOR_EXCEPTION: &str = "Auditor exception";

const AUDITOR_TOOLS: [Tool; 2] = [Tool::WebSearch, Tool::RunCommand];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AuditorVerdict {
    /// True if the step achieved its outcome without critical errors
    pub success: bool,
    /// What went wrong; empty on success
    #[serde(default)]
    pub reason: String,
    /// Instructions for the planner to fix the failure; empty on success
    #[serde(default)]
    pub guidance: String,
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

pub struct Auditor;

impl Auditor {
    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        state.next_node = Some(Node::PlannerAgent);

        let Some((last, previous)) = state.finished_steps.split_last() else {
            tracing::warn!("no finished steps to verify");
            return Ok(());
        };
        if last.skipped {
            tracing::info!("last step was skipped; back to the planner");
            return Ok(());
        }

        let last = last.clone();
        let previous = finished_text(previous);
        tracing::info!("verifying last step: {}", last.step.description);

        match self.verify(rt, &last, &previous).await {
            Ok(verdict) if verdict.success => {
                tracing::info!("step verified: {}", last.step.description);
            }
            Ok(verdict) => {
                tracing::error!(
                    "step failed: {}. Reason: {}, Guidance: {}",
                    last.step.description,
                    verdict.reason,
                    verdict.guidance
                );
                state.failed_steps.push(FailedStep {
                    step: last.step,
                    reason: verdict.reason,
                    guidance: verdict.guidance,
                });
            }
            Err(e) => {
                tracing::error!("verification failed: {}", e);
                state.failed_steps.push(FailedStep {
                    step: last.step,
                    reason: AUDITOR_EXCEPTION.to_string(),
                    guidance: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Investigate with tools, then condense the findings into a verdict
    async fn verify<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        last: &FinishedStep,
        previous: &str,
    ) -> Result<AuditorVerdict> {
        let output = if last.output.is_empty() {
            NO_OUTPUT
        } else {
            tail(&last.output, OUTPUT_WINDOW)
        };
        let prompt = prompts::render(
            prompts::VERIFICATION,
            &[
                ("step", last.step.description.as_str()),
                ("previous", previous),
                ("output", output),
            ],
        );

        let scope = AgentScope {
            name: Node::AuditorAgent.as_str(),
            shell_id: None,
            tools: &AUDITOR_TOOLS,
        };
        let transcript = run_agent_loop(
            rt,
            &scope,
            vec![
                ChatMessage::system(prompts::AUDITOR_DESCRIPTION),
                ChatMessage::user(prompt.clone()),
            ],
        )
        .await?;

        let findings = format!(
            "{}\n\nFindings:\n{}\n\n{}",
            prompt,
            transcript.answer,
            prompts::AUDITOR_VERDICT
        );
        rt.llm
            .invoke::<AuditorVerdict>(prompts::AUDITOR_DESCRIPTION, &findings)
            .await
    }
}
