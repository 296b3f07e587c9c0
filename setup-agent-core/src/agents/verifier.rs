//! Asks the user how the task went and collects what broke
//!
//! A successful outcome routes to the continue-process menu. Anything else
//! starts a short troubleshooting conversation: the user describes the
//! problem, the model asks up to [`MAX_CLARIFICATIONS`] follow-up questions,
//! and every answer lands in `state.errors` for the planner to fix.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::{ChatMessage, CompletionRequest, LlmProvider, Role};

use super::prompts;
use crate::prompter::labels;
use crate::runtime::Runtime;
use crate::state::{GraphState, Node, WorkflowError};

pub const MAX_CLARIFICATIONS: usize = 5;
/// Messages of the conversation the shutdown check looks at
const RECENT_HISTORY: usize = 6;

const OUTCOME_PROMPT: &str = "How did the installation/execution process go?";
const OUTCOMES: [&str; 3] = [
    "Success - everything works as expected",
    "Partial success - works but with errors",
    "Failure - critical error occurred",
];

const CATEGORY_PROMPT: &str = "What is the nature of the problem?";
const CATEGORIES: [&str; 5] = [
    "Terminal error (Exception/Traceback)",
    "Missing expected file/directory",
    "Application does not start (hang/freeze)",
    "Incorrect output/logic",
    "Other issue",
];
const DETAILS_PROMPT: &str = "Please describe the details or paste the error log:";
const NO_DETAILS: &str = "User provided no details.";
pub const USER_REPORTED_ISSUE: &str = "User reported issue";

const PROCEED_PROMPT: &str = "How would you like to proceed?";
const PROCEED: [&str; 3] = [
    "Answer the question",
    "Skip this question",
    "Stop questioning and start fixing",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    End,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShutdownDecision {
    /// 'end' to stop collecting issues, 'continue' to ask for another one
    pub decision: Decision,
    #[serde(default)]
    pub reason: String,
}

pub struct SuccessVerifier;

impl SuccessVerifier {
    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        let outcome = rt.prompter.select(OUTCOME_PROMPT, &labels(OUTCOMES), 0)?;
        if outcome == 0 {
            tracing::info!("user confirmed success");
            state.next_node = Some(Node::ContinueProcessNode);
            return Ok(());
        }

        let severity = if outcome == 1 { "PARTIAL" } else { "FAILURE" };
        let mut history = Vec::new();
        loop {
            let problem = self.collect_issue(rt, state, severity)?;
            history.push(ChatMessage::user(problem.clone()));
            self.clarify(rt, state, &problem, &mut history).await?;
            if self.should_end(rt, &history).await {
                break;
            }
        }

        tracing::info!(errors = state.errors.len(), "collected user-reported issues");
        state.next_node = Some(if state.errors.is_empty() {
            Node::ContinueProcessNode
        } else {
            Node::PlannerAgent
        });
        Ok(())
    }

    fn collect_issue<P: LlmProvider>(
        &self,
        rt: &Runtime<P>,
        state: &mut GraphState,
        severity: &str,
    ) -> Result<String> {
        let category = rt
            .prompter
            .select(CATEGORY_PROMPT, &labels(CATEGORIES), 0)?;
        let details = rt.prompter.input(DETAILS_PROMPT)?;
        let details = match details.trim() {
            "" => NO_DETAILS,
            text => text,
        };

        let problem = format!(
            "[{}] Category: {}. Details: {}",
            severity, CATEGORIES[category], details
        );
        state
            .errors
            .push(WorkflowError::new(USER_REPORTED_ISSUE, problem.clone()));
        Ok(problem)
    }

    async fn clarify<P: LlmProvider>(
        &self,
        rt: &Runtime<P>,
        state: &mut GraphState,
        problem: &str,
        history: &mut Vec<ChatMessage>,
    ) -> Result<()> {
        let system = prompts::render(
            prompts::COLLECT_USER_ERRORS,
            &[("problem_description", problem)],
        );

        for n in 1..=MAX_CLARIFICATIONS {
            let mut messages = vec![ChatMessage::system(system.as_str())];
            messages.extend(history.iter().cloned());

            let question = match rt.llm.complete(CompletionRequest::new(messages)).await {
                Ok(response) => response.content.unwrap_or_default().trim().to_string(),
                Err(e) => {
                    tracing::warn!("could not generate a clarifying question: {}", e);
                    break;
                }
            };
            if question.is_empty() {
                break;
            }

            rt.announce(&format!("\nClarifying question ({}/{}):", n, MAX_CLARIFICATIONS));
            rt.announce(&format!("\"{}\"", question));

            match rt.prompter.select(PROCEED_PROMPT, &labels(PROCEED), 0)? {
                0 => {
                    let reply = rt.prompter.input("Your answer:")?;
                    let reply = reply.trim();
                    if reply.is_empty() {
                        continue;
                    }
                    state.errors.push(WorkflowError::new(
                        format!("Clarification: {}", question),
                        reply,
                    ));
                    history.push(ChatMessage::assistant(question));
                    history.push(ChatMessage::user(reply));
                }
                1 => continue,
                _ => break,
            }
        }
        Ok(())
    }

    /// Ends unless the model is confident the user has more to report
    async fn should_end<P: LlmProvider>(&self, rt: &Runtime<P>, history: &[ChatMessage]) -> bool {
        if history.len() < 2 {
            return true;
        }

        // the conversation handed over must open with the user
        let recent = &history[history.len().saturating_sub(RECENT_HISTORY)..];
        let start = recent.iter().position(|m| m.role == Role::User).unwrap_or(0);
        let recent = &recent[start..];
        let mut messages = vec![ChatMessage::system(prompts::SHOULD_END_CONVERSATION)];
        messages.extend(recent.iter().cloned());

        match rt.llm.invoke_messages::<ShutdownDecision>(messages).await {
            Ok(decision) => {
                tracing::debug!(
                    decision = ?decision.decision,
                    reason = %decision.reason,
                    "shutdown check"
                );
                decision.decision == Decision::End
            }
            Err(e) => {
                tracing::warn!("shutdown check failed: {}", e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompter::{Answer, ScriptedPrompter};
    use crate::testing;
    use setup_agent_llm::mock::MockReply;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_routes_to_continue() {
        let prompter = Arc::new(ScriptedPrompter::new([Answer::choice(OUTCOMES[0])]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = GraphState::new();

        SuccessVerifier.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.next_node, Some(Node::ContinueProcessNode));
        assert!(state.errors.is_empty());
        assert!(rt.llm.provider().requests().is_empty());
    }

    #[tokio::test]
    async fn test_failure_with_clarification() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(OUTCOMES[2]),
            Answer::choice(CATEGORIES[0]),
            Answer::text("  ModuleNotFoundError: flask  "),
            Answer::choice(PROCEED[0]),
            Answer::text("python 3.12"),
        ]));
        let mut rt = testing::runtime(
            vec![
                MockReply::text("Which Python version are you using?"),
                MockReply::text(""),
                MockReply::json(serde_json::json!({"decision": "end", "reason": "done"})),
            ],
            prompter.clone(),
            vec![],
        )
        .await;
        let mut state = GraphState::new();

        SuccessVerifier.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.next_node, Some(Node::PlannerAgent));
        assert_eq!(state.errors.len(), 2);
        assert_eq!(state.errors[0].description, USER_REPORTED_ISSUE);
        assert_eq!(
            state.errors[0].error,
            "[FAILURE] Category: Terminal error (Exception/Traceback). \
             Details: ModuleNotFoundError: flask"
        );
        assert_eq!(
            state.errors[1].description,
            "Clarification: Which Python version are you using?"
        );
        assert_eq!(state.errors[1].error, "python 3.12");

        let transcript = prompter.transcript();
        assert!(transcript.contains(&"\nClarifying question (1/5):".to_string()));
        assert!(transcript.contains(&"\"Which Python version are you using?\"".to_string()));

        let requests = rt.llm.provider().requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].messages[0].text().contains("[FAILURE] Category"));
        // issue, question, answer
        assert_eq!(requests[2].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_partial_without_details_stops_questioning() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(OUTCOMES[1]),
            Answer::choice(CATEGORIES[4]),
            Answer::text(""),
            Answer::choice(PROCEED[2]),
        ]));
        let mut rt = testing::runtime(
            vec![MockReply::text("What did you expect to see?")],
            prompter.clone(),
            vec![],
        )
        .await;
        let mut state = GraphState::new();

        SuccessVerifier.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.errors.len(), 1);
        assert_eq!(
            state.errors[0].error,
            "[PARTIAL] Category: Other issue. Details: User provided no details."
        );
        assert_eq!(state.next_node, Some(Node::PlannerAgent));
        // a single history message ends without asking the model
        assert_eq!(rt.llm.provider().requests().len(), 1);
        assert_eq!(prompter.remaining(), 0);
    }

    #[tokio::test]
    async fn test_continue_decision_collects_another_issue() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(OUTCOMES[2]),
            Answer::choice(CATEGORIES[1]),
            Answer::text("no dist folder"),
            Answer::choice(PROCEED[0]),
            Answer::text("the build printed nothing"),
            Answer::choice(CATEGORIES[2]),
            Answer::text("server hangs"),
        ]));
        let mut rt = testing::runtime(
            vec![
                MockReply::text("Did the build finish?"),
                MockReply::text(""),
                MockReply::json(serde_json::json!({"decision": "continue", "reason": "more"})),
                MockReply::network_error("offline"),
            ],
            prompter.clone(),
            vec![],
        )
        .await;
        let mut state = GraphState::new();

        SuccessVerifier.invoke(&mut rt, &mut state).await.unwrap();

        let descriptions: Vec<_> = state.errors.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                USER_REPORTED_ISSUE,
                "Clarification: Did the build finish?",
                USER_REPORTED_ISSUE
            ]
        );
        assert!(state.errors[2].error.contains("server hangs"));
        assert_eq!(state.next_node, Some(Node::PlannerAgent));
    }
}
