//! Menu shown after a task has been verified

use setup_agent_error::Result;
use setup_agent_llm::LlmProvider;
use std::collections::HashSet;

use super::guidelines::select_guidelines;
use crate::prompter::labels;
use crate::runtime::Runtime;
use crate::state::{GraphState, Node};

const CONTINUE_NEXT: &str = "Continue with next task";
const PAUSE: &str = "Do nothing (keep shells active)";
const EXIT: &str = "Exit workflow";
pub const NEXT_TASK: &str = "Select the next task to continue with:";

pub struct ContinueProcess;

impl ContinueProcess {
    pub async fn invoke<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        let task = state.chosen_task.as_deref().unwrap_or("Unknown Task");
        let message = format!("Task \"{}\" completed. How would you like to proceed?", task);
        let choices = labels([CONTINUE_NEXT, PAUSE, EXIT]);

        loop {
            match rt.prompter.select(&message, &choices, 0)? {
                0 => return self.next_task(rt, state),
                1 => {
                    rt.announce("--- Workflow Paused ---");
                    rt.announce("Background shells are still running.");
                    rt.prompter
                        .wait_for_enter("Press [Enter] to return to the menu...")?;
                }
                _ => {
                    tracing::info!("exiting workflow at user request");
                    state.next_node = Some(Node::End);
                    return Ok(());
                }
            }
        }
    }

    fn next_task<P: LlmProvider>(&self, rt: &Runtime<P>, state: &mut GraphState) -> Result<()> {
        let updated = select_guidelines(
            rt.prompter.as_ref(),
            &rt.files,
            &state.possible_guideline_files,
            &state.selected_guideline_files,
        )?;
        let before: HashSet<_> = state
            .selected_guideline_files
            .iter()
            .map(|g| &g.file)
            .collect();
        let after: HashSet<_> = updated.iter().map(|g| &g.file).collect();
        let changed = before != after;

        state.selected_guideline_files = updated;
        state.plan = None;
        state.errors.clear();
        state.failed_steps.clear();

        if changed {
            tracing::info!("guideline files changed; identifying tasks again");
            state.possible_tasks.clear();
            state.next_node = Some(Node::TaskIdentifierNode);
            return Ok(());
        }

        if let Some(done) = state.chosen_task.take() {
            state.possible_tasks.retain(|t| *t != done);
            state.finished_tasks.push(done);
        }

        if state.possible_tasks.is_empty() {
            tracing::info!("no more tasks available");
            state.next_node = Some(Node::End);
            return Ok(());
        }

        let picked = rt.prompter.select(NEXT_TASK, &state.possible_tasks, 0)?;
        state.chosen_task = state.possible_tasks.get(picked).cloned();
        state.next_node = Some(Node::PlannerAgent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::guidelines::SELECT_GUIDELINES;
    use crate::prompter::{Answer, ScriptedPrompter};
    use crate::state::{GuidelineFile, Step, WorkflowError};
    use crate::testing;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn guideline(file: &str) -> GuidelineFile {
        GuidelineFile {
            file: file.into(),
            content: "docs".into(),
        }
    }

    fn finished_task_state() -> GraphState {
        GraphState {
            plan: Some(VecDeque::from([Step::new("left over", Node::RunnerAgent)])),
            errors: vec![WorkflowError::new("x", "y")],
            possible_guideline_files: vec![guideline("README.md"), guideline("docs/ios.md")],
            selected_guideline_files: vec![guideline("README.md")],
            possible_tasks: vec!["run the web app".into(), "run the iOS app".into()],
            chosen_task: Some("run the web app".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_continue_with_next_task() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(CONTINUE_NEXT),
            Answer::Default,
            Answer::choice("run the iOS app"),
        ]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = finished_task_state();

        ContinueProcess.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.next_node, Some(Node::PlannerAgent));
        assert_eq!(state.chosen_task.as_deref(), Some("run the iOS app"));
        assert_eq!(state.finished_tasks, vec!["run the web app"]);
        assert_eq!(state.possible_tasks, vec!["run the iOS app"]);
        assert!(state.plan.is_none());
        assert!(state.errors.is_empty());
        assert_eq!(
            prompter.transcript()[0],
            "Task \"run the web app\" completed. How would you like to proceed?"
        );
    }

    #[tokio::test]
    async fn test_changed_guidelines_reidentify_tasks() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(CONTINUE_NEXT),
            Answer::Choices(vec!["README.md".into(), "docs/ios.md".into()]),
        ]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = finished_task_state();

        ContinueProcess.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.next_node, Some(Node::TaskIdentifierNode));
        assert!(state.possible_tasks.is_empty());
        assert_eq!(state.selected_guideline_files.len(), 2);
        assert!(prompter.transcript().contains(&SELECT_GUIDELINES.to_string()));
    }

    #[tokio::test]
    async fn test_last_task_ends() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(CONTINUE_NEXT),
            Answer::Default,
        ]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = GraphState {
            possible_tasks: vec!["run the web app".into()],
            ..finished_task_state()
        };

        ContinueProcess.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.next_node, Some(Node::End));
        assert_eq!(state.finished_tasks, vec!["run the web app"]);
    }

    #[tokio::test]
    async fn test_pause_then_exit() {
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(PAUSE),
            Answer::Default,
            Answer::choice(EXIT),
        ]));
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let mut state = finished_task_state();

        ContinueProcess.invoke(&mut rt, &mut state).await.unwrap();

        assert_eq!(state.next_node, Some(Node::End));
        assert_eq!(state.chosen_task.as_deref(), Some("run the web app"));
        let transcript = prompter.transcript();
        assert!(transcript.contains(&"--- Workflow Paused ---".to_string()));
        assert_eq!(prompter.remaining(), 0);
    }
}
