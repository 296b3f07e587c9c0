//! The fixed node graph that drives a setup session.
//!
//! ```text
//! START -> guidelines -> tasks -> planner
//! planner -> installer | runner | verifier | END
//! installer, runner -> auditor -> planner
//! verifier -> planner | continue
//! continue -> tasks | planner | END
//! ```

use setup_agent_error::{Error, ErrorKind, Result};
use setup_agent_llm::LlmProvider;

use crate::agents::{Auditor, Planner, StepExecutor, SuccessVerifier};
use crate::nodes::{ContinueProcess, GuidelinesRetriever, TaskIdentifier};
use crate::runtime::Runtime;
use crate::state::{GraphState, Node};

/// Node visits allowed in one run
pub const RECURSION_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct Workflow {
    recursion_limit: usize,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            recursion_limit: RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Run until END, Ctrl-C or the first error. Shells are closed on
    /// every exit path.
    pub async fn run<P: LlmProvider>(&self, rt: &mut Runtime<P>) -> Result<GraphState> {
        let mut state = GraphState::new();

        let outcome = tokio::select! {
            res = self.drive(rt, &mut state) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted by user");
                Err(Error::new(ErrorKind::WorkflowAborted, "Interrupted by user")
                    .with_operation("workflow::run"))
            }
        };

        rt.shells.cleanup();
        tracing::info!(
            finished_steps = state.finished_steps.len(),
            finished_tasks = state.finished_tasks.len(),
            "workflow stopped"
        );
        outcome.map(|()| state)
    }

    async fn drive<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
    ) -> Result<()> {
        let mut node = route(Node::Start, state);
        let mut visits = 0;

        while node != Node::End {
            visits += 1;
            if visits > self.recursion_limit {
                return Err(Error::recursion_limit(self.recursion_limit)
                    .with_operation("workflow::drive")
                    .with_context("node", node.as_str()));
            }

            tracing::debug!(node = %node, visits, "entering node");
            self.visit(rt, state, node).await.map_err(|e| {
                tracing::error!(node = %node, "node failed: {}", e);
                e.with_context("node", node.as_str())
            })?;
            node = route(node, state);
        }
        Ok(())
    }

    async fn visit<P: LlmProvider>(
        &self,
        rt: &mut Runtime<P>,
        state: &mut GraphState,
        node: Node,
    ) -> Result<()> {
        match node {
            Node::GuidelinesRetrieverNode => GuidelinesRetriever.invoke(rt, state).await,
            Node::TaskIdentifierNode => TaskIdentifier.invoke(rt, state).await,
            Node::PlannerAgent => Planner.invoke(rt, state).await,
            Node::InstallerAgent => StepExecutor::installer().invoke(rt, state).await,
            Node::RunnerAgent => StepExecutor::runner().invoke(rt, state).await,
            Node::AuditorAgent => Auditor.invoke(rt, state).await,
            Node::SuccessVerifierAgent => SuccessVerifier.invoke(rt, state).await,
            Node::ContinueProcessNode => ContinueProcess.invoke(rt, state).await,
            Node::Start | Node::End => Ok(()),
        }
    }
}

/// Edge taken after `node` has run
pub fn route(node: Node, state: &GraphState) -> Node {
    match node {
        Node::Start => Node::GuidelinesRetrieverNode,
        Node::GuidelinesRetrieverNode => Node::TaskIdentifierNode,
        Node::TaskIdentifierNode => Node::PlannerAgent,
        Node::InstallerAgent | Node::RunnerAgent => Node::AuditorAgent,
        Node::AuditorAgent => Node::PlannerAgent,
        Node::PlannerAgent => match state.next_node {
            Some(next @ (Node::InstallerAgent | Node::RunnerAgent | Node::SuccessVerifierAgent)) => {
                next
            }
            _ => Node::End,
        },
        Node::SuccessVerifierAgent => match state.next_node {
            Some(Node::PlannerAgent) => Node::PlannerAgent,
            _ => Node::ContinueProcessNode,
        },
        Node::ContinueProcessNode => match state.next_node {
            Some(next @ (Node::TaskIdentifierNode | Node::PlannerAgent)) => next,
            _ => Node::End,
        },
        Node::End => Node::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::executor::SKIP;
    use crate::prompter::{Answer, ScriptedPrompter};
    use crate::testing;
    use setup_agent_llm::mock::MockReply;
    use std::fs;
    use std::sync::Arc;

    fn with_next(next: Node) -> GraphState {
        GraphState {
            next_node: Some(next),
            ..Default::default()
        }
    }

    #[test]
    fn test_routes() {
        let empty = GraphState::new();
        assert_eq!(route(Node::Start, &empty), Node::GuidelinesRetrieverNode);
        assert_eq!(route(Node::RunnerAgent, &empty), Node::AuditorAgent);
        assert_eq!(route(Node::AuditorAgent, &empty), Node::PlannerAgent);
        assert_eq!(
            route(Node::PlannerAgent, &with_next(Node::RunnerAgent)),
            Node::RunnerAgent
        );
        assert_eq!(
            route(Node::PlannerAgent, &with_next(Node::AuditorAgent)),
            Node::End
        );
        assert_eq!(route(Node::PlannerAgent, &empty), Node::End);
        assert_eq!(
            route(Node::SuccessVerifierAgent, &with_next(Node::PlannerAgent)),
            Node::PlannerAgent
        );
        assert_eq!(
            route(Node::SuccessVerifierAgent, &empty),
            Node::ContinueProcessNode
        );
        assert_eq!(
            route(Node::ContinueProcessNode, &with_next(Node::TaskIdentifierNode)),
            Node::TaskIdentifierNode
        );
        assert_eq!(
            route(Node::ContinueProcessNode, &with_next(Node::End)),
            Node::End
        );
    }

    async fn configured_runtime(
        dir: &tempfile::TempDir,
        replies: Vec<MockReply>,
        prompter: Arc<ScriptedPrompter>,
    ) -> Runtime<setup_agent_llm::mock::MockProvider> {
        fs::write(dir.path().join("README.md"), "Run `make dev`.").unwrap();
        let mut rt = testing::runtime_in(dir.path(), replies, prompter, vec![]).await;
        rt.config.guideline_files = vec![rt.config.project_root.join("README.md")];
        rt.config.task = Some("start the dev server".into());
        rt
    }

    #[tokio::test]
    async fn test_run_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let prompter = Arc::new(ScriptedPrompter::new([
            Answer::choice(SKIP),
            Answer::choice("Success - everything works as expected"),
            Answer::choice("Exit workflow"),
        ]));
        let mut rt = configured_runtime(
            &dir,
            vec![MockReply::json(serde_json::json!({"plan": []}))],
            prompter.clone(),
        )
        .await;

        let state = Workflow::new().run(&mut rt).await.unwrap();

        assert_eq!(state.chosen_task.as_deref(), Some("start the dev server"));
        assert_eq!(state.finished_steps.len(), 1);
        assert!(state.finished_steps[0].skipped);
        assert!(state.plan_is_empty());
        assert_eq!(state.next_node, Some(Node::End));
        assert_eq!(prompter.remaining(), 0);
        assert_eq!(rt.llm.provider().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = configured_runtime(
            &dir,
            vec![MockReply::json(serde_json::json!({"plan": []}))],
            Arc::new(ScriptedPrompter::default()),
        )
        .await;

        let err = Workflow::new()
            .with_recursion_limit(3)
            .run(&mut rt)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RecursionLimit);
        assert_eq!(err.context_value("node"), Some("INSTALLER_AGENT"));
    }

    #[tokio::test]
    async fn test_node_error_names_node() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt =
            configured_runtime(&dir, vec![], Arc::new(ScriptedPrompter::default())).await;

        let err = Workflow::new().run(&mut rt).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert_eq!(err.context_value("node"), Some("PLANNER_AGENT"));
    }
}
