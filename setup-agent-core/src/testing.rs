//! Shared fixtures for unit tests

use setup_agent_llm::mock::{MockProvider, MockReply};
use setup_agent_llm::{LlmSettings, StructuredLlm};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SetupConfig;
use crate::prompter::{Prompter, ScriptedPrompter};
use crate::runtime::Runtime;
use crate::shell::{FakeTerminal, ShellOptions, ShellRegistry, Terminal, TerminalFactory};

/// A structured client that serves `replies` in order, without retries
pub(crate) fn llm(replies: Vec<MockReply>) -> StructuredLlm<MockProvider> {
    let provider = MockProvider::new();
    for reply in replies {
        provider.push(reply);
    }
    let settings = LlmSettings {
        max_retries: 0,
        ..Default::default()
    };
    StructuredLlm::new(provider, settings).with_backoff(Duration::ZERO)
}

pub(crate) fn shell_options() -> ShellOptions {
    ShellOptions {
        init_timeout: Duration::from_millis(200),
        read_timeout: Duration::from_millis(30),
        log_file: None,
    }
}

/// Every new shell answers its startup line and nothing else
pub(crate) fn fake_factory() -> TerminalFactory {
    Box::new(|| Ok(Box::new(FakeTerminal::ready()) as Box<dyn Terminal>))
}

/// Hands out `terminals` in order, then plain ready terminals
pub(crate) fn scripted_factory(terminals: Vec<FakeTerminal>) -> TerminalFactory {
    let queue = Mutex::new(terminals.into_iter().collect::<VecDeque<_>>());
    Box::new(move || {
        let next = queue.lock().ok().and_then(|mut q| q.pop_front());
        Ok(Box::new(next.unwrap_or_else(FakeTerminal::ready)) as Box<dyn Terminal>)
    })
}

/// A runtime rooted in the system temp dir
pub(crate) async fn runtime(
    replies: Vec<MockReply>,
    prompter: Arc<ScriptedPrompter>,
    terminals: Vec<FakeTerminal>,
) -> Runtime<MockProvider> {
    runtime_in(&std::env::temp_dir(), replies, prompter, terminals).await
}

/// A runtime over scripted model replies, answers and shells. The first
/// terminal backs the main shell.
pub(crate) async fn runtime_in(
    root: &Path,
    replies: Vec<MockReply>,
    prompter: Arc<ScriptedPrompter>,
    terminals: Vec<FakeTerminal>,
) -> Runtime<MockProvider> {
    let config = SetupConfig::new(root).unwrap();
    let shells = ShellRegistry::start(scripted_factory(terminals), shell_options())
        .await
        .unwrap();
    Runtime::new(config, llm(replies), prompter as Arc<dyn Prompter>, shells).unwrap()
}
