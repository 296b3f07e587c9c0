//! Tools exposed to agents and the loop that lets a model call them.
//!
//! Each agent gets a subset of [`Tool`]. [`run_agent_loop`] sends the
//! conversation with those tool definitions, executes every requested call
//! against the [`Runtime`], and feeds the results back until the model
//! answers in plain text.

pub mod websearch;

use schemars::JsonSchema;
use serde::Deserialize;
use setup_agent_error::{Error, Result};
use setup_agent_llm::{
    schema_for, ChatMessage, CompletionRequest, LlmProvider, ToolCall, ToolDefinition,
};
use uuid::Uuid;

use crate::runtime::Runtime;
use crate::shell::{ArrowKey, KeyboardKey};

/// Model round trips allowed before a tool loop is abandoned
pub const AGENT_ITERATION_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    WebSearch,
    RunCommand,
    Authenticate,
    UserInput,
    PromptUserInput,
    PromptUserSelection,
    ArrowKeys,
    KeyboardKeys,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchArgs {
    /// Search query
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CommandArgs {
    /// The shell command to execute
    command: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PromptArgs {
    /// The question or instruction to show to the user
    prompt: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SelectionArgs {
    /// The question or instruction to show to the user
    prompt: String,
    /// Options the user can pick from
    choices: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ArrowKeysArgs {
    /// Arrow keys to send, in order
    arrow_keys: Vec<ArrowKey>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct KeyboardKeyArgs {
    /// The key to send
    key: KeyboardKey,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::WebSearch,
        Tool::RunCommand,
        Tool::Authenticate,
        Tool::UserInput,
        Tool::PromptUserInput,
        Tool::PromptUserSelection,
        Tool::ArrowKeys,
        Tool::KeyboardKeys,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::WebSearch => "websearch_tool",
            Tool::RunCommand => "run_command_tool",
            Tool::Authenticate => "authenticate_tool",
            Tool::UserInput => "user_input_tool",
            Tool::PromptUserInput => "prompt_user_input_tool",
            Tool::PromptUserSelection => "prompt_user_selection_tool",
            Tool::ArrowKeys => "use_arrow_keys_sequence",
            Tool::KeyboardKeys => "use_keyboard_keys",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            Tool::WebSearch => {
                "Search the web. Use it to look up installation instructions, error messages \
                 and tool documentation."
            }
            Tool::RunCommand => {
                "Run a shell command in the persistent interactive shell. Do not use it for \
                 sensitive data such as passwords. Returns needs_action, reason and the \
                 cleaned output."
            }
            Tool::Authenticate => {
                "Ask the user for their password and send it to the shell. Use it whenever a \
                 command asks for a sudo or other password."
            }
            Tool::UserInput => {
                "Show a message to the user, read their answer and send it to the shell. \
                 Returns the shell output after the answer."
            }
            Tool::PromptUserInput => {
                "Ask the user for a value, e.g. to fill placeholders or missing settings. The \
                 answer is returned to you, not sent to the shell. Do not use it for \
                 confirmations."
            }
            Tool::PromptUserSelection => {
                "Ask the user to pick one value from a list of choices, e.g. a file, an \
                 environment or a configuration value."
            }
            Tool::ArrowKeys => "Send a sequence of arrow key presses to the shell.",
            Tool::KeyboardKeys => "Send a single ENTER or CTRL_C key press to the shell.",
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let parameters = match self {
            Tool::WebSearch => schema_for::<SearchArgs>(),
            Tool::RunCommand => schema_for::<CommandArgs>(),
            Tool::Authenticate => schema_for::<NoArgs>(),
            Tool::UserInput | Tool::PromptUserInput => schema_for::<PromptArgs>(),
            Tool::PromptUserSelection => schema_for::<SelectionArgs>(),
            Tool::ArrowKeys => schema_for::<ArrowKeysArgs>(),
            Tool::KeyboardKeys => schema_for::<KeyboardKeyArgs>(),
        };
        ToolDefinition::new(self.name(), self.description()).with_parameters(parameters)
    }
}

pub fn definitions(tools: &[Tool]) -> Vec<ToolDefinition> {
    tools.iter().map(Tool::definition).collect()
}

/// Who is calling tools and where their shell commands go
#[derive(Debug, Clone)]
pub struct AgentScope<'a> {
    pub name: &'a str,
    pub shell_id: Option<Uuid>,
    pub tools: &'a [Tool],
}

/// Conversation after the model stopped calling tools
#[derive(Debug, Clone)]
pub struct AgentTranscript {
    pub messages: Vec<ChatMessage>,
    pub answer: String,
}

impl<P: LlmProvider> Runtime<P> {
    /// Execute one tool call. Failures become text for the model.
    pub async fn execute_tool(&mut self, scope: &AgentScope<'_>, call: &ToolCall) -> String {
        let result = match Tool::from_name(&call.name) {
            Some(tool) if scope.tools.contains(&tool) => self.dispatch(tool, scope, call).await,
            _ => Err(Error::unexpected(format!("unknown tool '{}'", call.name))
                .with_operation("tools::execute")),
        };
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(agent = scope.name, tool = %call.name, "tool failed: {}", e);
                format!("[Tool] Exception: {}", e)
            }
        };
        self.filter.apply(&text)
    }

    async fn dispatch(
        &mut self,
        tool: Tool,
        scope: &AgentScope<'_>,
        call: &ToolCall,
    ) -> Result<String> {
        tracing::info!(agent = scope.name, tool = tool.name(), "tool called: {}", call.arguments);
        let shell_id = scope.shell_id;

        match tool {
            Tool::WebSearch => {
                let args: SearchArgs = call.parse_arguments()?;
                let search = self.search.as_ref().ok_or_else(|| {
                    Error::search_failed("web search is not configured; set TAVILY_API_KEY")
                        .with_operation("tools::websearch")
                })?;
                Ok(search.search(&args.query).await?.to_tool_result())
            }
            Tool::RunCommand => {
                let args: CommandArgs = call.parse_arguments()?;
                let shell = self.shells.get_shell(shell_id);
                let output = shell
                    .run_command(&self.llm, self.prompter.as_ref(), &args.command)
                    .await?;
                Ok(output.to_tool_result())
            }
            Tool::Authenticate => {
                let shell = self.shells.get_shell(shell_id);
                let output = shell.authenticate(&self.llm, self.prompter.as_ref()).await?;
                Ok(output.to_tool_result())
            }
            Tool::UserInput => {
                let args: PromptArgs = call.parse_arguments()?;
                let answer = self.prompter.input(&format!("[Agent] {}\n> ", args.prompt))?;
                let shell = self.shells.get_shell(shell_id);
                let output = shell.send_line(&self.llm, &answer, false).await?;
                Ok(output.to_tool_result())
            }
            Tool::PromptUserInput => {
                let args: PromptArgs = call.parse_arguments()?;
                let answer = self
                    .prompter
                    .input(&format!("\n[{}] {}", scope.name, args.prompt))?;
                Ok(answer.trim().to_string())
            }
            Tool::PromptUserSelection => {
                let args: SelectionArgs = call.parse_arguments()?;
                if args.choices.is_empty() {
                    return Err(Error::prompt_failed("No choices provided for selection.")
                        .with_operation("tools::prompt_user_selection"));
                }
                let index = self.prompter.select(
                    &format!("[{}] {}", scope.name, args.prompt),
                    &args.choices,
                    0,
                )?;
                Ok(args.choices[index].trim().to_string())
            }
            Tool::ArrowKeys => {
                let args: ArrowKeysArgs = call.parse_arguments()?;
                let sequence: String = args.arrow_keys.iter().map(ArrowKey::sequence).collect();
                let shell = self.shells.get_shell(shell_id);
                Ok(shell.send(&self.llm, &sequence, false).await?.to_tool_result())
            }
            Tool::KeyboardKeys => {
                let args: KeyboardKeyArgs = call.parse_arguments()?;
                let shell = self.shells.get_shell(shell_id);
                let output = match args.key {
                    KeyboardKey::Enter => shell.send_line(&self.llm, "", false).await?,
                    KeyboardKey::CtrlC => shell.send_control(&self.llm, 'c').await?,
                };
                Ok(output.to_tool_result())
            }
        }
    }
}

/// Let the model call tools until it answers without any
pub async fn run_agent_loop<P: LlmProvider>(
    rt: &mut Runtime<P>,
    scope: &AgentScope<'_>,
    mut messages: Vec<ChatMessage>,
) -> Result<AgentTranscript> {
    let tools = definitions(scope.tools);

    for iteration in 0..AGENT_ITERATION_LIMIT {
        let request = CompletionRequest::new(messages.clone()).with_tools(tools.clone());
        let response = rt.llm.complete(request).await?;
        tracing::debug!(agent = scope.name, iteration, calls = response.tool_calls.len(), "model replied");

        if response.tool_calls.is_empty() {
            let answer = response.content.unwrap_or_default();
            messages.push(ChatMessage::assistant(answer.clone()));
            return Ok(AgentTranscript { messages, answer });
        }

        messages.push(ChatMessage::assistant_tool_calls(
            response.content.clone(),
            response.tool_calls.clone(),
        ));
        for call in &response.tool_calls {
            let result = rt.execute_tool(scope, call).await;
            messages.push(ChatMessage::tool_result(call.id.clone(), result));
        }
    }

    Err(Error::recursion_limit(AGENT_ITERATION_LIMIT)
        .with_operation("tools::run_agent_loop")
        .with_context("agent", scope.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompter::{Answer, ScriptedPrompter};
    use crate::shell::FakeTerminal;
    use crate::testing;
    use setup_agent_llm::mock::MockReply;
    use setup_agent_llm::Role;
    use std::sync::Arc;

    #[test]
    fn test_definitions_carry_schemas() {
        let defs = definitions(&[Tool::RunCommand, Tool::ArrowKeys]);
        assert_eq!(defs[0].name, "run_command_tool");
        assert_eq!(defs[0].parameters["properties"]["command"]["type"], "string");
        assert_eq!(defs[1].parameters["properties"]["arrow_keys"]["type"], "array");
        assert_eq!(Tool::from_name("use_keyboard_keys"), Some(Tool::KeyboardKeys));
        assert_eq!(Tool::from_name("rm_rf_tool"), None);
    }

    #[tokio::test]
    async fn test_loop_runs_command_then_answers() {
        let terminal = FakeTerminal::ready().respond(["ls", "Cargo.toml src", "$ "]);
        let written = terminal.written();
        let prompter = Arc::new(ScriptedPrompter::default());
        let mut rt = testing::runtime(
            vec![
                MockReply::tool_call("run_command_tool", serde_json::json!({"command": "ls"})),
                MockReply::text("Listed the project."),
            ],
            prompter,
            vec![terminal],
        )
        .await;

        let scope = AgentScope {
            name: "RunnerAgent",
            shell_id: None,
            tools: &[Tool::RunCommand],
        };
        let transcript = run_agent_loop(&mut rt, &scope, vec![ChatMessage::user("list files")])
            .await
            .unwrap();

        assert_eq!(transcript.answer, "Listed the project.");
        assert!(written.lock().unwrap().iter().any(|w| w == "ls\n"));
        let tool_msg = transcript
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.text().contains("Cargo.toml src"));
        assert!(rt.shells.get_shell(None).step_buffer().contains("Cargo.toml src"));
    }

    #[tokio::test]
    async fn test_tool_results_mask_personal_information() {
        let prompter = Arc::new(ScriptedPrompter::new([Answer::text(
            "db_password=\"hunter2-Zx8Kq9Lm3Np7Qr5Tv1Wy6\" region=eu",
        )]));
        let mut rt = testing::runtime(vec![], prompter, vec![]).await;
        let scope = AgentScope {
            name: "InstallerAgent",
            shell_id: None,
            tools: &[Tool::PromptUserInput],
        };
        let call = ToolCall {
            id: "1".into(),
            name: "prompt_user_input_tool".into(),
            arguments: r#"{"prompt": "Paste your settings"}"#.into(),
        };

        let result = rt.execute_tool(&scope, &call).await;
        assert!(result.contains("[REDACTED_PERSONAL_INFORMATION]"));
        assert!(!result.contains("Zx8Kq9Lm3Np7Qr5Tv1Wy6"));
        assert!(result.contains("region=eu"));
    }

    #[tokio::test]
    async fn test_failures_become_tool_text() {
        let prompter = Arc::new(ScriptedPrompter::default());
        let mut rt = testing::runtime(vec![], prompter.clone(), vec![]).await;
        let scope = AgentScope {
            name: "InstallerAgent",
            shell_id: None,
            tools: &[Tool::PromptUserSelection, Tool::WebSearch],
        };

        let empty = ToolCall {
            id: "1".into(),
            name: "prompt_user_selection_tool".into(),
            arguments: r#"{"prompt": "Pick", "choices": []}"#.into(),
        };
        let result = rt.execute_tool(&scope, &empty).await;
        assert!(result.starts_with("[Tool] Exception:"));
        assert!(result.contains("No choices provided"));

        let search = ToolCall {
            id: "2".into(),
            name: "websearch_tool".into(),
            arguments: r#"{"query": "poetry"}"#.into(),
        };
        assert!(rt.execute_tool(&scope, &search).await.contains("TAVILY_API_KEY"));

        let not_granted = ToolCall {
            id: "3".into(),
            name: "run_command_tool".into(),
            arguments: r#"{"command": "ls"}"#.into(),
        };
        assert!(rt.execute_tool(&scope, &not_granted).await.contains("unknown tool"));
        assert!(prompter.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_selection_and_keys() {
        let terminal = FakeTerminal::ready()
            .respond(["\x1b[B\x1b[B", "> option 3"])
            .respond(["^C", "$ "]);
        let written = terminal.written();
        let prompter = Arc::new(ScriptedPrompter::new([Answer::choice("staging")]));
        let mut rt = testing::runtime(
            vec![MockReply::json(serde_json::json!({"needs_action": true, "reason": "menu"}))],
            prompter,
            vec![terminal],
        )
        .await;
        let scope = AgentScope {
            name: "InstallerAgent",
            shell_id: None,
            tools: &Tool::ALL,
        };

        let select = ToolCall {
            id: "1".into(),
            name: "prompt_user_selection_tool".into(),
            arguments: r#"{"prompt": "Environment?", "choices": ["dev", "staging"]}"#.into(),
        };
        assert_eq!(rt.execute_tool(&scope, &select).await, "staging");

        let arrows = ToolCall {
            id: "2".into(),
            name: "use_arrow_keys_sequence".into(),
            arguments: r#"{"arrow_keys": ["DOWN", "DOWN"]}"#.into(),
        };
        let result = rt.execute_tool(&scope, &arrows).await;
        assert!(result.contains("\"needs_action\":true"));

        let ctrl_c = ToolCall {
            id: "3".into(),
            name: "use_keyboard_keys".into(),
            arguments: r#"{"key": "CTRL_C"}"#.into(),
        };
        let result = rt.execute_tool(&scope, &ctrl_c).await;
        assert!(result.contains("\"needs_action\":false"));

        let written = written.lock().unwrap();
        assert_eq!(written[1], "\x1b[B\x1b[B");
        assert_eq!(written[2], "\x03");
    }

    #[tokio::test]
    async fn test_loop_gives_up_after_limit() {
        let replies = (0..AGENT_ITERATION_LIMIT)
            .map(|_| MockReply::tool_call("prompt_user_input_tool", serde_json::json!({"prompt": "?"})))
            .collect();
        let prompter = Arc::new(ScriptedPrompter::new(
            (0..AGENT_ITERATION_LIMIT).map(|_| Answer::text("again")),
        ));
        let mut rt = testing::runtime(replies, prompter, vec![]).await;
        let scope = AgentScope {
            name: "RunnerAgent",
            shell_id: None,
            tools: &[Tool::PromptUserInput],
        };

        let err = run_agent_loop(&mut rt, &scope, vec![ChatMessage::user("go")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), setup_agent_error::ErrorKind::RecursionLimit);
    }
}
