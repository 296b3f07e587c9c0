//! A persistent shell session whose output is streamed and reviewed.
//!
//! Commands are written to a [`Terminal`] and output is read in chunks.
//! A chunk ending in the `$` prompt finishes the command. When the output
//! goes quiet the model is asked whether the shell waits for input, and
//! for background shells whether a long-running process is up.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::{Error, ErrorKind, Result};
use setup_agent_llm::{LlmProvider, StructuredLlm};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::clean::{clean_chunk, is_progress_noise};
use super::security::{SecurityContext, SecurityVerdictAction, ShellSecurityGuard};
use super::terminal::Terminal;
use crate::prompter::Prompter;

pub const MAIN_SHELL_ID: &str = "MAIN";

const LONG_RUNNING_PREFIX: &str =
    "Long-running process is running stable and can be left unsupervised. ";

const REVIEW_FOR_INTERACTION: &str = "\
You are a command-line assistant. Look at the shell output below and decide whether \
the terminal is blocked, waiting for a human to type something.

Signs of waiting:
- an input prompt such as `>`, `?`, `>>>` or a question ending in a colon
- confirmations like \"Continue? (y/n)\" or \"[Y/n]\"
- password or passphrase requests
- interactive menus asking for a selection

Output that is still scrolling, or a command that has finished, does not need action.
Quote the string that shows the shell is waiting in the reason.";

const REVIEW_LONG_RUNNING: &str = "\
You are watching a shell that runs a long-lived process in the background, such as a \
development server, a database or a file watcher. Classify the process from its output:
- initializing: still starting up, compiling or downloading
- running: started successfully and serving or watching (e.g. \"Listening on port 3000\", \
\"ready in 1.2s\", \"Compiled successfully\")
- error: crashed, exited, or reported a fatal error such as a port already in use

Cite the lines that support the classification in the reason.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InteractionReview {
    /// True if the terminal is blocked waiting for human input
    pub needs_action: bool,
    /// Why, quoting the prompt found in the output when there is one
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    #[default]
    Initializing,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LongRunningReview {
    /// Lifecycle phase of the background process
    #[serde(default)]
    pub state: ProcessState,
    /// Evidence for the classification
    pub reason: String,
}

/// Result of streaming a command or key sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamToShellOutput {
    /// True if the shell needs input before it can go on
    pub needs_action: bool,
    pub reason: Option<String>,
    pub output: String,
}

impl StreamToShellOutput {
    pub fn done(output: impl Into<String>) -> Self {
        Self {
            needs_action: false,
            reason: None,
            output: output.into(),
        }
    }

    /// Serialized form handed back to a model as a tool result
    pub fn to_tool_result(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.output.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// How long to wait for the first prompt
    pub init_timeout: Duration,
    /// Quiet period after which output is reviewed
    pub read_timeout: Duration,
    /// Transcript file shared by all shells
    pub log_file: Option<PathBuf>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(2),
            log_file: None,
        }
    }
}

fn mask(sequence: &str, hide: bool) -> String {
    if hide {
        "*".repeat(sequence.chars().count())
    } else {
        sequence.to_string()
    }
}

fn mask_in_text(text: &str, sequence: &str, hide: bool) -> String {
    if hide && !sequence.is_empty() {
        text.replace(sequence, &mask(sequence, true))
    } else {
        text.to_string()
    }
}

pub struct InteractiveShell {
    id: Option<Uuid>,
    terminal: Box<dyn Terminal>,
    security: Arc<SecurityContext>,
    options: ShellOptions,
    buffer: String,
    step_buffer: String,
}

impl InteractiveShell {
    pub fn new(
        id: Option<Uuid>,
        terminal: Box<dyn Terminal>,
        security: Arc<SecurityContext>,
        options: ShellOptions,
    ) -> Self {
        Self {
            id,
            terminal,
            security,
            options,
            buffer: String::new(),
            step_buffer: String::new(),
        }
    }

    /// `None` for the main shell
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn label(&self) -> String {
        self.id
            .map(|id| id.to_string())
            .unwrap_or_else(|| MAIN_SHELL_ID.to_string())
    }

    pub fn is_main(&self) -> bool {
        self.id.is_none()
    }

    /// Set a plain prompt and wait for it to show up
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(shell = %self.label(), "starting shell");
        self.terminal.write(b"PS1=\"$ \"\n")?;

        let deadline = tokio::time::Instant::now() + self.options.init_timeout;
        let mut seen = String::new();
        loop {
            let chunk =
                tokio::time::timeout_at(deadline, self.terminal.output().recv()).await;
            match chunk {
                Ok(Some(bytes)) => {
                    seen.push_str(&String::from_utf8_lossy(&bytes));
                    if clean_chunk(&seen).ends_with('$') {
                        tracing::info!(shell = %self.label(), "shell ready");
                        return Ok(());
                    }
                }
                Ok(None) => {
                    return Err(Error::shell_failed("shell exited during startup")
                        .with_operation("interactive_shell::start")
                        .with_context("shell", self.label()));
                }
                Err(_) => {
                    return Err(Error::new(
                        ErrorKind::ShellTimeout,
                        "shell prompt did not appear in time",
                    )
                    .with_operation("interactive_shell::start")
                    .with_context("shell", self.label())
                    .with_context("timeout", format!("{:?}", self.options.init_timeout)));
                }
            }
        }
    }

    /// Output collected since the step started
    pub fn step_buffer(&self) -> &str {
        &self.step_buffer
    }

    pub fn clean_step_buffer(&mut self) {
        self.step_buffer.clear();
    }

    /// Send raw characters, e.g. arrow key sequences
    pub async fn send<P: LlmProvider>(
        &mut self,
        llm: &StructuredLlm<P>,
        sequence: &str,
        hide_input: bool,
    ) -> Result<StreamToShellOutput> {
        self.buffer.clear();
        self.terminal.write(sequence.as_bytes())?;
        self.stream(llm, sequence, hide_input).await
    }

    /// Send a line followed by a newline
    pub async fn send_line<P: LlmProvider>(
        &mut self,
        llm: &StructuredLlm<P>,
        line: &str,
        hide_input: bool,
    ) -> Result<StreamToShellOutput> {
        self.buffer.clear();
        self.terminal.write(format!("{}\n", line).as_bytes())?;
        self.stream(llm, line, hide_input).await
    }

    /// Send a control character, e.g. `c` for Ctrl-C
    pub async fn send_control<P: LlmProvider>(
        &mut self,
        llm: &StructuredLlm<P>,
        key: char,
    ) -> Result<StreamToShellOutput> {
        self.buffer.clear();
        let byte = (key.to_ascii_lowercase() as u8) & 0x1f;
        self.terminal.write(&[byte])?;
        self.stream(llm, "", false).await
    }

    /// Run a command after the security guard has cleared it
    pub async fn run_command<P: LlmProvider>(
        &mut self,
        llm: &StructuredLlm<P>,
        prompter: &dyn Prompter,
        command: &str,
    ) -> Result<StreamToShellOutput> {
        let guard = ShellSecurityGuard::new(&self.security, llm, prompter);
        let verdict = guard.review_command(command).await?;
        tracing::debug!(shell = %self.label(), action = ?verdict.action, "{}", verdict.reason);

        match verdict.action {
            SecurityVerdictAction::Proceed => self.send_line(llm, command, false).await,
            SecurityVerdictAction::CompletedManually => {
                let output = verdict.output.unwrap_or_default();
                self.step_buffer.push_str(&output);
                self.log_to_file(&output);
                Ok(StreamToShellOutput {
                    needs_action: false,
                    reason: Some(verdict.reason),
                    output,
                })
            }
            SecurityVerdictAction::Skipped => Ok(StreamToShellOutput {
                needs_action: false,
                reason: Some(verdict.reason.clone()),
                output: format!("Command was not executed. {}", verdict.reason),
            }),
        }
    }

    /// Ask the user for the sudo password and type it into the shell
    pub async fn authenticate<P: LlmProvider>(
        &mut self,
        llm: &StructuredLlm<P>,
        prompter: &dyn Prompter,
    ) -> Result<StreamToShellOutput> {
        let password = prompter.password("\n[Shell] Enter your sudo password: ")?;
        self.send_line(llm, &password, true).await
    }

    pub fn close(&mut self) {
        tracing::debug!(shell = %self.label(), "closing shell");
        self.terminal.close();
    }

    async fn stream<P: LlmProvider>(
        &mut self,
        llm: &StructuredLlm<P>,
        sequence: &str,
        hide_input: bool,
    ) -> Result<StreamToShellOutput> {
        tracing::info!(shell = %self.label(), "running command: {}", mask(sequence, hide_input));
        let mut llm_called = false;

        loop {
            let next =
                tokio::time::timeout(self.options.read_timeout, self.terminal.output().recv())
                    .await;
            match next {
                Ok(Some(bytes)) => {
                    let chunk = clean_chunk(&String::from_utf8_lossy(&bytes));
                    if !chunk.is_empty() {
                        self.buffer.push_str(&chunk);
                        self.buffer.push('\n');
                        self.step_buffer.push_str(&chunk);
                        self.step_buffer.push('\n');
                        if !is_progress_noise(&chunk) {
                            self.log_to_file(&format!("{}\n", chunk));
                        }
                    }
                    llm_called = false;

                    if chunk.trim_end().ends_with('$') {
                        tracing::info!(shell = %self.label(), "detected shell prompt; command finished");
                        break;
                    }
                }
                Ok(None) => {
                    tracing::error!(shell = %self.label(), "EOF reached; shell closed");
                    break;
                }
                Err(_) => {
                    if llm_called {
                        continue;
                    }
                    llm_called = true;
                    self.buffer = mask_in_text(&self.buffer, sequence, hide_input);
                    self.step_buffer = mask_in_text(&self.step_buffer, sequence, hide_input);
                    if self.buffer.is_empty() {
                        continue;
                    }

                    tracing::info!(shell = %self.label(), "output stable; reviewing");
                    if let Some(result) = self.review(llm).await {
                        return Ok(result);
                    }
                }
            }
        }

        self.buffer = mask_in_text(&self.buffer, sequence, hide_input);
        self.step_buffer = mask_in_text(&self.step_buffer, sequence, hide_input);
        tracing::info!(shell = %self.label(), "command finished");
        Ok(StreamToShellOutput::done(self.buffer.clone()))
    }

    /// `Some` when streaming should stop and hand control back
    async fn review<P: LlmProvider>(&self, llm: &StructuredLlm<P>) -> Option<StreamToShellOutput> {
        match llm
            .invoke::<InteractionReview>(REVIEW_FOR_INTERACTION, &self.buffer)
            .await
        {
            Ok(review) if review.needs_action => {
                tracing::info!(shell = %self.label(), "shell awaits interaction");
                return Some(StreamToShellOutput {
                    needs_action: true,
                    reason: Some(review.reason),
                    output: self.buffer.clone(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(shell = %self.label(), "interaction review failed: {}", e);
                return None;
            }
        }

        if self.is_main() {
            return None;
        }

        match llm
            .invoke::<LongRunningReview>(REVIEW_LONG_RUNNING, &self.buffer)
            .await
        {
            Ok(review) => match review.state {
                ProcessState::Running => Some(StreamToShellOutput {
                    needs_action: false,
                    reason: Some(format!("{}{}", LONG_RUNNING_PREFIX, review.reason)),
                    output: self.buffer.clone(),
                }),
                ProcessState::Error => Some(StreamToShellOutput {
                    needs_action: true,
                    reason: Some(review.reason),
                    output: self.buffer.clone(),
                }),
                ProcessState::Initializing => None,
            },
            Err(e) => {
                tracing::error!(shell = %self.label(), "long-running review failed: {}", e);
                None
            }
        }
    }

    fn log_to_file(&self, text: &str) {
        let Some(path) = &self.options.log_file else {
            return;
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(text.as_bytes()));
        if let Err(e) = written {
            tracing::debug!(file = %path.display(), "failed to write shell log: {}", e);
        }
    }
}
