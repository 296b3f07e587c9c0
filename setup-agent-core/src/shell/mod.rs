//! Persistent interactive shells driven by agents

pub mod clean;
pub mod interactive;
pub mod registry;
pub mod security;
pub mod terminal;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use interactive::{
    InteractionReview, InteractiveShell, LongRunningReview, ProcessState, ShellOptions,
    StreamToShellOutput, MAIN_SHELL_ID,
};
pub use registry::{ShellRegistry, TerminalFactory};
pub use security::{
    SecurityCheck, SecurityContext, SecurityVerdict, SecurityVerdictAction, ShellSecurityGuard,
};
pub use terminal::{FakeTerminal, PtyOptions, PtyTerminal, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArrowKey {
    Up,
    Down,
    Right,
    Left,
}

impl ArrowKey {
    pub fn sequence(&self) -> &'static str {
        match self {
            ArrowKey::Up => "\x1b[A",
            ArrowKey::Down => "\x1b[B",
            ArrowKey::Right => "\x1b[C",
            ArrowKey::Left => "\x1b[D",
        }
    }
}

/// Non-character keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyboardKey {
    Enter,
    CtrlC,
}
