//! # setup-agent core
//!
//! Plans, runs and verifies the setup of a local project from its own
//! documentation:
//! 1. Guideline files are discovered and confirmed by the user
//! 2. The user picks a task the documentation supports
//! 3. The planner turns guidelines and task into ordered steps
//! 4. Installer and runner agents execute each step in a shell
//! 5. The auditor checks every step; failures go back to the planner
//! 6. The user confirms the outcome or reports what is still broken
//!
//! The model drives the work, the shell does it, the user stays in charge.

pub mod agents;
pub mod config;
pub mod distribution;
pub mod files;
pub mod nodes;
pub mod prompter;
pub mod runtime;
pub mod secrets;
pub mod shell;
pub mod state;
pub mod tools;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{load_dotenv, Observability, SetupConfig};
pub use prompter::{Answer, Prompter, ScriptedPrompter, TerminalPrompter};
pub use runtime::Runtime;
pub use shell::{PtyOptions, ShellOptions, ShellRegistry};
pub use state::{GraphState, Node};
pub use tools::websearch::WebSearch;
pub use workflow::Workflow;
