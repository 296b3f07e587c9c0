//! Guard against commands that touch sensitive files.
//!
//! A command matching a forbidden glob is judged by the model against the
//! session whitelist. When the model refuses it, the user decides.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use setup_agent_error::Result;
use setup_agent_llm::{LlmProvider, StructuredLlm};
use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::prompter::{labels, Prompter};

pub const FORBIDDEN_PATTERNS: &[&str] = &[
    "/home/*/.ssh/*",
    "/home/*/.gnupg/*",
    "/home/*/.aws/*",
    "/home/*/.config/*",
    "*.env",
    ".*env*",
    "*secret*",
    "*password*",
    "*token*",
    "*credential*",
];

const CHOICE_ALLOW_ONCE: &str = "Allow once";
const CHOICE_EXECUTE_MANUALLY: &str = "Execute manually in separate terminal";
const CHOICE_SKIP: &str = "Skip command";

fn verify_command_intent(pattern: &str, whitelist: &str) -> String {
    format!(
        "You are a shell security auditor protecting sensitive files.\n\
         Analyze the shell command provided by the user.\n\n\
         1. The command matched the forbidden pattern: '{pattern}'\n\
         2. The user has explicitly WHITELISTED these paths: [{whitelist}]\n\n\
         Decision rules:\n\
         - ALLOW (true) if the command only reads or accesses whitelisted files.\n\
         - ALLOW (true) if the command only overwrites a file without reading it, \
         even when it is not whitelisted.\n\
         - DENY (false) if the command reads, prints or exposes a sensitive file \
         that is not whitelisted.\n"
    )
}

/// Paths the user allowed for this session, shared by every shell
#[derive(Debug, Default)]
pub struct SecurityContext {
    whitelist: Mutex<BTreeSet<String>>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_whitelist(&self, path: impl Into<String>) {
        if let Ok(mut whitelist) = self.whitelist.lock() {
            whitelist.insert(path.into());
        }
    }

    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.whitelist
            .lock()
            .map(|w| w.contains(path))
            .unwrap_or(false)
    }

    /// Comma-separated whitelist, or `None` when empty
    pub fn whitelist_str(&self) -> String {
        match self.whitelist.lock() {
            Ok(w) if !w.is_empty() => w.iter().cloned().collect::<Vec<_>>().join(", "),
            _ => "None".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SecurityCheck {
    /// True if the command may run without asking the user
    pub is_safe: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityVerdictAction {
    /// Run the command
    Proceed,
    /// The user ran it and pasted the output
    CompletedManually,
    /// Blocked
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub action: SecurityVerdictAction,
    pub reason: String,
    /// Pasted output, for manual execution only
    pub output: Option<String>,
}

impl SecurityVerdict {
    fn new(action: SecurityVerdictAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            output: None,
        }
    }
}

/// fnmatch-style glob: `*`, `?` and `[...]` classes, matched against the
/// whole text
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == ']' && !class.is_empty() {
                        closed = true;
                        break;
                    }
                    class.push(next);
                }
                if closed {
                    re.push('[');
                    if let Some(rest) = class.strip_prefix('!') {
                        re.push('^');
                        re.push_str(&rest.replace('\\', "\\\\"));
                    } else {
                        re.push_str(&class.replace('\\', "\\\\"));
                    }
                    re.push(']');
                } else {
                    re.push_str(&regex::escape(&format!("[{}", class)));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_or(false, |r| r.is_match(text))
}

fn wrapped(pattern: &str) -> String {
    format!("*{}*", pattern.to_lowercase())
}

/// The first forbidden pattern the command matches, wrapped as `*pattern*`
pub fn forbidden_pattern(command: &str) -> Option<String> {
    let command = command.to_lowercase();
    FORBIDDEN_PATTERNS
        .iter()
        .map(|p| wrapped(p))
        .find(|p| glob_match(p, &command))
}

/// The argument that triggered a forbidden pattern, flags skipped
pub fn extract_sensitive_path(command: &str) -> Option<String> {
    let tokens = shell_words::split(command).ok()?;
    tokens
        .into_iter()
        .filter(|t| !t.starts_with('-'))
        .find(|t| {
            let lower = t.to_lowercase();
            FORBIDDEN_PATTERNS
                .iter()
                .any(|p| glob_match(&wrapped(p), &lower))
        })
}

pub struct ShellSecurityGuard<'a, P> {
    context: &'a SecurityContext,
    llm: &'a StructuredLlm<P>,
    prompter: &'a dyn Prompter,
}

impl<'a, P: LlmProvider> ShellSecurityGuard<'a, P> {
    pub fn new(
        context: &'a SecurityContext,
        llm: &'a StructuredLlm<P>,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            context,
            llm,
            prompter,
        }
    }

    pub async fn review_command(&self, command: &str) -> Result<SecurityVerdict> {
        let Some(pattern) = forbidden_pattern(command) else {
            return Ok(SecurityVerdict::new(
                SecurityVerdictAction::Proceed,
                "No forbidden pattern found in the command",
            ));
        };

        let system = verify_command_intent(&pattern, &self.context.whitelist_str());
        match self.llm.invoke::<SecurityCheck>(&system, command).await {
            Ok(check) if check.is_safe => {
                return Ok(SecurityVerdict::new(
                    SecurityVerdictAction::Proceed,
                    format!(
                        "Pattern '{}' found in the command, but it was judged safe. Reason: {}",
                        pattern, check.reason
                    ),
                ));
            }
            Ok(check) => {
                tracing::warn!(command, pattern = %pattern, "command refused: {}", check.reason);
            }
            Err(e) => {
                tracing::warn!(command, "intent check failed, asking the user: {}", e);
            }
        }

        self.handle_intervention(command, &pattern)
    }

    fn handle_intervention(&self, command: &str, pattern: &str) -> Result<SecurityVerdict> {
        self.prompter.announce(&format!(
            "\nSecurity Alert: Command matches forbidden pattern '{}'\n   Command: {}",
            pattern, command
        ));

        let sensitive = extract_sensitive_path(command);
        let whitelist_choice = format!(
            "Allow and add the file to session's whitelist ({})",
            sensitive.as_deref().unwrap_or("file")
        );
        let choices = labels([
            CHOICE_ALLOW_ONCE,
            whitelist_choice.as_str(),
            CHOICE_EXECUTE_MANUALLY,
            CHOICE_SKIP,
        ]);

        let picked = self.prompter.select("Choose an action:", &choices, 0)?;
        match choices[picked].as_str() {
            CHOICE_SKIP => Ok(SecurityVerdict::new(
                SecurityVerdictAction::Skipped,
                format!("Blocked by user: {}", pattern),
            )),
            CHOICE_EXECUTE_MANUALLY => {
                let line = "-".repeat(40);
                self.prompter.announce(&format!(
                    "\n{line}\nMANUAL EXECUTION INSTRUCTIONS\n\
                     1. Open a new terminal window.\n\
                     2. Run this command:\n\n   {command}\n\n\
                     3. Once done, copy the output (if any) and paste it below.\n{line}"
                ));
                let output = self
                    .prompter
                    .input("Paste command output here (press Enter if no output):")?;
                Ok(SecurityVerdict {
                    action: SecurityVerdictAction::CompletedManually,
                    reason: "User executed the command manually".to_string(),
                    output: Some(format!("{}\n", output)),
                })
            }
            chosen => {
                if chosen == whitelist_choice {
                    if let Some(path) = sensitive {
                        tracing::info!(path = %path, "added to session whitelist");
                        self.context.add_to_whitelist(path);
                    }
                }
                Ok(SecurityVerdict::new(
                    SecurityVerdictAction::Proceed,
                    "User allowed to proceed with the command execution.",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompter::{Answer, ScriptedPrompter};
    use setup_agent_llm::mock::{MockProvider, MockReply};
    use setup_agent_llm::LlmSettings;
    use std::time::Duration;

    fn llm(replies: Vec<MockReply>) -> StructuredLlm<MockProvider> {
        let provider = MockProvider::new();
        for r in replies {
            provider.push(r);
        }
        let settings = LlmSettings {
            max_retries: 0,
            ..Default::default()
        };
        StructuredLlm::new(provider, settings).with_backoff(Duration::ZERO)
    }

    fn unsafe_reply() -> MockReply {
        MockReply::json(serde_json::json!({"is_safe": false, "reason": "prints secrets"}))
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*.env", "prod.env"));
        assert!(!glob_match("*.env", "prod.envx"));
        assert!(glob_match("/home/*/.ssh/*", "/home/alice/.ssh/id_rsa"));
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(glob_match("[!a]bc", "xbc"));
        assert!(!glob_match("[!a]bc", "abc"));
        assert!(glob_match("a+b(c)", "a+b(c)"));
    }

    #[test]
    fn test_forbidden_pattern() {
        assert_eq!(forbidden_pattern("cat .env").as_deref(), Some("**.env*"));
        assert_eq!(
            forbidden_pattern("cat /home/bob/.ssh/id_rsa").as_deref(),
            Some("*/home/*/.ssh/**")
        );
        assert_eq!(
            forbidden_pattern("echo $GITHUB_TOKEN").as_deref(),
            Some("**token**")
        );
        assert_eq!(forbidden_pattern("brew install node"), None);
    }

    #[test]
    fn test_extract_sensitive_path() {
        assert_eq!(
            extract_sensitive_path("cat -n config/.env.local").as_deref(),
            Some("config/.env.local")
        );
        assert_eq!(extract_sensitive_path("ls -la"), None);
        assert_eq!(extract_sensitive_path("echo 'unterminated"), None);
    }

    #[test]
    fn test_whitelist_str() {
        let ctx = SecurityContext::new();
        assert_eq!(ctx.whitelist_str(), "None");
        ctx.add_to_whitelist("b.env");
        ctx.add_to_whitelist("a.env");
        assert_eq!(ctx.whitelist_str(), "a.env, b.env");
        assert!(ctx.is_whitelisted("a.env"));
    }

    #[tokio::test]
    async fn test_clean_command_proceeds() {
        let ctx = SecurityContext::new();
        let llm = llm(vec![]);
        let prompter = ScriptedPrompter::default();
        let guard = ShellSecurityGuard::new(&ctx, &llm, &prompter);

        let verdict = guard.review_command("npm install").await.unwrap();
        assert_eq!(verdict.action, SecurityVerdictAction::Proceed);
        assert_eq!(verdict.reason, "No forbidden pattern found in the command");
        assert!(llm.provider().requests().is_empty());
    }

    #[tokio::test]
    async fn test_model_allows_blind_write() {
        let ctx = SecurityContext::new();
        ctx.add_to_whitelist(".env.example");
        let llm = llm(vec![MockReply::json(
            serde_json::json!({"is_safe": true, "reason": "blind write"}),
        )]);
        let prompter = ScriptedPrompter::default();
        let guard = ShellSecurityGuard::new(&ctx, &llm, &prompter);

        let verdict = guard.review_command("echo PORT=3000 > .env").await.unwrap();
        assert_eq!(verdict.action, SecurityVerdictAction::Proceed);
        let system = llm.provider().requests()[0].messages[0].text().to_string();
        assert!(system.contains("[.env.example]"));
        assert!(system.contains("'**.env*'"));
    }

    #[tokio::test]
    async fn test_user_skips() {
        let ctx = SecurityContext::new();
        let llm = llm(vec![unsafe_reply()]);
        let prompter = ScriptedPrompter::new([Answer::choice(CHOICE_SKIP)]);
        let guard = ShellSecurityGuard::new(&ctx, &llm, &prompter);

        let verdict = guard.review_command("cat .env").await.unwrap();
        assert_eq!(verdict.action, SecurityVerdictAction::Skipped);
        assert_eq!(verdict.reason, "Blocked by user: **.env*");
    }

    #[tokio::test]
    async fn test_user_whitelists_file() {
        let ctx = SecurityContext::new();
        let llm = llm(vec![unsafe_reply()]);
        let prompter = ScriptedPrompter::new([Answer::choice(
            "Allow and add the file to session's whitelist (.env)",
        )]);
        let guard = ShellSecurityGuard::new(&ctx, &llm, &prompter);

        let verdict = guard.review_command("cat .env").await.unwrap();
        assert_eq!(verdict.action, SecurityVerdictAction::Proceed);
        assert!(ctx.is_whitelisted(".env"));
    }

    #[tokio::test]
    async fn test_manual_execution() {
        let ctx = SecurityContext::new();
        let llm = llm(vec![unsafe_reply()]);
        let prompter = ScriptedPrompter::new([
            Answer::choice(CHOICE_EXECUTE_MANUALLY),
            Answer::text("KEY=set"),
        ]);
        let guard = ShellSecurityGuard::new(&ctx, &llm, &prompter);

        let verdict = guard.review_command("cat secrets.yml").await.unwrap();
        assert_eq!(verdict.action, SecurityVerdictAction::CompletedManually);
        assert_eq!(verdict.output.as_deref(), Some("KEY=set\n"));
        assert!(prompter
            .transcript()
            .iter()
            .any(|l| l.contains("MANUAL EXECUTION INSTRUCTIONS")));
    }

    #[tokio::test]
    async fn test_failed_intent_check_asks_user() {
        let ctx = SecurityContext::new();
        let llm = llm(vec![]);
        let prompter = ScriptedPrompter::new([Answer::choice(CHOICE_ALLOW_ONCE)]);
        let guard = ShellSecurityGuard::new(&ctx, &llm, &prompter);

        let verdict = guard.review_command("cat token.txt").await.unwrap();
        assert_eq!(verdict.action, SecurityVerdictAction::Proceed);
        assert_eq!(ctx.whitelist_str(), "None");
    }
}
