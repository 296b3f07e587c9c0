//! The main shell plus extra shells for long-running processes

use setup_agent_error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::interactive::{InteractiveShell, ShellOptions};
use super::security::SecurityContext;
use super::terminal::{PtyOptions, PtyTerminal, Terminal};

/// Creates the terminal behind each new shell
pub type TerminalFactory = Box<dyn Fn() -> Result<Box<dyn Terminal>> + Send + Sync>;

/// Owns every shell of a run. All shells share one security context and
/// one transcript file.
pub struct ShellRegistry {
    main: InteractiveShell,
    shells: HashMap<Uuid, InteractiveShell>,
    security: Arc<SecurityContext>,
    options: ShellOptions,
    factory: TerminalFactory,
}

impl ShellRegistry {
    /// Start the main shell
    pub async fn start(factory: TerminalFactory, options: ShellOptions) -> Result<Self> {
        let security = Arc::new(SecurityContext::new());
        let mut main =
            InteractiveShell::new(None, factory()?, Arc::clone(&security), options.clone());
        main.start().await?;

        Ok(Self {
            main,
            shells: HashMap::new(),
            security,
            options,
            factory,
        })
    }

    /// Registry backed by real login shells
    pub async fn with_pty(options: ShellOptions, pty: PtyOptions) -> Result<Self> {
        let factory: TerminalFactory = Box::new(move || {
            PtyTerminal::spawn(&pty).map(|t| Box::new(t) as Box<dyn Terminal>)
        });
        Self::start(factory, options).await
    }

    /// Start another shell and return its id
    pub async fn register_new_shell(&mut self) -> Result<Uuid> {
        let mut id = Uuid::new_v4();
        while self.shells.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let mut shell = InteractiveShell::new(
            Some(id),
            (self.factory)()?,
            Arc::clone(&self.security),
            self.options.clone(),
        );
        shell.start().await?;
        self.shells.insert(id, shell);
        tracing::info!(shell = %id, "registered new shell");
        Ok(id)
    }

    /// The shell with `id`; `None` or an unknown id gives the main shell
    pub fn get_shell(&mut self, id: Option<Uuid>) -> &mut InteractiveShell {
        match id.and_then(|id| self.shells.get_mut(&id)) {
            Some(shell) => shell,
            None => &mut self.main,
        }
    }

    pub fn security_context(&self) -> Arc<SecurityContext> {
        Arc::clone(&self.security)
    }

    /// Number of extra shells
    pub fn len(&self) -> usize {
        self.shells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }

    /// Close every shell, the main one included
    pub fn cleanup(&mut self) {
        for shell in self.shells.values_mut() {
            shell.close();
        }
        self.main.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_factory, shell_options};

    #[tokio::test]
    async fn test_get_shell_falls_back_to_main() {
        let mut registry = ShellRegistry::start(fake_factory(), shell_options())
            .await
            .unwrap();
        assert!(registry.is_empty());

        let id = registry.register_new_shell().await.unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_shell(Some(id)).id(), Some(id));
        assert!(registry.get_shell(None).is_main());
        assert!(registry.get_shell(Some(Uuid::new_v4())).is_main());
    }

    #[tokio::test]
    async fn test_shells_share_security_context() {
        let mut registry = ShellRegistry::start(fake_factory(), shell_options())
            .await
            .unwrap();
        registry.register_new_shell().await.unwrap();
        registry.security_context().add_to_whitelist(".env");
        assert!(registry.security_context().is_whitelisted(".env"));
        registry.cleanup();
    }
}
