//! Everything a run needs at hand: model, user, shells and search

use setup_agent_error::Result;
use setup_agent_llm::{LlmProvider, StructuredLlm};
use std::sync::Arc;

use crate::config::SetupConfig;
use crate::files::FileLoader;
use crate::prompter::Prompter;
use crate::secrets::PersonalInformationFilter;
use crate::shell::ShellRegistry;
use crate::tools::websearch::WebSearch;

pub struct Runtime<P> {
    pub config: SetupConfig,
    pub llm: StructuredLlm<P>,
    pub prompter: Arc<dyn Prompter>,
    pub shells: ShellRegistry,
    pub search: Option<WebSearch>,
    pub filter: PersonalInformationFilter,
    pub files: FileLoader,
}

impl<P: LlmProvider> Runtime<P> {
    pub fn new(
        config: SetupConfig,
        llm: StructuredLlm<P>,
        prompter: Arc<dyn Prompter>,
        shells: ShellRegistry,
    ) -> Result<Self> {
        let files = FileLoader::new(config.project_root.clone());
        Ok(Self {
            config,
            llm,
            prompter,
            shells,
            search: None,
            filter: PersonalInformationFilter::new()?,
            files,
        })
    }

    pub fn with_search(mut self, search: Option<WebSearch>) -> Self {
        self.search = search;
        self
    }

    /// Show text to the user and keep it in the log
    pub fn announce(&self, text: &str) {
        tracing::debug!("{}", text);
        self.prompter.announce(text);
    }
}
