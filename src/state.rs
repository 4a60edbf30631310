use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::llm::chat_stream::{CompletionGateway, HttpCompletionGateway};
use crate::llm::prompt::DEFAULT_PERSONA;
use crate::search::corpus::Corpus;

/// Shared application state. Everything in here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub corpus: Arc<Corpus>,
    pub persona: Arc<str>,
    pub gateway: Arc<dyn CompletionGateway>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(
        config: Config,
        corpus: Corpus,
        persona: impl Into<Arc<str>>,
        gateway: Arc<dyn CompletionGateway>,
    ) -> Self {
        let max_concurrent_chats = config.max_concurrent_chats.max(1);
        Self {
            config: Arc::new(config),
            corpus: Arc::new(corpus),
            persona: persona.into(),
            gateway,
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_chats)),
        }
    }

    /// Load the corpus and persona from disk and connect the HTTP completion
    /// gateway. Fails if the corpus cannot be populated.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let corpus = Corpus::load(&config.corpus_path)?;

        let persona = match &config.persona_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read persona file {}", path.display()))?,
            None => DEFAULT_PERSONA.to_string(),
        };

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let gateway = HttpCompletionGateway::new(http_client, config.llm.clone());

        Ok(Self::new(config, corpus, persona, Arc::new(gateway)))
    }
}
