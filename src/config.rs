use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::search::overlap::ScoringMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Line-delimited knowledge file loaded once at startup
    pub corpus_path: PathBuf,
    /// Optional file holding the persona prompt; the built-in persona is used when unset
    pub persona_path: Option<PathBuf>,
    /// Number of corpus lines injected into each system instruction
    pub retrieval_top_k: usize,
    /// How repeated query characters are counted by the ranker
    pub scoring_mode: ScoringMode,
    /// Maximum in-flight generations; further requests wait for a slot
    pub max_concurrent_chats: usize,
    /// Seconds to wait for the next chunk before giving up on the upstream stream
    pub idle_timeout_secs: u64,
    /// Attach a permissive CORS layer (front-end hosted on another origin)
    pub cors_allow_any: bool,
    /// Completion service configuration
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini", "openai" or "ollama"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model identifier sent with every completion request
    pub chat_model: String,
    /// API key (not needed for a local ollama)
    pub api_key: Option<String>,
    /// Upper bound on generated tokens per answer
    pub max_output_tokens: u32,
    /// Whole-request timeout for a streaming completion
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            corpus_path: PathBuf::from("./data/corpus.txt"),
            persona_path: None,
            retrieval_top_k: 15,
            scoring_mode: ScoringMode::Occurrences,
            max_concurrent_chats: 8,
            idle_timeout_secs: 30,
            cors_allow_any: false,
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            chat_model: "gemini-1.5-flash".to_string(),
            api_key: None,
            max_output_tokens: 1024,
            timeout_secs: 300,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Hosting platforms hand out a bare port; an explicit address wins.
        if let Some(port) = var("PORT") {
            if let Ok(p) = port.parse::<u16>() {
                config.bind_addr = format!("0.0.0.0:{p}");
            }
        }
        if let Some(addr) = var("CORPUS_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(path) = var("CORPUS_CHAT_CORPUS_PATH") {
            config.corpus_path = PathBuf::from(path);
        }
        if let Some(path) = var("CORPUS_CHAT_PERSONA_PATH") {
            config.persona_path = Some(PathBuf::from(path));
        }
        if let Some(val) = var("CORPUS_CHAT_TOP_K") {
            if let Ok(v) = val.parse() {
                config.retrieval_top_k = v;
            }
        }
        if let Some(val) = var("CORPUS_CHAT_SCORING") {
            match val.parse() {
                Ok(mode) => config.scoring_mode = mode,
                Err(e) => tracing::warn!("Ignoring CORPUS_CHAT_SCORING: {e}"),
            }
        }
        if let Some(val) = var("CORPUS_CHAT_MAX_CONCURRENT") {
            if let Ok(v) = val.parse::<usize>() {
                config.max_concurrent_chats = v.max(1);
            }
        }
        if let Some(val) = var("CORPUS_CHAT_IDLE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.idle_timeout_secs = v.max(1);
            }
        }
        if let Some(val) = var("CORPUS_CHAT_CORS_ANY") {
            config.cors_allow_any = matches!(val.as_str(), "1" | "true" | "yes");
        }

        // LLM config
        if let Some(provider) = var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = var("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(key) = var("LLM_API_KEY").or_else(|| var("GEMINI_API_KEY")) {
            config.llm.api_key = Some(key);
        }
        if let Some(val) = var("LLM_MAX_OUTPUT_TOKENS") {
            if let Ok(v) = val.parse() {
                config.llm.max_output_tokens = v;
            }
        }
        if let Some(val) = var("LLM_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.llm.timeout_secs = v;
            }
        }

        config
    }
}
