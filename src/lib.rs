//! # corpus-chat
//!
//! A small retrieval-augmented chat proxy. Each chat request is answered by a
//! hosted LLM whose system instruction carries the corpus lines that share the
//! most characters with the user's latest message.
//!
//! ## Architecture
//!
//! ```text
//!        POST /api/chat  { history: [turn, ...] }
//!                    │
//!                    ▼
//!        ┌───────────────────────┐
//!        │  Validate history     │──── 400 { error }
//!        │  latest = last turn   │
//!        └───────────┬───────────┘
//!                    │
//!                    ▼
//!        ┌───────────────────────┐     ┌──────────────┐
//!        │  Character-overlap    │◄────│ Corpus (Arc) │
//!        │  ranking, top K       │     │ loaded once  │
//!        └───────────┬───────────┘     └──────────────┘
//!                    │
//!                    ▼
//!        ┌───────────────────────┐
//!        │  Compose instruction  │
//!        │  persona + reference  │
//!        │  + safety + question  │
//!        └───────────┬───────────┘
//!                    │
//!                    ▼
//!        ┌───────────────────────┐
//!        │  Completion gateway   │──── 500 { error } (before first chunk)
//!        │  gemini/openai/ollama │
//!        └───────────┬───────────┘
//!                    │ chunks, in order
//!                    ▼
//!            text/plain response
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server, retrieval and LLM
//! - [`models`] - Conversation turns and response bodies
//! - [`search::corpus`] - Read-only line store loaded at startup
//! - [`search::overlap`] - Bag-of-characters scoring and top-K ranking
//! - [`llm::prompt`] - System instruction assembly with injection framing
//! - [`llm::chat_stream`] - `CompletionGateway` trait and the streaming HTTP client
//! - [`api`] - Axum router and handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
