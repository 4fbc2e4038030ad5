//! Collaborator traits of the resolution workflow.
//!
//! The workflow never talks to a model, a webhook, or a database directly.
//! It goes through these seams so production wiring and test doubles are
//! interchangeable:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ResolutionWorkflow                     │
//! │  ┌──────────────┐ ┌──────────┐ ┌──────────────┐ ┌─────┐ │
//! │  │PassageRetr.  │ │ Answerer │ │IncidentSource│ │Store│ │
//! │  │ IndexHandle  │ │ LlmAnsw. │ │ WebhookDiag. │ │SQL  │ │
//! │  └──────────────┘ └──────────┘ └──────────────┘ └─────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Answerers and incident sources return raw text. The workflow parses it
//! leniently with [`crate::reply::parse_reply`], so an implementation may
//! reply with JSON, fenced JSON, or plain prose.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Passage, Resolution};

/// Ranked passage lookup over the local documentation.
#[async_trait]
pub trait PassageRetriever: Send + Sync {
    /// Up to `k` passages for `query`, best first. Empty when nothing
    /// matches.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
}

/// Answers questions from retrieved documentation passages.
#[async_trait]
pub trait Answerer: Send + Sync {
    /// Answer `query` grounded in `passages`.
    ///
    /// The expected reply shape is `{"answer": "...", "sources": [...]}`.
    async fn answer(&self, query: &str, passages: &[Passage]) -> Result<String>;

    /// Free-form completion for a single instruction.
    async fn complete(&self, instruction: &str) -> Result<String>;
}

/// Produces an incident diagnosis when the documentation has no answer.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    async fn diagnose(&self, request: &str) -> Result<String>;
}

/// Durable storage behind the session cache.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The most recent `limit` entries of a session, newest first.
    async fn load(&self, session_id: &str, limit: usize) -> Result<Vec<(String, Resolution)>>;

    /// Insert or replace the entry for `query`.
    async fn save(&self, session_id: &str, query: &str, resolution: &Resolution) -> Result<()>;
}
