//! Core data models used throughout Support Harness.
//!
//! These types represent the documents, passages, and resolution results
//! that flow through the retrieval and resolution pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::SystemTime;

/// A Markdown source file read for one index build.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub title: String,
    pub text: String,
    pub modified: SystemTime,
}

/// A chunk of a document, returned by the ranker with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub source_path: String,
    pub title: String,
    /// 0-based position within the source document.
    pub chunk_id: usize,
    pub score: f32,
}

/// Per-passage metadata stored in the index alongside the passage text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMeta {
    pub path: String,
    pub title: String,
    pub chunk_id: usize,
}

/// Index size summary exposed by `stats` and `GET /stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
}

/// A support question submitted to the resolution workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionInput {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ResolutionInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
        }
    }
}

/// Structured result of a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutput {
    pub diagnosis: String,
    #[serde(default)]
    pub probable_causes: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Which branch of the workflow produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Answered from local documentation.
    LocalHit,
    /// No local evidence; answered by the incident diagnoser.
    Fallback,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::LocalHit => "LOCAL_HIT",
            Outcome::Fallback => "FALLBACK",
        }
    }

    /// Inverse of [`Outcome::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOCAL_HIT" => Some(Outcome::LocalHit),
            "FALLBACK" => Some(Outcome::Fallback),
            _ => None,
        }
    }
}

/// The unit stored in the session cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: Outcome,
    pub output: ResolutionOutput,
}

/// Merge source lists, keeping the first occurrence of each entry.
pub fn merge_sources<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for source in list {
            if seen.insert(source.as_str()) {
                merged.push(source.clone());
            }
        }
    }
    merged
}
