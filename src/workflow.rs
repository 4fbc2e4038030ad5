//! Support resolution workflow.
//!
//! One procedure, two terminal outcomes:
//!
//! ```text
//!  query ──▶ validate ──▶ cache hit? ──yes──▶ stored Resolution
//!                             │ no
//!                             ▼
//!                        retrieve k ──passages──▶ Answerer      ─▶ LOCAL_HIT
//!                             │ none
//!                             ▼
//!                       IncidentSource (+ remediation step)     ─▶ FALLBACK
//!                             │
//!                             ▼
//!                  cache insert + best-effort store write
//! ```
//!
//! A cached query is answered without touching the retriever or any
//! collaborator. Concurrent first requests for the same query are coalesced
//! into one computation.
//!
//! Collaborator failures never fail a resolution: they degrade to
//! [`ANSWER_UNAVAILABLE`] or [`DIAGNOSIS_UNAVAILABLE`]. Only an empty query
//! or a retrieval failure is an error.

use anyhow::Result;
use std::sync::Arc;

use crate::agents::{LlmAnswerer, WebhookDiagnoser};
use crate::config::Config;
use crate::index::{IndexHandle, IndexOptions};
use crate::models::{
    merge_sources, Outcome, Passage, Resolution, ResolutionInput, ResolutionOutput,
};
use crate::reply::{parse_reply, AgentReply, ANSWER_UNAVAILABLE, DIAGNOSIS_UNAVAILABLE};
use crate::session::{InMemorySessionStore, SessionCache, SqliteSessionStore};
use crate::traits::{Answerer, IncidentSource, PassageRetriever, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("retrieval failed: {0}")]
    Retrieval(String),
}

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub session_id: String,
    pub k: usize,
    pub cache_capacity: u64,
    pub remediation: bool,
}

impl WorkflowOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_id: config.workflow.session_id.clone(),
            k: config.retrieval.k,
            cache_capacity: config.workflow.cache_capacity,
            remediation: config.workflow.remediation,
        }
    }
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A resolution plus whether it was served from the session cache.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub cached: bool,
}

pub struct ResolutionWorkflow {
    retriever: Arc<dyn PassageRetriever>,
    answerer: Arc<dyn Answerer>,
    incidents: Arc<dyn IncidentSource>,
    cache: SessionCache,
    options: WorkflowOptions,
}

impl ResolutionWorkflow {
    /// Assemble a workflow and load its session cache from `store`.
    pub async fn new(
        retriever: Arc<dyn PassageRetriever>,
        answerer: Arc<dyn Answerer>,
        incidents: Arc<dyn IncidentSource>,
        store: Arc<dyn SessionStore>,
        options: WorkflowOptions,
    ) -> Self {
        let cache =
            SessionCache::load(options.session_id.clone(), options.cache_capacity, store).await;
        Self {
            retriever,
            answerer,
            incidents,
            cache,
            options,
        }
    }

    /// Production wiring: model-backed collaborators and the configured
    /// session store.
    pub async fn from_config(config: &Config, retriever: Arc<dyn PassageRetriever>) -> Result<Self> {
        let store: Arc<dyn SessionStore> = match &config.workflow.session_db {
            Some(path) => Arc::new(SqliteSessionStore::open(path).await?),
            None => Arc::new(InMemorySessionStore::new()),
        };
        Ok(Self::new(
            retriever,
            Arc::new(LlmAnswerer::from_config(config)?),
            Arc::new(WebhookDiagnoser::from_config(config)?),
            store,
            WorkflowOptions::from_config(config),
        )
        .await)
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Resolve a query, reusing the session cache.
    pub async fn resolve(&self, input: &ResolutionInput) -> Result<Resolved, WorkflowError> {
        let query = input.query.as_str();
        if query.trim().is_empty() {
            return Err(WorkflowError::EmptyQuery);
        }

        let (resolution, cached) = self
            .cache
            .get_or_try_insert(query, self.compute(query))
            .await
            .map_err(|e| WorkflowError::Retrieval(format!("{:#}", e)))?;

        tracing::info!(
            session = %self.cache.session_id(),
            request_session = input.session_id.as_deref().unwrap_or("-"),
            outcome = resolution.outcome.as_str(),
            cached,
            "resolution complete"
        );
        Ok(Resolved { resolution, cached })
    }

    /// [`resolve`](Self::resolve), returning only the structured output.
    pub async fn run(&self, input: &ResolutionInput) -> Result<ResolutionOutput, WorkflowError> {
        Ok(self.resolve(input).await?.resolution.output)
    }

    /// Cache-less question answering: documentation first, incident
    /// diagnosis otherwise.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<AgentReply, WorkflowError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WorkflowError::EmptyQuery);
        }
        let k = k.filter(|k| *k > 0).unwrap_or(self.options.k);

        let passages = self.retrieve(query, k).await?;
        tracing::info!(k, hits = passages.len(), "local search");

        if passages.is_empty() {
            return Ok(self.diagnose(query).await);
        }

        let sources = source_paths(&passages);
        let answer = self.answer(query, &passages, &sources).await;
        Ok(AgentReply::new(answer, sources))
    }

    async fn compute(&self, query: &str) -> Result<Resolution> {
        let passages = self
            .retriever
            .retrieve(query, self.options.k)
            .await?;
        tracing::debug!(hits = passages.len(), "local search");

        let resolution = if passages.is_empty() {
            self.fallback(query).await
        } else {
            self.local_hit(query, &passages).await
        };

        self.cache.persist(query, &resolution).await;
        Ok(resolution)
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, WorkflowError> {
        self.retriever
            .retrieve(query, k)
            .await
            .map_err(|e| WorkflowError::Retrieval(format!("{:#}", e)))
    }

    async fn local_hit(&self, query: &str, passages: &[Passage]) -> Resolution {
        let sources = source_paths(passages);
        let diagnosis = self.answer(query, passages, &sources).await;

        Resolution {
            outcome: Outcome::LocalHit,
            output: ResolutionOutput {
                diagnosis,
                probable_causes: Vec::new(),
                recommended_actions: Vec::new(),
                evidence: sources.clone(),
                sources,
            },
        }
    }

    async fn fallback(&self, query: &str) -> Resolution {
        let diagnosis = self.diagnose(query).await;
        let answer = diagnosis.answer.trim().to_string();
        let probable_causes = if answer.is_empty() {
            Vec::new()
        } else {
            vec![answer.clone()]
        };

        let mut recommended_actions = Vec::new();
        let mut sources = merge_sources([diagnosis.sources.as_slice()]);

        if self.options.remediation {
            let instruction = remediation_instruction(query, &answer);
            match self.answerer.complete(&instruction).await {
                Ok(raw) => {
                    let steps = parse_reply(&raw, &[]);
                    recommended_actions = action_lines(&steps.answer);
                    sources = merge_sources([diagnosis.sources.as_slice(), steps.sources.as_slice()]);
                }
                Err(e) => tracing::warn!(error = %e, "remediation request failed"),
            }
        }

        Resolution {
            outcome: Outcome::Fallback,
            output: ResolutionOutput {
                diagnosis: answer,
                probable_causes,
                recommended_actions,
                evidence: sources.clone(),
                sources,
            },
        }
    }

    async fn answer(&self, query: &str, passages: &[Passage], sources: &[String]) -> String {
        match self.answerer.answer(query, passages).await {
            Ok(raw) => parse_reply(&raw, sources).answer,
            Err(e) => {
                tracing::warn!(error = %e, "answerer failed");
                ANSWER_UNAVAILABLE.to_string()
            }
        }
    }

    async fn diagnose(&self, query: &str) -> AgentReply {
        match self.incidents.diagnose(query).await {
            Ok(raw) => parse_reply(&raw, &[]),
            Err(e) => {
                tracing::warn!(error = %e, "incident diagnosis failed");
                AgentReply::new(DIAGNOSIS_UNAVAILABLE, Vec::new())
            }
        }
    }
}

/// `support ask`: answer one question without the session cache.
pub async fn run_ask(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let index = Arc::new(IndexHandle::new(IndexOptions::from_config(config)));
    let workflow = ResolutionWorkflow::from_config(config, index).await?;
    let reply = workflow.ask(query, k).await?;

    println!("{}", reply.answer);
    if !reply.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &reply.sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}

/// `support resolve`: run the workflow and print the structured output.
pub async fn run_resolve(config: &Config, query: &str, session_id: Option<String>) -> Result<()> {
    let index = Arc::new(IndexHandle::new(IndexOptions::from_config(config)));
    let workflow = ResolutionWorkflow::from_config(config, index).await?;
    let input = ResolutionInput {
        query: query.to_string(),
        session_id,
    };
    let resolved = workflow.resolve(&input).await?;

    eprintln!(
        "outcome: {}{}",
        resolved.resolution.outcome.as_str(),
        if resolved.cached { " (cached)" } else { "" }
    );
    println!("{}", serde_json::to_string_pretty(&resolved.resolution.output)?);
    Ok(())
}

/// Source paths of `passages`, de-duplicated in rank order.
fn source_paths(passages: &[Passage]) -> Vec<String> {
    let paths: Vec<String> = passages.iter().map(|p| p.source_path.clone()).collect();
    merge_sources([paths.as_slice()])
}

fn remediation_instruction(query: &str, diagnosis: &str) -> String {
    format!(
        "Support issue: {}\nDiagnosis: {}\n\
         List the internal remediation steps for this issue, one per line. \
         Return JSON: {{\"answer\": string, \"sources\": string[]}}",
        query, diagnosis
    )
}

/// One action per non-empty line, without list markers.
fn action_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_list_marker(line.trim()))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}
