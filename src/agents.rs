//! Model-backed collaborators.
//!
//! - [`LlmAnswerer`] answers from documentation passages.
//! - [`WebhookDiagnoser`] diagnoses incidents from the incident webhook's
//!   log feed.
//!
//! Both talk to the model through [`ChatClient`] and return its raw reply;
//! parsing happens in the workflow.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::{Config, IncidentsConfig};
use crate::llm::ChatClient;
use crate::models::Passage;
use crate::reply::DIAGNOSIS_UNAVAILABLE;
use crate::traits::{Answerer, IncidentSource};

/// Raw webhook bodies longer than this are cut before prompting.
const MAX_RAW_LOG_CHARS: usize = 4000;

/// Executions listed per incident in the summary.
const MAX_EXECUTIONS: usize = 5;

const REPLY_FORMAT: &str = r#"Return JSON: {"answer": string, "sources": string[]}"#;

// ============ Documentation answerer ============

pub struct LlmAnswerer {
    client: ChatClient,
    instructions: String,
}

impl LlmAnswerer {
    pub fn new(client: ChatClient, instructions: impl Into<String>) -> Self {
        Self {
            client,
            instructions: instructions.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ChatClient::new(&config.llm)?,
            config.llm.instructions.clone(),
        ))
    }
}

/// Prompt that restricts the model to the supplied passage texts.
pub fn answer_prompt(query: &str, passages: &[Passage]) -> String {
    let context = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context:\n{}\n\nQuestion: {}\nInstructions: Answer only from the Context above. \
         If it does not contain the answer, say so. {}",
        context, query, REPLY_FORMAT
    )
}

#[async_trait]
impl Answerer for LlmAnswerer {
    async fn answer(&self, query: &str, passages: &[Passage]) -> Result<String> {
        self.client
            .chat(&self.instructions, &answer_prompt(query, passages))
            .await
    }

    async fn complete(&self, instruction: &str) -> Result<String> {
        self.client.chat(&self.instructions, instruction).await
    }
}

// ============ Incident webhook ============

#[derive(Debug, Deserialize)]
struct IncidentFeed {
    incidents: Vec<Incident>,
}

#[derive(Debug, Deserialize)]
struct Incident {
    workflow: String,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    first_ts: Option<Value>,
    #[serde(default)]
    last_ts: Option<Value>,
    #[serde(default)]
    responsibles: Vec<Value>,
    #[serde(default)]
    error_signatures: Vec<ErrorSignature>,
    #[serde(default)]
    executions: Vec<Execution>,
}

#[derive(Debug, Deserialize)]
struct ErrorSignature {
    #[serde(default)]
    last_node: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Execution {
    #[serde(default)]
    ts: Option<Value>,
    #[serde(default)]
    last_node: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    execution_url: Option<String>,
}

/// Fetches the incident log feed. Never fails: problems are reported as
/// text so the diagnoser can still answer.
pub struct IncidentWebhook {
    http: reqwest::Client,
    url: Option<String>,
}

impl IncidentWebhook {
    pub fn new(config: &IncidentsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: config.webhook_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    /// Log text for the diagnosis prompt.
    pub async fn fetch_logs(&self) -> String {
        let Some(url) = &self.url else {
            return "Incident webhook URL is not configured.".to_string();
        };

        let result = async {
            let resp = self.http.get(url).send().await?.error_for_status()?;
            resp.text().await
        }
        .await;

        match result {
            Ok(body) => render_logs(&body),
            Err(e) => {
                tracing::warn!(error = %e, "incident webhook fetch failed");
                format!("Failed to fetch incident logs: {}", e)
            }
        }
    }
}

/// Summarise a webhook body, or fall back to the (truncated) raw text.
pub fn render_logs(body: &str) -> String {
    match serde_json::from_str::<IncidentFeed>(body) {
        Ok(feed) => summarize_incidents(&feed),
        Err(_) => truncate_chars(body.trim(), MAX_RAW_LOG_CHARS).to_string(),
    }
}

fn summarize_incidents(feed: &IncidentFeed) -> String {
    if feed.incidents.is_empty() {
        return "No incidents reported.".to_string();
    }

    let mut out = format!("{} incident(s):\n", feed.incidents.len());
    for incident in &feed.incidents {
        out.push_str(&format!(
            "- {}: {} occurrence(s) from {} to {}",
            incident.workflow,
            incident.count,
            value_text(incident.first_ts.as_ref()),
            value_text(incident.last_ts.as_ref()),
        ));
        if !incident.responsibles.is_empty() {
            let names: Vec<String> = incident
                .responsibles
                .iter()
                .map(|v| value_text(Some(v)))
                .collect();
            out.push_str(&format!("; responsibles: {}", names.join(", ")));
        }
        out.push('\n');

        for sig in &incident.error_signatures {
            out.push_str(&format!(
                "  error [{}] {} (x{})\n",
                sig.last_node.as_deref().unwrap_or("?"),
                sig.error_message.as_deref().unwrap_or(""),
                sig.count.unwrap_or(1),
            ));
        }
        for exec in incident.executions.iter().take(MAX_EXECUTIONS) {
            out.push_str(&format!(
                "  execution {} [{}] {}",
                value_text(exec.ts.as_ref()),
                exec.last_node.as_deref().unwrap_or("?"),
                exec.error_message.as_deref().unwrap_or(""),
            ));
            if let Some(url) = &exec.execution_url {
                out.push_str(&format!(" {}", url));
            }
            out.push('\n');
        }
    }
    out
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "?".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============ Incident diagnoser ============

pub struct WebhookDiagnoser {
    client: ChatClient,
    instructions: String,
    webhook: IncidentWebhook,
}

impl WebhookDiagnoser {
    pub fn new(client: ChatClient, instructions: impl Into<String>, webhook: IncidentWebhook) -> Self {
        Self {
            client,
            instructions: instructions.into(),
            webhook,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ChatClient::new(&config.llm)?,
            config.llm.diagnosis_instructions.clone(),
            IncidentWebhook::new(&config.incidents)?,
        ))
    }
}

pub fn diagnosis_prompt(request: &str, logs: &str) -> String {
    format!(
        "Diagnose the following support issue: {}\n\n\
         Incident log summary:\n{}\n\n\
         Each incident lists its workflow, occurrence count, first and last \
         timestamps, responsibles, error signatures and recent executions. \
         Provide a concise answer and cite the execution URLs you relied on as sources. {}",
        request, logs, REPLY_FORMAT
    )
}

#[async_trait]
impl IncidentSource for WebhookDiagnoser {
    async fn diagnose(&self, request: &str) -> Result<String> {
        let logs = self.webhook.fetch_logs().await;
        let prompt = diagnosis_prompt(request, &logs);

        match self.client.chat(&self.instructions, &prompt).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::warn!(error = %e, "diagnosis request failed");
                Ok(serde_json::json!({ "answer": DIAGNOSIS_UNAVAILABLE, "sources": [] }).to_string())
            }
        }
    }
}
