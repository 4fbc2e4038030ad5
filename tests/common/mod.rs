#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use support_harness::index::IndexOptions;
use support_harness::models::Passage;
use support_harness::traits::{Answerer, IncidentSource, PassageRetriever};

pub fn write_docs(docs: &Path) {
    fs::create_dir_all(docs).unwrap();
    fs::write(
        docs.join("billing.md"),
        "# Billing FAQ\n\nInvoices are generated nightly and emailed to the account owner.",
    )
    .unwrap();
    fs::write(
        docs.join("auth.md"),
        "# Login Help\n\nReset your password from the account settings page.",
    )
    .unwrap();
}

pub fn index_options(root: &Path) -> IndexOptions {
    IndexOptions {
        docs_dir: root.join("docs"),
        index_path: root.join("data/index.json"),
        include_globs: vec!["**/*.md".to_string()],
        exclude_globs: Vec::new(),
        chunk_size: 900,
        overlap: 150,
    }
}

/// Answers with a fixed reply and counts calls.
pub struct EchoAnswerer {
    reply: String,
    pub calls: AtomicUsize,
}

impl EchoAnswerer {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Answerer for EchoAnswerer {
    async fn answer(&self, _query: &str, passages: &[Passage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if passages.is_empty() {
            return Err(anyhow!("no passages"));
        }
        Ok(self.reply.clone())
    }

    async fn complete(&self, _instruction: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Diagnoses with a fixed reply and counts calls.
pub struct FixedIncidents {
    reply: String,
    pub calls: AtomicUsize,
}

impl FixedIncidents {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IncidentSource for FixedIncidents {
    async fn diagnose(&self, _request: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Wraps a retriever and counts ranker invocations.
pub struct CountingRetriever<R> {
    inner: Arc<R>,
    pub calls: AtomicUsize,
}

impl<R> CountingRetriever<R> {
    pub fn new(inner: Arc<R>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: PassageRetriever> PassageRetriever for CountingRetriever<R> {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.retrieve(query, k).await
    }
}
