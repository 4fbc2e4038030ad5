//! Passage ranking over the corpus index.
//!
//! The query is projected into the index's term space and compared against
//! every passage row by cosine similarity. Rows are scored in parallel with
//! rayon. Every row takes part in the ranking, including rows that share no
//! terms with the query and score zero.
//!
//! Ordering is score descending; equal scores keep passage order, so results
//! are deterministic for a given index.

use anyhow::Result;
use async_trait::async_trait;
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::config::Config;
use crate::index::{CorpusIndex, IndexHandle, IndexOptions};
use crate::models::Passage;
use crate::traits::PassageRetriever;
use crate::vectorizer::cosine_similarity;

/// Top `k` passages of `index` for `query`.
///
/// Returns an empty list only for an empty index or `k == 0`. A query with
/// no known terms still yields `k` passages, all scored zero.
pub fn search(index: &CorpusIndex, query: &str, k: usize) -> Vec<Passage> {
    if k == 0 || index.is_empty() {
        return Vec::new();
    }

    let query_vec = index.vectorizer.transform(query);

    let mut scored: Vec<(usize, f32)> = index
        .matrix
        .par_iter()
        .enumerate()
        .map(|(row, vec)| (row, cosine_similarity(&query_vec, vec)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(row, score)| {
            let meta = &index.metadata[row];
            Passage {
                text: index.passages[row].clone(),
                source_path: meta.path.clone(),
                title: meta.title.clone(),
                chunk_id: meta.chunk_id,
                score,
            }
        })
        .collect()
}

#[async_trait]
impl PassageRetriever for IndexHandle {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let index = self.get().await?;
        Ok(search(&index, query, k))
    }
}

/// `support search`: print ranked passages.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let handle = IndexHandle::new(IndexOptions::from_config(config));
    let k = k.unwrap_or(config.retrieval.k);
    let results = handle.retrieve(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, passage) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, passage.score, passage.title);
        println!("    source: {}", passage.source_path);
        println!("    chunk: {}", passage.chunk_id);
        println!("    excerpt: \"{}\"", excerpt(&passage.text, 240));
        println!();
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
