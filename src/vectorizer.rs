//! Sparse TF-IDF term-weighting model.
//!
//! Text is lowercased and split into word tokens (runs of alphanumeric
//! characters or `_`, at least two characters long). Each document is
//! represented by its unigrams plus the bigrams of adjacent tokens.
//!
//! Weights use raw term counts and smoothed inverse document frequency:
//!
//! ```text
//! idf(t)   = ln((1 + n) / (1 + df(t))) + 1
//! w(t, d)  = count(t, d) * idf(t)
//! ```
//!
//! and every vector is L2-normalised, so cosine similarity between two
//! vectors is just their dot product.
//!
//! Terms absent from the fitted vocabulary are ignored when projecting a
//! query.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A sparse, L2-normalised term vector. Entries are sorted by term index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub entries: Vec<(u32, f32)>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dot product of two sorted sparse vectors (merge walk).
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_val) = self.entries[i];
            let (b_idx, b_val) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_val * b_val;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, v)| v * v).sum::<f32>().sqrt()
    }
}

/// Cosine similarity between two sparse vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f32 {
    let denom = a.norm() * b.norm();
    if denom < f32::EPSILON {
        return 0.0;
    }
    a.dot(b) / denom
}

/// Fitted vocabulary and IDF weights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    /// Term → column index. A `BTreeMap` keeps the persisted form stable.
    vocabulary: BTreeMap<String, u32>,
    /// IDF weight per column.
    idf: Vec<f32>,
}

impl TfIdfVectorizer {
    /// Fit the vocabulary over a corpus and return the vectorizer together
    /// with the term-document matrix (one row per input document).
    pub fn fit_transform(corpus: &[String]) -> (Self, Vec<SparseVector>) {
        let term_lists: Vec<Vec<String>> = corpus.iter().map(|doc| terms(doc)).collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for list in &term_lists {
            let unique: HashSet<&str> = list.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let n = corpus.len() as f32;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(doc_freq.len());
        // BTreeMap iteration is sorted, so column indices follow term order.
        for (idx, (term, df)) in doc_freq.into_iter().enumerate() {
            vocabulary.insert(term.to_string(), idx as u32);
            idf.push(((1.0 + n) / (1.0 + df as f32)).ln() + 1.0);
        }

        let vectorizer = Self { vocabulary, idf };
        let matrix = term_lists
            .iter()
            .map(|list| vectorizer.weigh(list))
            .collect();
        (vectorizer, matrix)
    }

    /// Project text into the fitted term space.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&terms(text))
    }

    /// Number of terms in the vocabulary.
    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    fn weigh(&self, terms: &[String]) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for term in terms {
            if let Some(&idx) = self.vocabulary.get(term.as_str()) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(idx, count)| (idx, count * self.idf[idx as usize]))
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);

        let mut vector = SparseVector { entries };
        let norm = vector.norm();
        if norm > 0.0 {
            for (_, v) in &mut vector.entries {
                *v /= norm;
            }
        }
        vector
    }
}

/// Lowercased word tokens of at least two characters.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Unigrams followed by adjacent-pair bigrams.
fn terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut out = Vec::with_capacity(tokens.len() * 2);
    for pair in tokens.windows(2) {
        out.push(format!("{} {}", pair[0], pair[1]));
    }
    out.extend(tokens);
    out
}
