//! Corpus index: build, persist, load, and staleness detection.
//!
//! The index is a single JSON file holding the fitted [`TfIdfVectorizer`],
//! the term-document matrix, every passage text, and per-passage metadata.
//! It is always rebuilt wholesale; there is no incremental patching.
//!
//! # Staleness
//!
//! A persisted index is reused only when all of the following hold:
//!
//! 1. the caller did not force a rebuild,
//! 2. no matching document has an mtime strictly newer than the index file,
//! 3. the file deserializes and passes its internal consistency checks.
//!
//! The file's mtime is the only staleness signal; there is no content hash.
//!
//! # Lifecycle
//!
//! [`IndexHandle`] is the process-wide holder. The first [`IndexHandle::get`]
//! builds or loads the index and memoizes it; later calls return the same
//! `Arc`. [`IndexHandle::rebuild`] is the only way to replace it. Both paths
//! run under one async mutex, so at most one build-and-persist is in flight
//! and readers never see a half-replaced index.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::corpus;
use crate::models::{Document, IndexStats, PassageMeta};
use crate::vectorizer::{SparseVector, TfIdfVectorizer};

/// Bumped whenever the serialized layout changes; older files are rebuilt.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Searchable structure over all passages of the corpus.
///
/// Invariant: `passages.len() == metadata.len() == matrix.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusIndex {
    pub version: u32,
    /// Unix timestamp of the build.
    pub built_at: i64,
    pub vectorizer: TfIdfVectorizer,
    pub matrix: Vec<SparseVector>,
    pub passages: Vec<String>,
    pub metadata: Vec<PassageMeta>,
    pub file_count: usize,
    pub chunk_count: usize,
}

impl CorpusIndex {
    /// Chunk every document and fit the term model over all passages.
    pub fn build(
        documents: &[Document],
        file_count: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Self {
        let mut passages = Vec::new();
        let mut metadata = Vec::new();

        for doc in documents {
            let path = doc.path.display().to_string();
            for (chunk_id, chunk) in chunk_text(&doc.text, chunk_size, overlap)
                .into_iter()
                .enumerate()
            {
                passages.push(chunk);
                metadata.push(PassageMeta {
                    path: path.clone(),
                    title: doc.title.clone(),
                    chunk_id,
                });
            }
        }

        let (vectorizer, matrix) = TfIdfVectorizer::fit_transform(&passages);
        let chunk_count = passages.len();

        Self {
            version: INDEX_FORMAT_VERSION,
            built_at: chrono::Utc::now().timestamp(),
            vectorizer,
            matrix,
            passages,
            metadata,
            file_count,
            chunk_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.file_count,
            chunks: self.chunk_count,
        }
    }

    /// Deserialize and validate a persisted index.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let index: CorpusIndex = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse index {}", path.display()))?;
        index.validate()?;
        Ok(index)
    }

    fn validate(&self) -> Result<()> {
        if self.version != INDEX_FORMAT_VERSION {
            bail!(
                "index format version {} (expected {})",
                self.version,
                INDEX_FORMAT_VERSION
            );
        }
        if self.passages.len() != self.metadata.len()
            || self.passages.len() != self.matrix.len()
            || self.passages.len() != self.chunk_count
        {
            bail!(
                "inconsistent index: {} passages, {} metadata rows, {} matrix rows, chunk_count {}",
                self.passages.len(),
                self.metadata.len(),
                self.matrix.len(),
                self.chunk_count
            );
        }
        Ok(())
    }

    /// Write the index to `path`, replacing any previous content.
    ///
    /// Writes a sibling `.tmp` file first and renames it into place.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let bytes = serde_json::to_vec(self)?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move index into {}", path.display()))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Where the index, its documents, and its chunking parameters live.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub docs_dir: PathBuf,
    pub index_path: PathBuf,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            docs_dir: config.docs.dir.clone(),
            index_path: config.index.path.clone(),
            include_globs: config.docs.include_globs.clone(),
            exclude_globs: config.docs.exclude_globs.clone(),
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
        }
    }
}

/// Why an index was rebuilt instead of loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Forced,
    Missing,
    Stale,
    Unreadable,
}

/// How [`build_or_load`] obtained its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Loaded,
    Built(RebuildReason),
}

impl fmt::Display for IndexOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexOrigin::Loaded => write!(f, "loaded"),
            IndexOrigin::Built(RebuildReason::Forced) => write!(f, "rebuilt (forced)"),
            IndexOrigin::Built(RebuildReason::Missing) => write!(f, "built (no index file)"),
            IndexOrigin::Built(RebuildReason::Stale) => write!(f, "rebuilt (documents changed)"),
            IndexOrigin::Built(RebuildReason::Unreadable) => {
                write!(f, "rebuilt (index unreadable)")
            }
        }
    }
}

/// Load the persisted index when it is still valid, otherwise rebuild it
/// from the documents and persist the result.
///
/// Blocking: performs filesystem I/O and the full build.
pub fn build_or_load(options: &IndexOptions, force: bool) -> Result<(CorpusIndex, IndexOrigin)> {
    let paths = corpus::scan_documents(
        &options.docs_dir,
        &options.include_globs,
        &options.exclude_globs,
    )?;
    let latest_doc = corpus::latest_modified(&paths);

    let reason = if force {
        RebuildReason::Forced
    } else if !options.index_path.exists() {
        RebuildReason::Missing
    } else {
        match check_persisted(&options.index_path, latest_doc) {
            Ok(Some(index)) => {
                tracing::info!(path = %options.index_path.display(), "local index loaded");
                return Ok((index, IndexOrigin::Loaded));
            }
            Ok(None) => {
                tracing::info!(
                    path = %options.index_path.display(),
                    "documents changed after index build, rebuilding"
                );
                RebuildReason::Stale
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load index, rebuilding");
                RebuildReason::Unreadable
            }
        }
    };

    tracing::info!(docs = %options.docs_dir.display(), ?reason, "building local index");
    if paths.is_empty() {
        tracing::info!(docs = %options.docs_dir.display(), "no markdown files found");
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        match corpus::read_document(path) {
            Ok(doc) => documents.push(doc),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping document"),
        }
    }

    let index = CorpusIndex::build(&documents, paths.len(), options.chunk_size, options.overlap);
    if index.is_empty() {
        tracing::info!(docs = %options.docs_dir.display(), "no passages extracted");
    }

    match index.persist(&options.index_path) {
        Ok(()) => pin_index_mtime(&options.index_path, latest_doc),
        Err(e) => tracing::warn!(
            path = %options.index_path.display(),
            error = %e,
            "failed to persist index; serving in-memory copy"
        ),
    }

    tracing::info!(
        files = index.file_count,
        chunks = index.chunk_count,
        "local index built"
    );
    Ok((index, IndexOrigin::Built(reason)))
}

/// `Ok(None)` when the documents are newer than the index file.
fn check_persisted(path: &Path, latest_doc: Option<SystemTime>) -> Result<Option<CorpusIndex>> {
    let index_mtime = std::fs::metadata(path)?.modified()?;
    if latest_doc.is_some_and(|doc| doc > index_mtime) {
        return Ok(None);
    }
    CorpusIndex::load(path).map(Some)
}

/// Documents stamped in the future would otherwise look newer than every
/// fresh index and force a rebuild on each access.
fn pin_index_mtime(path: &Path, latest_doc: Option<SystemTime>) {
    let Some(latest) = latest_doc else {
        return;
    };
    if latest <= SystemTime::now() {
        return;
    }
    let result = std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(latest));
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "could not adjust index mtime");
    }
}

/// Process-wide, lazily initialised index holder.
pub struct IndexHandle {
    options: IndexOptions,
    current: Mutex<Option<Arc<CorpusIndex>>>,
}

impl IndexHandle {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            options,
            current: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// The memoized index, building or loading it on first access.
    pub async fn get(&self) -> Result<Arc<CorpusIndex>> {
        let mut current = self.current.lock().await;
        if let Some(index) = current.as_ref() {
            return Ok(Arc::clone(index));
        }
        let (index, _) = run_blocking(self.options.clone(), false).await?;
        let index = Arc::new(index);
        *current = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Re-run the staleness check (or force a rebuild) and replace the
    /// memoized index.
    pub async fn rebuild(&self, force: bool) -> Result<(Arc<CorpusIndex>, IndexOrigin)> {
        let mut current = self.current.lock().await;
        let (index, origin) = run_blocking(self.options.clone(), force).await?;
        let index = Arc::new(index);
        *current = Some(Arc::clone(&index));
        Ok((index, origin))
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(self.get().await?.stats())
    }
}

/// `support index`: build or load the index and report what happened.
pub async fn run_index(config: &Config, force: bool) -> Result<()> {
    let handle = IndexHandle::new(IndexOptions::from_config(config));
    let (index, origin) = handle.rebuild(force).await?;
    println!(
        "Index {}: {} files, {} chunks ({})",
        origin,
        index.file_count,
        index.chunk_count,
        config.index.path.display()
    );
    Ok(())
}

async fn run_blocking(options: IndexOptions, force: bool) -> Result<(CorpusIndex, IndexOrigin)> {
    tokio::task::spawn_blocking(move || build_or_load(&options, force))
        .await
        .context("index build task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(root: &Path) -> IndexOptions {
        IndexOptions {
            docs_dir: root.join("docs"),
            index_path: root.join("data/index.json"),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: Vec::new(),
            chunk_size: 900,
            overlap: 150,
        }
    }

    fn write_docs(root: &Path) {
        let docs = root.join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(
            docs.join("billing.md"),
            "# Billing FAQ\n\nInvoices are generated nightly.",
        )
        .unwrap();
        fs::write(
            docs.join("auth.md"),
            "# Login\n\nReset your password from the account page.",
        )
        .unwrap();
    }

    fn age_file(path: &Path, secs: u64) {
        let past = SystemTime::now() - Duration::from_secs(secs);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(past)
            .unwrap();
    }

    #[test]
    fn test_first_build_then_load() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let opts = options(tmp.path());

        let (first, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Built(RebuildReason::Missing));
        assert_eq!(first.file_count, 2);
        assert_eq!(first.chunk_count, 2);
        assert!(opts.index_path.exists());

        let (second, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Loaded);
        assert_eq!(second.stats(), first.stats());
        assert_eq!(second.passages, first.passages);
    }

    #[test]
    fn test_force_rebuild() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let opts = options(tmp.path());
        build_or_load(&opts, false).unwrap();

        let (_, origin) = build_or_load(&opts, true).unwrap();
        assert_eq!(origin, IndexOrigin::Built(RebuildReason::Forced));
    }

    #[test]
    fn test_stale_document_triggers_exactly_one_rebuild() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let opts = options(tmp.path());
        build_or_load(&opts, false).unwrap();

        // Make the index older than the documents.
        age_file(&opts.index_path, 3600);

        let (_, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Built(RebuildReason::Stale));

        let (_, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Loaded);
    }

    #[test]
    fn test_future_document_does_not_loop() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let opts = options(tmp.path());
        let doc = tmp.path().join("docs/billing.md");
        let future = SystemTime::now() + Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&doc)
            .unwrap()
            .set_modified(future)
            .unwrap();

        build_or_load(&opts, false).unwrap();
        let (_, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Loaded);
    }

    #[test]
    fn test_corrupt_index_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let opts = options(tmp.path());
        build_or_load(&opts, false).unwrap();

        fs::write(&opts.index_path, b"{ not json").unwrap();
        let (index, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Built(RebuildReason::Unreadable));
        assert_eq!(index.chunk_count, 2);
        assert!(CorpusIndex::load(&opts.index_path).is_ok());
    }

    #[test]
    fn test_inconsistent_index_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let opts = options(tmp.path());
        let (mut index, _) = build_or_load(&opts, false).unwrap();
        index.metadata.pop();
        index.persist(&opts.index_path).unwrap();

        let err = CorpusIndex::load(&opts.index_path).unwrap_err();
        assert!(err.to_string().contains("inconsistent"));
    }

    #[test]
    fn test_empty_docs_dir_builds_empty_index() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        let opts = options(tmp.path());

        let (index, _) = build_or_load(&opts, false).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.stats(), IndexStats { files: 0, chunks: 0 });

        let (_, origin) = build_or_load(&opts, false).unwrap();
        assert_eq!(origin, IndexOrigin::Loaded);
    }

    #[test]
    fn test_metadata_tracks_chunk_positions() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("long.md"), "# Long\n\n".to_string() + &"word ".repeat(400)).unwrap();
        let mut opts = options(tmp.path());
        opts.chunk_size = 200;
        opts.overlap = 50;

        let (index, _) = build_or_load(&opts, false).unwrap();
        assert!(index.chunk_count > 1);
        for (i, meta) in index.metadata.iter().enumerate() {
            assert_eq!(meta.chunk_id, i);
            assert_eq!(meta.title, "Long");
        }
    }

    #[tokio::test]
    async fn test_handle_memoizes_until_rebuild() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let handle = IndexHandle::new(options(tmp.path()));

        let a = handle.get().await.unwrap();
        let b = handle.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let (c, origin) = handle.rebuild(true).await.unwrap();
        assert_eq!(origin, IndexOrigin::Built(RebuildReason::Forced));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(handle.stats().await.unwrap(), IndexStats { files: 2, chunks: 2 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_builds_once() {
        let tmp = TempDir::new().unwrap();
        write_docs(tmp.path());
        let handle = Arc::new(IndexHandle::new(options(tmp.path())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.get().await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        for index in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], index));
        }
        assert!(tmp.path().join("data/index.json").exists());
        assert!(!tmp.path().join("data/index.json.tmp").exists());
    }
}
