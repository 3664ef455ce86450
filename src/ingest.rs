//! Index build pipeline.
//!
//! Coordinates the full rebuild: load PDFs → chunk pages → embed in
//! batches → clear the store → write each file in its own transaction.
//! There is no transaction across files; a failure partway through leaves
//! the files written so far in the index.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::embedding::{embed_batched, EmbeddingProvider};
use crate::loader;
use crate::models::SourcePage;
use crate::store::VectorStore;

/// Counters reported after an index build.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IngestStats {
    pub files_found: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub pages: usize,
    pub chunks: usize,
    /// True when the built-in principles were indexed instead of PDFs.
    pub used_defaults: bool,
}

/// Rebuild the configured index from `documents.folder`.
pub async fn run_ingest(config: &Config, embedder: &dyn EmbeddingProvider) -> Result<IngestStats> {
    let store = VectorStore::open(config).await?;
    let result = ingest_folder(config, &store, embedder).await;
    store.close().await;
    result
}

/// Rebuild `store` from the PDFs in `documents.folder`.
pub async fn ingest_folder(
    config: &Config,
    store: &VectorStore,
    embedder: &dyn EmbeddingProvider,
) -> Result<IngestStats> {
    let folder = &config.documents.folder;
    let report = loader::load_folder(folder)
        .with_context(|| format!("Failed to scan PDF folder {}", folder.display()))?;

    let mut pages = report.pages;
    let mut used_defaults = false;
    if pages.is_empty() && config.documents.seed_defaults {
        tracing::info!("no PDF text found, indexing built-in principles");
        pages = loader::default_principles();
        used_defaults = true;
    }

    let mut stats = ingest_pages(config, store, embedder, &pages).await?;
    stats.files_found = report.files_found;
    stats.files_loaded = report.files_loaded;
    stats.files_skipped = report.skipped.len();
    stats.used_defaults = used_defaults;

    store
        .set_meta("folder", &folder.display().to_string())
        .await?;

    Ok(stats)
}

/// Clear `store` and index `pages`, one transaction per source file.
///
/// Only `pages` and `chunks` are filled in on the returned stats.
pub async fn ingest_pages(
    config: &Config,
    store: &VectorStore,
    embedder: &dyn EmbeddingProvider,
    pages: &[SourcePage],
) -> Result<IngestStats> {
    store.clear().await?;

    let mut stats = IngestStats {
        pages: pages.len(),
        ..Default::default()
    };

    for file_pages in group_by_source(pages) {
        let chunks = chunk_pages(
            file_pages,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        );
        if chunks.is_empty() {
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(embedder, &texts, config.embedding.batch_size)
            .await
            .with_context(|| format!("Failed to embed {}", file_pages[0].source))?;

        store
            .insert_file_chunks(&chunks, &vectors, embedder.model_name())
            .await?;

        tracing::info!(
            file = %file_pages[0].source,
            pages = file_pages.len(),
            chunks = chunks.len(),
            "indexed file"
        );
        stats.chunks += chunks.len();
    }

    store.set_meta("model", embedder.model_name()).await?;
    store
        .set_meta("built_at", &chrono::Utc::now().to_rfc3339())
        .await?;

    Ok(stats)
}

/// Split pages into runs sharing the same source. The loader emits pages
/// grouped by file, so consecutive runs are whole files.
fn group_by_source(pages: &[SourcePage]) -> Vec<&[SourcePage]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=pages.len() {
        if i == pages.len() || pages[i].source != pages[start].source {
            if start < i {
                groups.push(&pages[start..i]);
            }
            start = i;
        }
    }
    groups
}

pub fn print_summary(config: &Config, stats: &IngestStats) {
    println!("ingest {}", config.documents.folder.display());
    println!("  pdf files found: {}", stats.files_found);
    println!("  files loaded: {}", stats.files_loaded);
    println!("  files skipped: {}", stats.files_skipped);
    println!("  pages: {}", stats.pages);
    println!("  chunks written: {}", stats.chunks);
    if stats.used_defaults {
        println!("  (indexed built-in principles; folder had no readable text)");
    }
    println!("ok");
}
