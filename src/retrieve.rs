//! Query-time retrieval over the vector store.

use anyhow::Result;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::{RetrievedChunk, SourceExcerpt};
use crate::store::VectorStore;

/// Maximum characters of chunk text returned by [`find_source`].
pub const EXCERPT_CHARS: usize = 300;

/// Return up to `k` chunks nearest to `query`, best first.
///
/// A blank query or `k == 0` returns an empty list without embedding.
pub async fn retrieve(
    store: &VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    k: usize,
) -> Result<Vec<RetrievedChunk>> {
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, query).await?;
    let hits = store.nearest(&query_vec, k).await?;
    tracing::debug!(k, hits = hits.len(), "retrieved context");
    Ok(hits)
}

/// The single best-matching passage for `clause`, if the index has any.
pub async fn find_source(
    store: &VectorStore,
    embedder: &dyn EmbeddingProvider,
    clause: &str,
) -> Result<Option<SourceExcerpt>> {
    let best = retrieve(store, embedder, clause, 1).await?.into_iter().next();
    Ok(best.map(|chunk| SourceExcerpt {
        source_doc: chunk.source,
        page: chunk.page,
        source_text: truncate_chars(&chunk.text, EXCERPT_CHARS),
    }))
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
