//! Persistent vector store.
//!
//! Chunks and their embeddings live in SQLite (`chunks` and `chunk_vectors`).
//! Nearest-neighbour queries load every vector and rank by cosine
//! similarity in Rust, which is ample for a folder of reference PDFs.
//!
//! Each file's chunks are written in a single transaction, so a failure
//! mid-ingest never leaves a partially written file behind.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, RetrievedChunk};

/// Chunk count for one source document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceCount {
    pub source: String,
    pub chunks: i64,
}

/// Summary of what the index holds.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunks: i64,
    pub embedded: i64,
    pub sources: Vec<SourceCount>,
    pub model: Option<String>,
    pub built_at: Option<String>,
}

#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open the configured index, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn open_path(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    /// Remove every chunk, vector and metadata entry.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Write one file's chunks and their vectors atomically.
    ///
    /// `vectors[i]` must be the embedding of `chunks[i]`.
    pub async fn insert_file_chunks(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, page, chunk_index, text, hash)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    hash = excluded.hash
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.page as i64)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, model, dims, embedding)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Fail when the index was built with a different embedding model or
    /// dimensionality than `model`/`dims`. An empty index is always
    /// compatible.
    pub async fn ensure_compatible(&self, model: &str, dims: usize) -> Result<()> {
        if let Some(built_with) = self.get_meta("model").await? {
            if built_with != model {
                bail!(
                    "index was built with embedding model '{}' but '{}' is configured; run `audit ingest` to rebuild",
                    built_with,
                    model
                );
            }
        }

        let stored: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunk_vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        if let Some(stored) = stored {
            if stored != dims as i64 {
                bail!(
                    "index holds {}-dimensional vectors but the embedder produces {}; run `audit ingest` to rebuild",
                    stored,
                    dims
                );
            }
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Distinct source documents with their chunk counts, by name.
    pub async fn sources(&self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS chunks FROM chunks GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceCount {
                source: row.get("source"),
                chunks: row.get("chunks"),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(IndexStats {
            chunks: self.count().await?,
            embedded,
            sources: self.sources().await?,
            model: self.get_meta("model").await?,
            built_at: self.get_meta("built_at").await?,
        })
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Ties are broken by source, page and chunk position so results are
    /// stable across calls.
    pub async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.page, c.chunk_index, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(RetrievedChunk, i64)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(query, &blob_to_vec(&blob)) as f64;
                let page: i64 = row.get("page");
                (
                    RetrievedChunk {
                        chunk_id: row.get("id"),
                        source: row.get("source"),
                        page: page as u32,
                        text: row.get("text"),
                        score,
                    },
                    row.get::<i64, _>("chunk_index"),
                )
            })
            .collect();

        scored.sort_by(|(a, ai), (b, bi)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.page.cmp(&b.page))
                .then_with(|| ai.cmp(bi))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(chunk, _)| chunk).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, source: &str, page: u32, index: i64, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source: source.to_string(),
            page,
            chunk_index: index,
            text: text.to_string(),
            hash: format!("hash-{}", id),
        }
    }

    async fn open_tmp() -> (TempDir, VectorStore) {
        let tmp = TempDir::new().unwrap();
        let store = VectorStore::open_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (_tmp, store) = open_tmp().await;
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.sources().await.unwrap().is_empty());
        assert!(store.nearest(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity() {
        let (_tmp, store) = open_tmp().await;
        store
            .insert_file_chunks(
                &[
                    chunk("a", "a.pdf", 1, 0, "east"),
                    chunk("b", "a.pdf", 1, 1, "north"),
                    chunk("c", "a.pdf", 2, 0, "north-east"),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
                "test",
            )
            .await
            .unwrap();

        let hits = store.nearest(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "b");
        assert_eq!(hits[1].chunk_id, "c");
        assert!(hits[0].score >= hits[1].score);
        assert!(store.nearest(&[0.0, 1.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_vectors_rejected_without_writes() {
        let (_tmp, store) = open_tmp().await;
        let err = store
            .insert_file_chunks(&[chunk("a", "a.pdf", 1, 0, "x")], &[], "test")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_compatible() {
        let (_tmp, store) = open_tmp().await;
        store.ensure_compatible("anything", 7).await.unwrap();

        store
            .insert_file_chunks(&[chunk("a", "a.pdf", 1, 0, "x")], &[vec![1.0, 0.0]], "hash")
            .await
            .unwrap();
        store.set_meta("model", "hash").await.unwrap();

        store.ensure_compatible("hash", 2).await.unwrap();

        let err = store.ensure_compatible("all-minilm-l6-v2", 2).await.unwrap_err();
        assert!(err.to_string().contains("audit ingest"));

        let err = store.ensure_compatible("hash", 384).await.unwrap_err();
        assert!(err.to_string().contains("384"));
    }

    #[tokio::test]
    async fn test_clear_and_sources() {
        let (_tmp, store) = open_tmp().await;
        store
            .insert_file_chunks(
                &[chunk("a", "b.pdf", 1, 0, "x"), chunk("b", "a.pdf", 1, 0, "y")],
                &[vec![1.0], vec![1.0]],
                "test",
            )
            .await
            .unwrap();
        store.set_meta("model", "test").await.unwrap();

        let sources = store.sources().await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source, "a.pdf");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.model.as_deref(), Some("test"));

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_meta("model").await.unwrap().is_none());
    }
}
