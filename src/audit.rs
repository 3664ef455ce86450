//! Request-time audit pipeline.
//!
//! [`Auditor`] ties retrieval, prompt assembly, the completion model and
//! response parsing together. It holds no per-request state and is shared
//! behind an `Arc` by the HTTP server.

use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::llm::{complete_with_retry, CompletionClient, LlmError, OpenAiCompatClient, RetryPolicy};
use crate::models::{
    AuditResult, ClauseAudit, ClauseCheck, Finding, ProductSummary, RetrievedChunk, SourceExcerpt, SourceRef,
};
use crate::parse;
use crate::prompt;
use crate::retrieve::{self, EXCERPT_CHARS};
use crate::store::VectorStore;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct Auditor {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
    top_k: usize,
}

impl Auditor {
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn CompletionClient>,
        policy: RetryPolicy,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            policy,
            top_k,
        }
    }

    /// Open the index and build the configured embedder and LLM client.
    ///
    /// Fails when the LLM API key is not set, or when the index was built
    /// with a different embedder than the one configured.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm = OpenAiCompatClient::from_config(&config.llm)?;
        let embedder = create_provider(&config.embedding)?;
        let store = VectorStore::open(config).await?;
        store
            .ensure_compatible(embedder.model_name(), embedder.dims())
            .await?;
        Ok(Self::new(
            store,
            embedder,
            Arc::new(llm),
            RetryPolicy::from_config(&config.llm),
            config.retrieval.top_k,
        ))
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Judge a product description against the indexed reference material.
    pub async fn audit(&self, text: &str) -> Result<AuditResult, AuditError> {
        let text = require_text(text, "text")?;

        let context = self.context_for(text).await?;
        let raw = self.complete(&prompt::audit_prompt(&context, text)).await?;
        let parsed = parse::parse_audit_response(&raw);

        let findings = parsed
            .violations
            .iter()
            .map(|v| Finding {
                description: v.clone(),
                severity: parse::classify_severity(v),
                category: parse::classify_category(v),
            })
            .collect();

        tracing::info!(
            verdict = parsed.verdict.as_str(),
            violations = parsed.violations.len(),
            context_chunks = context.len(),
            "audit complete"
        );

        Ok(AuditResult {
            verdict: parsed.verdict,
            violations: parsed.violations,
            analysis: parsed.analysis,
            findings,
            sources: context.iter().map(source_ref).collect(),
        })
    }

    /// Check a single clause; non-compliant clauses get a severity,
    /// category and suggested rewording.
    pub async fn check_clause(&self, clause: &str) -> Result<ClauseCheck, AuditError> {
        let clause = require_text(clause, "clause")?;

        let context = self.context_for(clause).await?;
        let raw = self.complete(&prompt::clause_prompt(&context, clause)).await?;
        let (compliant, reason) = parse::parse_clause_response(&raw);

        let mut check = ClauseCheck {
            clause: clause.to_string(),
            compliant,
            reason,
            severity: None,
            category: None,
            suggested_fix: None,
            source: context.first().map(excerpt),
        };

        if !compliant {
            check.severity = Some(parse::classify_severity(&check.reason));
            check.category = Some(parse::classify_category(&check.reason));
            // A missing suggestion does not invalidate the check itself.
            match self.complete(&prompt::suggestion_prompt(clause)).await {
                Ok(fix) => check.suggested_fix = Some(fix.trim().to_string()),
                Err(e) => tracing::warn!(error = %e, "no suggested fix"),
            }
        }

        Ok(check)
    }

    /// Extract the product's suspicious terms and check each one in turn.
    pub async fn audit_clauses(&self, text: &str) -> Result<ClauseAudit, AuditError> {
        let product_summary = self.extract(text).await?;

        let mut suspicious_clauses = Vec::with_capacity(product_summary.suspicious_terms.len());
        for term in &product_summary.suspicious_terms {
            suspicious_clauses.push(self.check_clause(term).await?);
        }

        let violations: Vec<ClauseCheck> = suspicious_clauses
            .iter()
            .filter(|c| !c.compliant)
            .cloned()
            .collect();

        tracing::info!(
            clauses = suspicious_clauses.len(),
            violations = violations.len(),
            "clause audit complete"
        );

        Ok(ClauseAudit {
            overall_compliance: violations.is_empty(),
            product_summary,
            suspicious_clauses,
            violations,
        })
    }

    pub async fn find_source(&self, clause: &str) -> Result<Option<SourceExcerpt>, AuditError> {
        let clause = require_text(clause, "clause")?;
        Ok(retrieve::find_source(&self.store, self.embedder.as_ref(), clause).await?)
    }

    /// Extract a structured summary of a product description.
    pub async fn extract(&self, text: &str) -> Result<ProductSummary, AuditError> {
        let text = require_text(text, "text")?;
        let raw = self.complete(&prompt::extraction_prompt(text)).await?;
        Ok(parse::parse_product_summary(&raw))
    }

    async fn context_for(&self, query: &str) -> Result<Vec<RetrievedChunk>, AuditError> {
        Ok(retrieve::retrieve(&self.store, self.embedder.as_ref(), query, self.top_k).await?)
    }

    async fn complete(&self, prompt: &str) -> Result<String, AuditError> {
        Ok(complete_with_retry(self.llm.as_ref(), prompt, &self.policy).await?)
    }
}

fn require_text<'a>(value: &'a str, field: &str) -> Result<&'a str, AuditError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuditError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

fn source_ref(chunk: &RetrievedChunk) -> SourceRef {
    SourceRef {
        source: chunk.source.clone(),
        page: chunk.page,
        score: chunk.score,
    }
}

fn excerpt(chunk: &RetrievedChunk) -> SourceExcerpt {
    SourceExcerpt {
        source_doc: chunk.source.clone(),
        page: chunk.page,
        source_text: chunk.text.chars().take(EXCERPT_CHARS).collect(),
    }
}
