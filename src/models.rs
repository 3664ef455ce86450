//! Core data models used throughout the audit pipeline.
//!
//! Pages and chunks flow through ingestion; requests, results and findings
//! flow through the request-time audit path.

use serde::{Deserialize, Serialize};

/// Raw text of one PDF page, as produced by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    /// File name of the PDF (no directory component).
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// A bounded segment of a page's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: u32,
    /// Position of the chunk within its page, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub source: String,
    pub page: u32,
    pub text: String,
    /// Cosine similarity to the query.
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditRequest {
    #[serde(alias = "product_text")]
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Compliant,
    NonCompliant,
    #[default]
    Uncertain,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Compliant => "compliant",
            Verdict::NonCompliant => "non_compliant",
            Verdict::Uncertain => "uncertain",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    Riba,
    Gharar,
    HaramActivities,
    Maysir,
    Other,
}

/// A violation description with its derived classification.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Finding {
    pub description: String,
    pub severity: Severity,
    pub category: ViolationCategory,
}

/// Reference material that informed a result.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub page: u32,
    pub score: f64,
}

/// Structured outcome of an audit, returned to the caller as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    pub verdict: Verdict,
    pub violations: Vec<String>,
    pub analysis: String,
    pub findings: Vec<Finding>,
    pub sources: Vec<SourceRef>,
}

/// Outcome of a single-clause compliance check.
#[derive(Debug, Clone, Serialize)]
pub struct ClauseCheck {
    pub clause: String,
    pub compliant: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ViolationCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceExcerpt>,
}

/// Clause-by-clause audit: the extracted summary, a check for every
/// suspicious term it names, and the subset that failed.
#[derive(Debug, Clone, Serialize)]
pub struct ClauseAudit {
    pub product_summary: ProductSummary,
    pub suspicious_clauses: Vec<ClauseCheck>,
    pub violations: Vec<ClauseCheck>,
    /// True when every checked clause is compliant (vacuously so when none
    /// were flagged).
    pub overall_compliance: bool,
}

/// Best-matching reference passage for a clause.
#[derive(Debug, Clone, Serialize)]
pub struct SourceExcerpt {
    pub source_doc: String,
    pub page: u32,
    pub source_text: String,
}

/// Structured summary of a product description.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProductSummary {
    pub product_type: Option<String>,
    pub main_parties: Vec<String>,
    pub contract_type: Option<String>,
    pub key_clauses: Vec<String>,
    pub financial_terms: Vec<String>,
    pub suspicious_terms: Vec<String>,
}
