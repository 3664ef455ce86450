//! Prompt templates sent to the completion model.

use crate::models::RetrievedChunk;

const NO_CONTEXT: &str = "(no reference material retrieved)";

/// Render retrieved chunks as `[source p.N]` blocks separated by `---`.
pub fn render_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|c| format!("[{} p.{}]\n{}", c.source, c.page, c.text.trim()))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn audit_prompt(context: &[RetrievedChunk], text: &str) -> String {
    let context = render_context(context);
    let text = text.trim();
    // The parser also accepts labelled sections, but JSON is asked for first.
    format!(
        r#"You are a Shariah compliance auditor for Islamic finance products.

Rules:
1) Judge the product ONLY against the reference material below and well-established Shariah principles (riba, gharar, maysir, haram activities).
2) Quote or paraphrase the specific clause of the product for every violation.
3) If the material is insufficient to decide, use the verdict "uncertain".

Reference material:
{context}

Product description:
{text}

Output:
Return a single JSON object and nothing else:
{{
  "verdict": "compliant" | "non_compliant" | "uncertain",
  "violations": ["<one entry per violation>"],
  "analysis": "<short explanation citing the reference material>"
}}
"#
    )
}

pub fn extraction_prompt(text: &str) -> String {
    let text = text.trim();
    format!(
        r#"You are a Shariah compliance assistant. Analyze the following Islamic finance product description and extract structured information. Return only a JSON object with the following fields:

- "product_type": string
- "main_parties": list of strings
- "contract_type": string
- "key_clauses": list of strings
- "financial_terms": list of strings
- "suspicious_terms": list of clauses or phrases that may conflict with Shariah principles

Text:
{text}

Return valid JSON. Do not include explanations.
"#
    )
}

pub fn clause_prompt(context: &[RetrievedChunk], clause: &str) -> String {
    let context = render_context(context);
    let clause = clause.trim();
    format!(
        r#"You are a Shariah compliance expert. Assess the following clause from an Islamic finance product and decide whether it may violate Shariah principles.

Reference material:
{context}

Clause: "{clause}"

Return only a JSON object with this structure:
{{
  "clause": "...",
  "compliant": true or false,
  "reason": "..."
}}
"#
    )
}

pub fn suggestion_prompt(clause: &str) -> String {
    let clause = clause.trim();
    format!(
        r#"A clause in an Islamic finance contract has been flagged as non-compliant:

"{clause}"

Suggest a Shariah-compliant alternative or modification to make it acceptable. Reply with the suggested wording and one sentence of explanation.
"#
    )
}
