//! Lenient parsing of model output.
//!
//! The model is asked for JSON but often wraps it in prose, code fences or
//! Python-style literals, or ignores the request and answers with labelled
//! sections. Nothing here returns an error: unparseable input degrades to
//! an `uncertain` verdict with empty fields.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::models::{ProductSummary, Severity, Verdict, ViolationCategory};

lazy_static! {
    /// ```json { ... } ``` (language tag optional)
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap();

    static ref PY_LITERAL: Regex = Regex::new(r"\b(True|False|None)\b").unwrap();

    /// `Verdict:`, `**Violations**:`, `## Analysis:` ...
    static ref SECTION_HEADER: Regex = Regex::new(
        r"(?i)^\s*[#>*\s-]*(verdict|violations?|analysis)\s*\**\s*:\**\s*(.*)$"
    )
    .unwrap();

    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:[-*•]\s+|\d+[.)]\s+)").unwrap();

    static ref NEGATED_COMPLIANT: Regex =
        Regex::new(r"\b(?:non|not)\s*(?:\w+\s+){0,2}compliant\b").unwrap();
    static ref UNCERTAIN_WORD: Regex = Regex::new(r"\b(?:uncertain|unclear|partial)").unwrap();
    static ref COMPLIANT_WORD: Regex = Regex::new(r"compliant\b").unwrap();
}

/// Verdict, violations and analysis recovered from an audit response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedAudit {
    pub verdict: Verdict,
    pub violations: Vec<String>,
    pub analysis: String,
}

pub fn parse_audit_response(raw: &str) -> ParsedAudit {
    if let Some(parsed) = parse_json_object(raw).and_then(|v| audit_from_json(&v)) {
        return parsed;
    }
    parse_sections(raw)
}

/// Find a JSON object in `raw`: fenced block, then the outermost `{...}`
/// span, then that span with Python literals repaired.
pub fn parse_json_object(raw: &str) -> Option<Value> {
    if let Some(caps) = FENCED_JSON.captures(raw) {
        if let Some(v) = as_object(&caps[1]) {
            return Some(v);
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let span = &raw[start..=end];

    as_object(span).or_else(|| as_object(&repair_python_literals(span)))
}

fn as_object(s: &str) -> Option<Value> {
    serde_json::from_str::<Value>(s)
        .ok()
        .filter(|v| v.is_object())
}

fn repair_python_literals(s: &str) -> String {
    let quoted = s.replace('\'', "\"");
    PY_LITERAL
        .replace_all(&quoted, |caps: &regex::Captures| match &caps[1] {
            "True" => "true",
            "False" => "false",
            _ => "null",
        })
        .into_owned()
}

fn audit_from_json(value: &Value) -> Option<ParsedAudit> {
    let obj = value.as_object()?;
    let known = ["verdict", "compliant", "overall_compliance", "violations", "analysis"];
    if !known.iter().any(|k| obj.contains_key(*k)) {
        return None;
    }

    let verdict = obj
        .get("verdict")
        .or_else(|| obj.get("compliant"))
        .or_else(|| obj.get("overall_compliance"))
        .map(verdict_from_value)
        .unwrap_or_default();

    let violations = obj.get("violations").map(violations_from_value).unwrap_or_default();

    let analysis = ["analysis", "reason", "explanation"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(ParsedAudit {
        verdict,
        violations,
        analysis,
    })
}

fn verdict_from_value(value: &Value) -> Verdict {
    match value {
        Value::Bool(true) => Verdict::Compliant,
        Value::Bool(false) => Verdict::NonCompliant,
        Value::String(s) => normalize_verdict(s),
        _ => Verdict::Uncertain,
    }
}

fn violations_from_value(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => ["description", "violation", "clause", "reason"]
                    .iter()
                    .find_map(|k| o.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.lines().map(str::to_string).collect(),
        _ => Vec::new(),
    };
    clean_items(items)
}

/// Map free-form verdict wording onto [`Verdict`].
///
/// The earliest verdict phrase wins, so trailing remarks such as
/// "no non-compliant clauses" do not override a leading "Compliant".
pub fn normalize_verdict(text: &str) -> Verdict {
    let t = text
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .replace(['-', '_'], " ");

    match t.as_str() {
        "false" | "no" => return Verdict::NonCompliant,
        "true" | "yes" => return Verdict::Compliant,
        _ => {}
    }

    // Ties go to the first pattern: "non compliant" also contains "compliant".
    [
        (&*NEGATED_COMPLIANT, Verdict::NonCompliant),
        (&*UNCERTAIN_WORD, Verdict::Uncertain),
        (&*COMPLIANT_WORD, Verdict::Compliant),
    ]
    .into_iter()
    .filter_map(|(re, verdict)| re.find(&t).map(|m| (m.start(), verdict)))
    .min_by_key(|(start, _)| *start)
    .map(|(_, verdict)| verdict)
    .unwrap_or(Verdict::Uncertain)
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Verdict,
    Violations,
    Analysis,
}

fn parse_sections(raw: &str) -> ParsedAudit {
    let mut verdict: Vec<String> = Vec::new();
    let mut violations: Vec<String> = Vec::new();
    let mut analysis: Vec<String> = Vec::new();
    let mut current: Option<Section> = None;
    let mut saw_section = false;

    for line in raw.lines() {
        if let Some(caps) = SECTION_HEADER.captures(line) {
            let label = caps[1].to_lowercase();
            current = Some(if label == "verdict" {
                Section::Verdict
            } else if label.starts_with("violation") {
                Section::Violations
            } else {
                Section::Analysis
            });
            saw_section = true;
            let rest = caps[2].trim();
            if rest.is_empty() {
                continue;
            }
            push_line(current, rest, &mut verdict, &mut violations, &mut analysis);
            continue;
        }
        push_line(current, line, &mut verdict, &mut violations, &mut analysis);
    }

    if !saw_section {
        return ParsedAudit {
            verdict: Verdict::Uncertain,
            violations: Vec::new(),
            analysis: raw.trim().to_string(),
        };
    }

    ParsedAudit {
        verdict: verdict
            .iter()
            .find(|l| !l.trim().is_empty())
            .map(|l| normalize_verdict(l))
            .unwrap_or_default(),
        violations: clean_items(violations),
        analysis: analysis
            .iter()
            .map(|l| l.trim())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
    }
}

fn push_line(
    section: Option<Section>,
    line: &str,
    verdict: &mut Vec<String>,
    violations: &mut Vec<String>,
    analysis: &mut Vec<String>,
) {
    match section {
        Some(Section::Verdict) => verdict.push(line.to_string()),
        Some(Section::Violations) => push_violation_line(violations, line),
        Some(Section::Analysis) => analysis.push(line.to_string()),
        None => {}
    }
}

/// A list-marked line starts a new violation; an unmarked line directly
/// under a marked item continues it. A blank line ends the item.
fn push_violation_line(items: &mut Vec<String>, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        items.push(String::new());
        return;
    }
    let continues = !LIST_MARKER.is_match(line)
        && items.last().is_some_and(|prev| LIST_MARKER.is_match(prev));
    match items.last_mut() {
        Some(prev) if continues => {
            prev.push(' ');
            prev.push_str(trimmed);
        }
        _ => items.push(line.to_string()),
    }
}

/// Strip list markers, drop blanks and "none"-style placeholders.
fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| LIST_MARKER.replace(&item, "").trim().to_string())
        .filter(|item| !item.is_empty() && !is_none_marker(item))
        .collect()
}

fn is_none_marker(item: &str) -> bool {
    let t = item.trim_end_matches('.').trim().to_lowercase();
    matches!(
        t.as_str(),
        "none" | "n/a" | "na" | "nil" | "-" | "[]" | "none found" | "none identified"
            | "no violations" | "no violations found" | "no violations identified"
    )
}

/// Severity implied by a violation's reason text.
pub fn classify_severity(reason: &str) -> Severity {
    let r = reason.to_lowercase();
    if r.contains("riba") || r.contains("interest") {
        Severity::High
    } else if r.contains("gharar") || r.contains("uncertainty") {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Category implied by a violation's reason text.
pub fn classify_category(reason: &str) -> ViolationCategory {
    let r = reason.to_lowercase();
    if r.contains("riba") || r.contains("interest") {
        ViolationCategory::Riba
    } else if r.contains("gharar") || r.contains("uncertainty") {
        ViolationCategory::Gharar
    } else if r.contains("haram") || r.contains("prohibited sector") {
        ViolationCategory::HaramActivities
    } else if r.contains("maysir") || r.contains("gambling") || r.contains("speculat") {
        ViolationCategory::Maysir
    } else {
        ViolationCategory::Other
    }
}

/// Compliance flag and reason from a clause-check response.
///
/// Without a usable `compliant` field the wording of the whole response
/// decides; if that is inconclusive the clause is treated as non-compliant.
pub fn parse_clause_response(raw: &str) -> (bool, String) {
    if let Some(obj) = parse_json_object(raw) {
        let compliant = obj.get("compliant").map(verdict_from_value);
        let reason = obj
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if let Some(verdict) = compliant.filter(|v| *v != Verdict::Uncertain) {
            return (verdict == Verdict::Compliant, reason);
        }
    }

    match normalize_verdict(raw) {
        Verdict::Compliant => (true, raw.trim().to_string()),
        Verdict::NonCompliant => (false, raw.trim().to_string()),
        Verdict::Uncertain => (false, "Failed to parse compliance data".to_string()),
    }
}

/// Product summary from an extraction response; missing or mistyped
/// fields fall back to empty.
pub fn parse_product_summary(raw: &str) -> ProductSummary {
    let Some(obj) = parse_json_object(raw) else {
        return ProductSummary::default();
    };
    ProductSummary {
        product_type: string_field(&obj, "product_type"),
        main_parties: list_field(&obj, "main_parties"),
        contract_type: string_field(&obj, "contract_type"),
        key_clauses: list_field(&obj, "key_clauses"),
        financial_terms: list_field(&obj, "financial_terms"),
        suspicious_terms: list_field(&obj, "suspicious_terms"),
    }
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn list_field(obj: &Value, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
