//! PDF folder loader.
//!
//! Lists the `*.pdf` files directly inside the configured folder and
//! extracts their text page by page. A file that cannot be read or parsed
//! is recorded in [`LoadReport::skipped`] and logged; loading continues with
//! the next file.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::SourcePage;

/// Why a single file was not loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// A file that was skipped during loading.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: LoadError,
}

/// Result of scanning a folder.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Non-blank pages of every successfully loaded file, in file-name order.
    pub pages: Vec<SourcePage>,
    /// Number of `*.pdf` files found.
    pub files_found: usize,
    /// Number of files that parsed successfully.
    pub files_loaded: usize,
    pub skipped: Vec<SkippedFile>,
}

impl LoadReport {
    /// Names of the files that contributed at least one page.
    pub fn sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pages.iter().map(|p| p.source.as_str()).collect();
        names.dedup();
        names
    }
}

/// Load every PDF in `folder` (non-recursive).
///
/// Fails only when the folder itself is missing; per-file problems are
/// reported in the returned [`LoadReport`].
pub fn load_folder(folder: &Path) -> Result<LoadReport> {
    if !folder.is_dir() {
        bail!("PDF folder does not exist: {}", folder.display());
    }

    let matcher = pdf_matcher()?;
    let mut paths: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if matcher.is_match(name.as_ref()) {
            paths.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    paths.sort();

    let mut report = LoadReport {
        files_found: paths.len(),
        ..Default::default()
    };

    for path in paths {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match load_pdf(&path) {
            Ok(page_texts) => {
                let before = report.pages.len();
                report.pages.extend(pages_from_texts(&source, page_texts));
                report.files_loaded += 1;
                tracing::info!(
                    file = %source,
                    pages = report.pages.len() - before,
                    "loaded PDF"
                );
            }
            Err(reason) => {
                tracing::warn!(file = %path.display(), error = %reason, "skipping unreadable PDF");
                report.skipped.push(SkippedFile { path, reason });
            }
        }
    }

    Ok(report)
}

/// Read one PDF and return the raw text of each page.
pub fn load_pdf(path: &Path) -> Result<Vec<String>, LoadError> {
    let bytes = std::fs::read(path)?;
    extract_pages(&bytes)
}

/// Extract per-page text from PDF bytes.
///
/// `pdf-extract` panics on some malformed inputs, so the call is isolated
/// and a panic is reported as an ordinary extraction error.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(LoadError::Pdf(e.to_string())),
        Err(_) => Err(LoadError::Pdf("parser panicked on malformed input".to_string())),
    }
}

/// Convert raw page texts into [`SourcePage`]s, dropping blank pages.
pub fn pages_from_texts(source: &str, texts: Vec<String>) -> Vec<SourcePage> {
    texts
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| SourcePage {
            source: source.to_string(),
            page: i as u32 + 1,
            text,
        })
        .collect()
}

/// Built-in principles indexed when `documents.seed_defaults` is on and the
/// folder yields no text.
pub fn default_principles() -> Vec<SourcePage> {
    const SOURCE: &str = "default_principles.pdf";
    [
        "Riba (interest) is prohibited in Islamic finance. Any contractual increase over the principal in a loan is considered riba.",
        "Gharar (excessive uncertainty) should be avoided in Islamic contracts. Terms should be clear and well-defined.",
        "Maysir (gambling/speculation) is prohibited in Islamic finance. Contracts should be based on real economic activities.",
        "Investment in haram (prohibited) activities is not allowed, such as alcohol, pork products, conventional banking, or weapons.",
        "Murabaha is a cost-plus financing arrangement where the bank purchases an item and sells it to the customer at a markup.",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| SourcePage {
        source: SOURCE.to_string(),
        page: i as u32 + 1,
        text: text.to_string(),
    })
    .collect()
}

fn pdf_matcher() -> Result<GlobMatcher> {
    Ok(GlobBuilder::new("*.pdf")
        .case_insensitive(true)
        .build()?
        .compile_matcher())
}
