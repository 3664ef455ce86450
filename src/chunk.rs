//! Recursive character text chunker.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters,
//! preferring paragraph breaks, then line breaks, then spaces, and only
//! hard-splitting inside a word as a last resort. Consecutive chunks of the
//! same page share up to `chunk_overlap` characters of trailing context.
//!
//! Each chunk receives a deterministic UUID derived from its source file,
//! page and index, plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::{Chunk, SourcePage};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunk every page, numbering chunks per page from 0.
pub fn chunk_pages(pages: &[SourcePage], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for (index, text) in split_text(&page.text, chunk_size, chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(make_chunk(&page.source, page.page, index as i64, &text));
        }
    }
    chunks
}

/// Split text into pieces of at most `chunk_size` characters.
///
/// Blank input yields no pieces.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    // First separator present in the text; "" always matches.
    let (sep_pos, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_empty() || text.contains(**s))
        .map(|(i, s)| (i, *s))
        .unwrap_or((separators.len().saturating_sub(1), ""));
    let remaining = &separators[(sep_pos + 1).min(separators.len())..];

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<String> = Vec::new();

    for piece in pieces {
        if char_len(&piece) <= chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, separator, chunk_size, chunk_overlap));
            fitting.clear();
        }
        if remaining.is_empty() {
            out.push(piece.trim().to_string());
        } else {
            out.extend(split_recursive(&piece, remaining, chunk_size, chunk_overlap));
        }
    }

    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, separator, chunk_size, chunk_overlap));
    }

    out.retain(|c| !c.is_empty());
    out
}

/// Greedily join small pieces up to `chunk_size`, carrying the tail of the
/// previous chunk forward as overlap.
fn merge_pieces(
    pieces: &[String],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut out = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joined_len = total + len + if window.is_empty() { 0 } else { sep_len };

        if joined_len > chunk_size && !window.is_empty() {
            push_joined(&mut out, &window, separator);

            // Drop from the front until only the overlap remains and the
            // next piece fits.
            while !window.is_empty()
                && (total > chunk_overlap
                    || total + len + if window.is_empty() { 0 } else { sep_len } > chunk_size)
            {
                if let Some(front) = window.pop_front() {
                    total -= char_len(front);
                    if !window.is_empty() {
                        total -= sep_len;
                    }
                }
            }
        }

        if !window.is_empty() {
            total += sep_len;
        }
        window.push_back(piece);
        total += len;
    }

    push_joined(&mut out, &window, separator);
    out
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window
        .iter()
        .copied()
        .collect::<Vec<&str>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(source: &str, page: u32, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let key = format!("{}:{}:{}", source, page, index);
    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string(),
        source: source.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
