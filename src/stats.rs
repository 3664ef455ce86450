//! Index statistics overview.
//!
//! Summarises what the index holds: chunk and embedding counts, the
//! embedding model used, when it was built, and a per-document breakdown.
//! Used by `audit stats` to confirm an ingest did what was expected.

use anyhow::Result;

use crate::config::Config;
use crate::store::VectorStore;

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = VectorStore::open(config).await?;
    let stats = store.stats().await?;
    store.close().await;

    let db_path = config.index.db_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Shariah Audit Index Stats");
    println!("===========================");
    println!();
    println!("  Index:       {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  PDF folder:  {}", config.documents.folder.display());
    println!();
    println!("  Chunks:      {}", stats.chunks);
    println!("  Embedded:    {}", stats.embedded);
    println!(
        "  Model:       {}",
        stats.model.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Built:       {}",
        stats
            .built_at
            .as_deref()
            .map(format_built_at)
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.sources.is_empty() {
        println!();
        println!("  By document:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(57));
        for s in &stats.sources {
            println!("  {:<48} {:>8}", s.source, s.chunks);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "2026-03-01 14:05 (3 hours ago)" from an RFC 3339 timestamp.
fn format_built_at(rfc3339: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => {
            let ts = dt.timestamp();
            format!(
                "{} ({})",
                dt.format("%Y-%m-%d %H:%M"),
                format_relative(chrono::Utc::now().timestamp() - ts)
            )
        }
        Err(_) => rfc3339.to_string(),
    }
}

fn format_relative(delta: i64) -> String {
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
