//! Index statistics overview.
//!
//! Quick summary of what the configured collection holds, used by
//! `gw stats` to confirm that a build landed.

use anyhow::Result;

use crate::config::Config;
use crate::engine::RagEngine;

/// Run the stats command: open the collection and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let engine = RagEngine::from_config(config).await?;
    let stats = engine.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("groundwork index stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", stats.collection);
    println!();
    println!("  Entries:     {}", stats.entries);
    println!(
        "  Dimensions:  {}",
        stats
            .dims
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Embedding:   {}", stats.embedding_model);
    println!("  Generation:  {}", stats.generation_model);

    if stats.entries == 0 {
        println!();
        println!("  Index is empty. Run `gw build` to populate it.");
    }

    Ok(())
}

/// Format a byte count as a human-readable string (e.g. `"1.2 MB"`).
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
