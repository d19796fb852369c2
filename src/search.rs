//! `gw search` and `gw ask`: print retrieval results and answers.

use anyhow::Result;

use crate::config::Config;
use crate::engine::RagEngine;

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let engine = RagEngine::from_config(config).await?;
    let k = limit.unwrap_or_else(|| engine.top_k());
    let chunks = engine.retrieve(query, k).await?;

    if chunks.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            chunk.similarity_score,
            chunk.metadata.title,
            chunk.id
        );
        if let Some(url) = &chunk.metadata.source_url {
            println!("    url: {}", url);
        }
        println!("    {}", snippet(&chunk.text, 200));
        println!();
    }

    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let engine = RagEngine::from_config(config).await?;
    let answer = engine.ask(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.answer);
    println!();
    if !answer.sources.is_empty() {
        println!("Sources:");
        for source in &answer.sources {
            match &source.source_url {
                Some(url) => println!("  - {} [{:.3}] {}", source.title, source.similarity, url),
                None => println!("  - {} [{:.3}]", source.title, source.similarity),
            }
        }
    }
    println!(
        "confidence: {:.3}  chunks: {}  status: {}",
        answer.confidence,
        answer.retrieved_chunk_count,
        serde_json::to_value(answer.status)?
            .as_str()
            .unwrap_or("unknown")
    );

    Ok(())
}

/// First `max_chars` characters of `text` on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
