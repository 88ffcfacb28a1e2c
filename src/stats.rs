//! Corpus statistics and health overview.
//!
//! Provides a quick summary of what's indexed: guest and episode counts,
//! chunk counts, embedding coverage, and per-guest breakdowns. Used by
//! `sage stats` to give confidence that ingestion and embeddings are
//! working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::store::{ChunkStore, EpisodeFilter, EpisodeSort};

/// Per-guest breakdown of episode and chunk counts.
struct GuestStats {
    name: String,
    episode_count: i64,
    chunk_count: i64,
    embedded_count: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ChunkStore::new(pool);

    let counts = store.counts().await?;

    let db_size = std::fs::metadata(&config.database.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Podsage — Corpus Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.database.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Guests:      {}", counts.guests);
    println!("  Episodes:    {}", counts.episodes);
    println!("  Chunks:      {}", counts.chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        counts.embedded_chunks,
        counts.chunks,
        if counts.chunks > 0 {
            (counts.embedded_chunks * 100) / counts.chunks
        } else {
            0
        }
    );
    println!("  Words:       {}", counts.transcript_words);

    // Per-guest breakdown
    let guest_rows = sqlx::query(
        r#"
        SELECT
            g.name,
            COUNT(DISTINCT eg.episode_id) AS episode_count,
            COUNT(DISTINCT tc.id) AS chunk_count,
            COUNT(DISTINCT CASE WHEN tc.embedding IS NOT NULL THEN tc.id END) AS embedded_count
        FROM guests g
        LEFT JOIN episode_guests eg ON eg.guest_id = g.id
        LEFT JOIN transcript_chunks tc ON tc.episode_id = eg.episode_id
        GROUP BY g.id
        ORDER BY episode_count DESC, g.name ASC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let guest_stats: Vec<GuestStats> = guest_rows
        .iter()
        .map(|row| GuestStats {
            name: row.get("name"),
            episode_count: row.get("episode_count"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
        })
        .collect();

    if !guest_stats.is_empty() {
        println!();
        println!("  By guest:");
        println!(
            "  {:<28} {:>8} {:>8} {:>10}",
            "GUEST", "EPISODES", "CHUNKS", "EMBEDDED"
        );
        println!("  {}", "-".repeat(58));
        for g in &guest_stats {
            println!(
                "  {:<28} {:>8} {:>8} {:>10}",
                g.name, g.episode_count, g.chunk_count, g.embedded_count
            );
        }
    }

    // Most-viewed episodes
    let top = store
        .list_episodes(&EpisodeFilter {
            guest: None,
            search: None,
            sort: EpisodeSort::Views,
            limit: 5,
        })
        .await?;

    if !top.is_empty() {
        println!();
        println!("  Top episodes by views:");
        for episode in &top {
            println!(
                "  {:>10}  {} ({})",
                episode.view_count,
                episode.title,
                if episode.guests.is_empty() {
                    "no guest".to_string()
                } else {
                    episode.guests.join(", ")
                }
            );
        }
    }

    println!();

    store.pool().close().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
