//! The `sage episodes` command: browse the indexed episode catalog.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::store::{ChunkStore, EpisodeFilter, EpisodeSort};

pub async fn run_episodes(
    config: &Config,
    guest: Option<String>,
    search: Option<String>,
    sort: String,
    limit: i64,
) -> Result<()> {
    let sort: EpisodeSort = sort.parse()?;
    if limit < 1 {
        bail!("limit must be >= 1, got {}", limit);
    }

    let pool = db::connect(config).await?;
    let store = ChunkStore::new(pool);
    let episodes = store
        .list_episodes(&EpisodeFilter {
            guest,
            search,
            sort,
            limit,
        })
        .await?;

    if episodes.is_empty() {
        println!("No episodes.");
        store.pool().close().await;
        return Ok(());
    }

    for (i, episode) in episodes.iter().enumerate() {
        println!("{}. {}", i + 1, episode.title);
        if !episode.guests.is_empty() {
            println!("    guest: {}", episode.guests.join(", "));
        }
        if let Some(ref duration) = episode.duration_display {
            println!("    duration: {}", duration);
        }
        println!("    views: {}", episode.view_count);
        println!("    chunks: {}", episode.chunk_count);
        if let Some(ref url) = episode.source_url {
            println!("    url: {}", url);
        }
        println!("    slug: {}", episode.slug);
        println!();
    }

    store.pool().close().await;
    Ok(())
}
