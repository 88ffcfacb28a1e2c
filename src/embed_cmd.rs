//! Embedding backfill commands.
//!
//! `sage embed pending` fills in vectors for chunks that ingestion left
//! without one (provider outage, disabled provider at ingest time).
//! `sage embed rebuild` clears every vector and regenerates, for use
//! after an embedding model change.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::StoredChunk;
use crate::store::ChunkStore;

/// Embed chunks whose `embedding` column is still null.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = ChunkStore::new(pool);
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size).max(1);

    let pending = store.pending_chunks(limit.map(|l| l as i64)).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all chunks up to date");
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) = embed_stored(&store, provider.as_ref(), &pending, batch_size).await?;

    println!("embed pending");
    println!("  total pending: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    store.pool().close().await;
    Ok(())
}

/// Clear every embedding and regenerate from scratch.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = ChunkStore::new(pool);
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size).max(1);

    let cleared = store.clear_embeddings().await?;
    println!("embed rebuild");
    println!("  cleared: {} embeddings", cleared);

    let chunks = store.all_chunks(None).await?;
    if chunks.is_empty() {
        println!("  no chunks to embed");
        store.pool().close().await;
        return Ok(());
    }

    let total = chunks.len();
    let (embedded, failed) = embed_stored(&store, provider.as_ref(), &chunks, batch_size).await?;

    println!("  total chunks: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    store.pool().close().await;
    Ok(())
}

/// Embed stored chunks batch by batch, writing each vector as it lands.
/// A failed batch is logged and counted; the rest keep going.
async fn embed_stored(
    store: &ChunkStore,
    provider: &dyn EmbeddingProvider,
    chunks: &[StoredChunk],
    batch_size: usize,
) -> Result<(u64, u64)> {
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

        match provider.embed_documents(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                    store.set_chunk_embedding(&chunk.id, vector).await?;
                    embedded += 1;
                }
            }
            Ok(vectors) => {
                eprintln!(
                    "Warning: embedding batch returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
                failed += batch.len() as u64;
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
            }
        }
    }

    Ok((embedded, failed))
}
