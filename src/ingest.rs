//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: discovery → parsing → segmentation →
//! embedding → storage. Re-running over an unchanged corpus is a no-op
//! that converges to the same rows and ids; embedding failures are
//! non-fatal and leave chunks pending for `sage embed pending`.

use anyhow::{bail, Result};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{ChunkDraft, Episode};
use crate::segment;
use crate::store::{ChunkState, ChunkStore, ChunkWrite};
use crate::transcripts;

pub async fn run_ingest(config: &Config, dry_run: bool, limit: Option<usize>) -> Result<()> {
    let mut paths = transcripts::discover(config)?;
    if let Some(lim) = limit {
        paths.truncate(lim);
    }

    if dry_run {
        println!("ingest (dry-run)");
        println!("  transcripts found: {}", paths.len());
        let mut estimated = 0usize;
        for path in &paths {
            match transcripts::parse_file(path) {
                Ok(source) => {
                    let turns = transcripts::parse_turns(&source.transcript);
                    estimated += segment::segment_turns(&turns, &config.segmenter).len();
                }
                Err(e) => eprintln!("Warning: skipping {}: {}", path.display(), e),
            }
        }
        println!("  estimated chunks: {}", estimated);
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let store = ChunkStore::new(pool);
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);

    let mut episodes_ingested = 0u64;
    let mut episodes_failed = 0u64;
    let mut chunks_written = 0u64;
    let mut chunks_unchanged = 0u64;
    let mut embeddings_written = 0u64;
    let mut embeddings_pending = 0u64;
    let mut links_added = 0usize;
    let mut links_removed = 0usize;

    for path in &paths {
        // One bad transcript must not sink the rest of the corpus.
        match ingest_one(&store, &provider, config, path).await {
            Ok(outcome) => {
                episodes_ingested += 1;
                chunks_written += outcome.chunks_written;
                chunks_unchanged += outcome.chunks_unchanged;
                embeddings_written += outcome.embeddings_written;
                embeddings_pending += outcome.embeddings_pending;
                links_added += outcome.links_added;
                links_removed += outcome.links_removed;
            }
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", path.display(), e);
                episodes_failed += 1;
            }
        }
    }

    println!("ingest");
    println!("  transcripts found: {}", paths.len());
    println!("  episodes ingested: {}", episodes_ingested);
    if episodes_failed > 0 {
        println!("  episodes failed: {}", episodes_failed);
    }
    println!("  chunks written: {}", chunks_written);
    println!("  chunks unchanged: {}", chunks_unchanged);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", embeddings_written);
        println!("  embeddings pending: {}", embeddings_pending);
    }
    println!("  guest links added: {}", links_added);
    println!("  guest links removed: {}", links_removed);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

struct EpisodeOutcome {
    chunks_written: u64,
    chunks_unchanged: u64,
    embeddings_written: u64,
    embeddings_pending: u64,
    links_added: usize,
    links_removed: usize,
}

async fn ingest_one(
    store: &ChunkStore,
    provider: &Arc<dyn EmbeddingProvider>,
    config: &Config,
    path: &Path,
) -> Result<EpisodeOutcome> {
    let source = transcripts::parse_file(path)?;
    let turns = transcripts::parse_turns(&source.transcript);
    if turns.is_empty() {
        bail!("no speaker turns found");
    }
    let drafts = segment::segment_turns(&turns, &config.segmenter);

    let fm = &source.front_matter;
    let episode = Episode {
        id: String::new(),
        title: fm.title.clone().unwrap_or_else(|| source.slug.clone()),
        slug: source.slug.clone(),
        source_url: fm.source_url.clone(),
        external_video_id: fm.external_video_id.clone(),
        description: fm.description.clone(),
        duration_seconds: fm
            .duration_seconds
            .or_else(|| {
                fm.duration_display
                    .as_deref()
                    .and_then(transcripts::parse_timestamp)
            })
            .unwrap_or(0),
        duration_display: fm.duration_display.clone(),
        view_count: fm.view_count.unwrap_or(0),
        raw_transcript_text: source.transcript.clone(),
        word_count: transcripts::count_words(&source.transcript),
    };
    let episode_id = store.upsert_episode(&episode).await?;

    let guest_names = fm
        .guest
        .as_deref()
        .map(transcripts::parse_guest_names)
        .unwrap_or_default();
    let guests: Vec<(String, String)> = guest_names
        .iter()
        .map(|name| (name.clone(), transcripts::slugify(name)))
        .collect();
    let (links_added, links_removed) = store.upsert_guests_and_links(&episode_id, &guests).await?;

    let states = store.chunk_states(&episode_id).await?;
    let enabled = config.embedding.is_enabled();
    let plans: Vec<ChunkPlan> = drafts
        .iter()
        .map(|draft| plan_chunk(states.get(&draft.chunk_index), draft, enabled))
        .collect();

    // Embed everything the plan asks for, in bounded-concurrency batches.
    let targets: Vec<(usize, String)> = drafts
        .iter()
        .enumerate()
        .filter(|(i, _)| plans[*i] == ChunkPlan::Embed)
        .map(|(i, draft)| (i, draft.content.clone()))
        .collect();
    let mut vectors = embed_draft_batches(provider, &config.embedding, targets).await;

    let mut outcome = EpisodeOutcome {
        chunks_written: 0,
        chunks_unchanged: 0,
        embeddings_written: 0,
        embeddings_pending: 0,
        links_added,
        links_removed,
    };

    let mut writes: Vec<ChunkWrite> = Vec::new();
    for (i, draft) in drafts.iter().enumerate() {
        match plans[i] {
            ChunkPlan::Keep => outcome.chunks_unchanged += 1,
            ChunkPlan::WriteUnembedded => {
                writes.push(ChunkWrite {
                    draft,
                    embedding: None,
                });
                outcome.chunks_written += 1;
                outcome.embeddings_pending += 1;
            }
            ChunkPlan::Embed => {
                let embedding = vectors.remove(&i);
                if embedding.is_some() {
                    outcome.embeddings_written += 1;
                } else {
                    outcome.embeddings_pending += 1;
                }
                writes.push(ChunkWrite { draft, embedding });
                outcome.chunks_written += 1;
            }
        }
    }

    store
        .apply_chunks(&episode_id, &writes, drafts.len() as i64)
        .await?;
    Ok(outcome)
}

/// What ingestion should do with one draft, given the stored row (if any)
/// at the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPlan {
    /// Stored row already matches the draft; leave it untouched.
    Keep,
    /// Write the row and ask the provider for its vector.
    Embed,
    /// Write the row with a null embedding (no provider configured).
    WriteUnembedded,
}

fn plan_chunk(state: Option<&ChunkState>, draft: &ChunkDraft, embeddings_enabled: bool) -> ChunkPlan {
    match state {
        // An unchanged row keeps its embedding; an unchanged row that
        // never got one is re-tried whenever a provider is configured.
        Some(s) if s.matches(draft) => {
            if s.embedded || !embeddings_enabled {
                ChunkPlan::Keep
            } else {
                ChunkPlan::Embed
            }
        }
        _ => {
            if embeddings_enabled {
                ChunkPlan::Embed
            } else {
                ChunkPlan::WriteUnembedded
            }
        }
    }
}

/// Embed `(draft index, content)` pairs in batches of
/// `config.batch_size`, at most `config.max_concurrent_requests` batches
/// in flight. A failed batch is logged and its chunks stay pending, so
/// one bad request never drops transcript content.
async fn embed_draft_batches(
    provider: &Arc<dyn EmbeddingProvider>,
    config: &crate::config::EmbeddingConfig,
    targets: Vec<(usize, String)>,
) -> HashMap<usize, Vec<f32>> {
    if targets.is_empty() {
        return HashMap::new();
    }

    let batch_size = config.batch_size.max(1);
    let batches: Vec<Vec<(usize, String)>> =
        targets.chunks(batch_size).map(|b| b.to_vec()).collect();

    let results: Vec<(Vec<usize>, Result<Vec<Vec<f32>>>)> = stream::iter(batches)
        .map(|batch| {
            let provider = Arc::clone(provider);
            async move {
                let indices: Vec<usize> = batch.iter().map(|(i, _)| *i).collect();
                let texts: Vec<String> = batch.into_iter().map(|(_, text)| text).collect();
                let result = provider.embed_documents(&texts).await;
                (indices, result)
            }
        })
        .buffer_unordered(config.max_concurrent_requests.max(1))
        .collect()
        .await;

    let mut vectors = HashMap::new();
    for (indices, result) in results {
        match result {
            Ok(vecs) if vecs.len() == indices.len() => {
                for (index, vec) in indices.into_iter().zip(vecs) {
                    vectors.insert(index, vec);
                }
            }
            Ok(vecs) => {
                eprintln!(
                    "Warning: embedding batch returned {} vectors for {} chunks",
                    vecs.len(),
                    indices.len()
                );
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
            }
        }
    }
    vectors
}
