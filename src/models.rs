//! Core data models used throughout podsage.
//!
//! These types represent the episodes, guests, and transcript chunks that flow
//! through the ingestion pipeline, plus the hit records produced by retrieval.

use serde::{Deserialize, Serialize};

/// A podcast guest. Created on first mention during ingestion.
#[derive(Debug, Clone)]
pub struct Guest {
    pub id: String,
    pub name: String,
    /// Stable identifier derived from the name; unique.
    pub slug: String,
}

/// One podcast episode, keyed by slug. Re-ingesting the same slug updates
/// the row in place.
#[derive(Debug, Clone)]
pub struct Episode {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub source_url: Option<String>,
    pub external_video_id: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: i64,
    pub duration_display: Option<String>,
    pub view_count: i64,
    pub raw_transcript_text: String,
    pub word_count: i64,
}

/// Front matter of an episode's `transcript.md`, as found in the corpus.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpisodeFrontMatter {
    pub title: Option<String>,
    pub guest: Option<String>,
    #[serde(alias = "youtube_url")]
    pub source_url: Option<String>,
    #[serde(alias = "video_id")]
    pub external_video_id: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: Option<i64>,
    #[serde(alias = "duration")]
    pub duration_display: Option<String>,
    pub view_count: Option<i64>,
}

/// A parsed transcript file before segmentation: metadata plus the raw
/// transcript body with speaker-turn annotations.
#[derive(Debug, Clone)]
pub struct EpisodeSource {
    pub slug: String,
    pub front_matter: EpisodeFrontMatter,
    pub transcript: String,
}

/// One speaker turn extracted from a transcript body.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerTurn {
    pub speaker: String,
    pub timestamp_label: Option<String>,
    pub timestamp_seconds: Option<i64>,
    pub text: String,
    /// True when an explicit section break preceded this turn.
    pub boundary_before: bool,
}

/// A chunk produced by the segmenter, not yet persisted or embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i64,
    pub speaker: String,
    pub timestamp_label: Option<String>,
    pub timestamp_seconds: Option<i64>,
    pub content: String,
    pub word_count: i64,
}

/// A stored transcript chunk row, as read back for embedding backfill.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub episode_id: String,
    pub chunk_index: i64,
    pub content: String,
}

/// One similarity-search result row. Multi-guest episodes fan out to one
/// row per guest; callers that don't care about guests de-duplicate by
/// `chunk_id`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub episode_id: String,
    pub episode_title: String,
    pub guest_name: Option<String>,
    pub speaker: String,
    pub content: String,
    pub timestamp_label: Option<String>,
    pub similarity: f64,
}

/// Episode row as listed by `episodes` / the `list_episodes` tool.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeListing {
    pub title: String,
    pub slug: String,
    pub guests: Vec<String>,
    pub source_url: Option<String>,
    pub description: Option<String>,
    pub duration_display: Option<String>,
    pub view_count: i64,
    pub chunk_count: i64,
}
