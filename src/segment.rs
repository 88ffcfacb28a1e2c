//! Speaker-turn transcript segmenter.
//!
//! Accumulates consecutive speaker turns into chunks whose word counts land
//! in a configured band (default 400–600 words). Chunks close only at turn
//! boundaries; a single oversized turn becomes an oversized chunk rather
//! than being split mid-turn. Indices are 0-based, contiguous, and stable
//! across re-runs of the same transcript, which is what makes the
//! `(episode_id, chunk_index)` natural key reproducible.

use crate::config::SegmenterConfig;
use crate::models::{ChunkDraft, SpeakerTurn};
use crate::transcripts::count_words;

struct OpenChunk {
    speaker: String,
    timestamp_label: Option<String>,
    timestamp_seconds: Option<i64>,
    content: String,
    words: i64,
}

impl OpenChunk {
    fn start(turn: &SpeakerTurn) -> Self {
        Self {
            speaker: turn.speaker.clone(),
            timestamp_label: turn.timestamp_label.clone(),
            timestamp_seconds: turn.timestamp_seconds,
            content: turn.text.clone(),
            words: count_words(&turn.text),
        }
    }

    fn append(&mut self, turn: &SpeakerTurn) {
        self.content.push_str("\n\n");
        self.content.push_str(&turn.text);
        self.words += count_words(&turn.text);
    }

    fn close(self, chunk_index: i64) -> ChunkDraft {
        ChunkDraft {
            chunk_index,
            speaker: self.speaker,
            timestamp_label: self.timestamp_label,
            timestamp_seconds: self.timestamp_seconds,
            content: self.content,
            word_count: self.words,
        }
    }
}

/// Segment ordered speaker turns into chunk drafts.
///
/// A chunk closes at the first turn boundary at or past `target_words`, or
/// earlier when the next turn carries an explicit section boundary. A
/// trailing run shorter than `target_words` merges into the previous chunk
/// instead of standing alone, unless it is the only chunk.
pub fn segment_turns(turns: &[SpeakerTurn], config: &SegmenterConfig) -> Vec<ChunkDraft> {
    let target = config.target_words as i64;

    let mut chunks: Vec<ChunkDraft> = Vec::new();
    let mut open: Option<OpenChunk> = None;

    for turn in turns {
        if turn.boundary_before {
            if let Some(chunk) = open.take() {
                chunks.push(chunk.close(chunks.len() as i64));
            }
        }

        match open.as_mut() {
            Some(chunk) => chunk.append(turn),
            None => open = Some(OpenChunk::start(turn)),
        }

        if open.as_ref().map(|c| c.words).unwrap_or(0) >= target {
            let chunk = open.take().unwrap();
            chunks.push(chunk.close(chunks.len() as i64));
        }
    }

    if let Some(trailing) = open.take() {
        match chunks.last_mut() {
            Some(last) if trailing.words < target => {
                last.content.push_str("\n\n");
                last.content.push_str(&trailing.content);
                last.word_count += trailing.words;
            }
            _ => chunks.push(trailing.close(chunks.len() as i64)),
        }
    }

    chunks
}
