//! Vector similarity search over stored chunks.
//!
//! Candidates are fetched with their metadata join (episode title, guest
//! fan-out) and scored in-process with cosine similarity. Only hits
//! strictly above the threshold survive; ordering is descending
//! similarity with ties broken by the chunk natural key so results are
//! deterministic run to run.

use anyhow::bail;

use crate::config::{Config, EMBEDDING_DIMS};
use crate::db;
use crate::embedding::{self, blob_to_vec, cosine_similarity};
use crate::error::WisdomError;
use crate::models::SearchHit;
use crate::store::{CandidateRow, ChunkStore};

/// Parameters for one similarity query. Defaults match the store
/// contract: threshold 0.7, limit 10, no guest filter.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub threshold: f64,
    pub limit: i64,
    pub guest: Option<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            limit: 10,
            guest: None,
        }
    }
}

impl SearchParams {
    pub fn new(threshold: f64, limit: i64) -> Self {
        Self {
            threshold,
            limit,
            guest: None,
        }
    }

    pub fn with_guest(mut self, guest: impl Into<String>) -> Self {
        self.guest = Some(guest.into());
        self
    }

    /// Rejected before any query touches the store.
    pub fn validate(&self) -> Result<(), WisdomError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(WisdomError::invalid(format!(
                "threshold must be in [0.0, 1.0], got {}",
                self.threshold
            )));
        }
        if self.limit < 1 {
            return Err(WisdomError::invalid(format!(
                "limit must be >= 1, got {}",
                self.limit
            )));
        }
        Ok(())
    }
}

/// Run a similarity query: validate, fetch candidates, rank.
///
/// Multi-guest episodes produce one hit per guest for the same chunk;
/// guest-less episodes produce a single hit with no guest name. Callers
/// that don't care about the fan-out de-duplicate with [`dedup_by_chunk`].
pub async fn search(
    store: &ChunkStore,
    query_vector: &[f32],
    params: &SearchParams,
) -> Result<Vec<SearchHit>, WisdomError> {
    params.validate()?;
    if query_vector.len() != EMBEDDING_DIMS {
        return Err(WisdomError::invalid(format!(
            "query vector has {} dimensions, expected {}",
            query_vector.len(),
            EMBEDDING_DIMS
        )));
    }

    let rows = store
        .candidate_rows(params.guest.as_deref())
        .await
        .map_err(|e| match e.downcast::<sqlx::Error>() {
            Ok(sql) => WisdomError::Store(sql),
            Err(other) => WisdomError::RetrievalUnavailable(other.to_string()),
        })?;

    Ok(rank(&rows, query_vector, params.threshold, params.limit))
}

/// Score and order candidate rows. Pure, so ordering and threshold
/// semantics are testable without a database.
pub fn rank(
    rows: &[CandidateRow],
    query_vector: &[f32],
    threshold: f64,
    limit: i64,
) -> Vec<SearchHit> {
    let mut hits: Vec<(f64, &CandidateRow)> = Vec::new();

    for row in rows {
        let embedding = blob_to_vec(&row.embedding);
        let similarity = cosine_similarity(&embedding, query_vector) as f64;
        if similarity > threshold {
            hits.push((similarity, row));
        }
    }

    hits.sort_by(|(sa, ra), (sb, rb)| {
        sb.total_cmp(sa)
            .then_with(|| ra.episode_id.cmp(&rb.episode_id))
            .then_with(|| ra.chunk_index.cmp(&rb.chunk_index))
            .then_with(|| ra.guest_name.cmp(&rb.guest_name))
    });
    hits.truncate(limit.max(0) as usize);

    hits.into_iter()
        .map(|(similarity, row)| SearchHit {
            chunk_id: row.chunk_id.clone(),
            episode_id: row.episode_id.clone(),
            episode_title: row.episode_title.clone(),
            guest_name: row.guest_name.clone(),
            speaker: row.speaker.clone(),
            content: row.content.clone(),
            timestamp_label: row.timestamp_label.clone(),
            similarity,
        })
        .collect()
}

/// Collapse guest fan-out: keep the first (best-ranked) hit per chunk id,
/// preserving order.
pub fn dedup_by_chunk(hits: &[SearchHit]) -> Vec<SearchHit> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.chunk_id.clone()))
        .cloned()
        .collect()
}

/// Run the `sage search` command: embed the query and print ranked hits.
pub async fn run_search(
    config: &Config,
    query: &str,
    threshold: Option<f64>,
    limit: Option<i64>,
    guest: Option<String>,
) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = ChunkStore::new(pool);

    let mut params = SearchParams::new(
        threshold.unwrap_or(config.retrieval.threshold),
        limit.unwrap_or(config.retrieval.limit),
    );
    params.guest = guest;

    let query_vector = provider.embed_query(query).await?;
    let hits = search(&store, &query_vector, &params).await?;

    if hits.is_empty() {
        println!("No results.");
        store.pool().close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let who = hit.guest_name.as_deref().unwrap_or(&hit.speaker);
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            hit.similarity,
            who,
            hit.episode_title
        );
        if let Some(ref label) = hit.timestamp_label {
            println!("    at: {}", label);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.content, 240));
        println!("    chunk: {}", hit.chunk_id);
        println!();
    }

    store.pool().close().await;
    Ok(())
}

/// Single-line excerpt, cut at a character boundary.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vec_to_blob;

    fn row(
        chunk_id: &str,
        episode_id: &str,
        chunk_index: i64,
        guest: Option<&str>,
        embedding: &[f32],
    ) -> CandidateRow {
        CandidateRow {
            chunk_id: chunk_id.to_string(),
            episode_id: episode_id.to_string(),
            chunk_index,
            episode_title: format!("Episode {episode_id}"),
            guest_name: guest.map(|g| g.to_string()),
            speaker: "Guest".to_string(),
            content: format!("content of {chunk_id}"),
            timestamp_label: None,
            embedding: vec_to_blob(embedding),
        }
    }

    // Unit vectors at a chosen cosine against the query [1, 0].
    fn vec_at(cos: f32) -> Vec<f32> {
        let sin = (1.0 - cos * cos).max(0.0).sqrt();
        vec![cos, sin]
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        let rows = vec![
            row("hi", "e1", 0, None, &vec_at(0.82)),
            row("lo", "e1", 1, None, &vec_at(0.65)),
        ];
        let query = vec![1.0, 0.0];

        let hits = rank(&rows, &query, 0.7, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "hi");
        assert!((hits[0].similarity - 0.82).abs() < 1e-5);

        // A hit exactly at the threshold is excluded.
        let hits = rank(&rows, &query, 0.82, 5);
        assert!(hits.iter().all(|h| h.similarity > 0.82));
    }

    #[test]
    fn test_descending_order_and_natural_key_ties() {
        let same = vec_at(0.9);
        let rows = vec![
            row("c3", "e2", 0, None, &same),
            row("c1", "e1", 1, None, &same),
            row("c2", "e1", 0, None, &same),
            row("top", "e9", 9, None, &vec_at(0.95)),
        ];
        let hits = rank(&rows, &[1.0, 0.0], 0.5, 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["top", "c2", "c1", "c3"]);
    }

    #[test]
    fn test_limit_truncates_after_ordering() {
        let rows: Vec<CandidateRow> = (0..6)
            .map(|i| row(&format!("c{i}"), "e1", i, None, &vec_at(0.6 + i as f32 * 0.05)))
            .collect();
        let hits = rank(&rows, &[1.0, 0.0], 0.0, 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk_id, "c5");
    }

    #[test]
    fn test_raising_threshold_never_grows_results() {
        let rows: Vec<CandidateRow> = (0..10)
            .map(|i| row(&format!("c{i}"), "e1", i, None, &vec_at(i as f32 * 0.1)))
            .collect();
        let query = vec![1.0, 0.0];

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.2, 0.5, 0.7, 0.9, 1.0] {
            let hits = rank(&rows, &query, threshold, 100);
            assert!(hits.len() <= previous, "threshold {threshold} grew results");
            for pair in hits.windows(2) {
                assert!(pair[0].similarity >= pair[1].similarity);
            }
            previous = hits.len();
        }
    }

    #[test]
    fn test_dedup_keeps_best_ranked_row_per_chunk() {
        let v = vec_at(0.9);
        let rows = vec![
            row("shared", "e1", 0, Some("Ada"), &v),
            row("shared", "e1", 0, Some("Bob"), &v),
            row("other", "e1", 1, Some("Ada"), &vec_at(0.8)),
        ];
        let hits = rank(&rows, &[1.0, 0.0], 0.5, 10);
        assert_eq!(hits.len(), 3);

        let deduped = dedup_by_chunk(&hits);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].chunk_id, "shared");
        assert_eq!(deduped[0].guest_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(SearchParams::new(1.5, 10).validate().is_err());
        assert!(SearchParams::new(-0.1, 10).validate().is_err());
        assert!(SearchParams::new(0.7, 0).validate().is_err());
        assert!(SearchParams::new(0.0, 1).validate().is_ok());
        assert!(SearchParams::new(1.0, 1).validate().is_ok());
    }
}
