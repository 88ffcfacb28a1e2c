//! Durable, idempotent persistence for episodes, guests, and chunks.
//!
//! Every write is an upsert keyed by domain identity: episodes by slug,
//! guests by slug, chunks by `(episode_id, chunk_index)`. Replaying
//! ingestion over the same transcript converges to the same rows with the
//! same ids; a transcript that shrank converges by deleting the indices
//! past the new count. Duplicate-key inserts cannot happen by
//! construction, so any constraint violation surfacing from here is a
//! defect.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::embedding::vec_to_blob;
use crate::models::{ChunkDraft, Episode, EpisodeListing, StoredChunk};

pub struct ChunkStore {
    pool: SqlitePool,
}

/// One chunk write in an [`ChunkStore::apply_chunks`] batch. `embedding`
/// replaces the stored value either way; `None` clears it to null (the
/// content changed but no provider was available).
pub struct ChunkWrite<'a> {
    pub draft: &'a ChunkDraft,
    pub embedding: Option<Vec<f32>>,
}

/// Snapshot of a stored chunk used to decide whether a draft changed.
#[derive(Debug, Clone)]
pub struct ChunkState {
    pub speaker: String,
    pub timestamp_label: Option<String>,
    pub timestamp_seconds: Option<i64>,
    pub content: String,
    pub word_count: i64,
    pub embedded: bool,
}

impl ChunkState {
    /// True when the stored row already matches the draft field for field.
    pub fn matches(&self, draft: &ChunkDraft) -> bool {
        self.speaker == draft.speaker
            && self.timestamp_label == draft.timestamp_label
            && self.timestamp_seconds == draft.timestamp_seconds
            && self.content == draft.content
            && self.word_count == draft.word_count
    }
}

/// Filters and ordering for episode listings.
#[derive(Debug, Clone)]
pub struct EpisodeFilter {
    pub guest: Option<String>,
    pub search: Option<String>,
    pub sort: EpisodeSort,
    pub limit: i64,
}

impl Default for EpisodeFilter {
    fn default() -> Self {
        Self {
            guest: None,
            search: None,
            sort: EpisodeSort::Views,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpisodeSort {
    #[default]
    Views,
    Duration,
    Recent,
}

impl std::str::FromStr for EpisodeSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "views" => Ok(EpisodeSort::Views),
            "duration" => Ok(EpisodeSort::Duration),
            "recent" => Ok(EpisodeSort::Recent),
            other => anyhow::bail!("Unknown sort: '{}'. Must be views, duration, or recent.", other),
        }
    }
}

/// Candidate row handed to the similarity ranking: one per (embedded
/// chunk, guest), guest-less episodes contributing a single row with no
/// guest name.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub chunk_id: String,
    pub episode_id: String,
    pub chunk_index: i64,
    pub episode_title: String,
    pub guest_name: Option<String>,
    pub speaker: String,
    pub content: String,
    pub timestamp_label: Option<String>,
    pub embedding: Vec<u8>,
}

/// Corpus totals for `sage stats`.
#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub guests: i64,
    pub episodes: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
    pub transcript_words: i64,
}

impl ChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert-or-update an episode by slug. The returned id is stable: a
    /// re-ingested episode keeps the id it was first created with.
    pub async fn upsert_episode(&self, episode: &Episode) -> Result<String> {
        let existing_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM episodes WHERE slug = ?")
                .bind(&episode.slug)
                .fetch_optional(&self.pool)
                .await?;

        let episode_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO episodes (id, title, slug, source_url, external_video_id, description,
                                  duration_seconds, duration_display, view_count,
                                  raw_transcript_text, word_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                title = excluded.title,
                source_url = excluded.source_url,
                external_video_id = excluded.external_video_id,
                description = excluded.description,
                duration_seconds = excluded.duration_seconds,
                duration_display = excluded.duration_display,
                view_count = excluded.view_count,
                raw_transcript_text = excluded.raw_transcript_text,
                word_count = excluded.word_count
            "#,
        )
        .bind(&episode_id)
        .bind(&episode.title)
        .bind(&episode.slug)
        .bind(&episode.source_url)
        .bind(&episode.external_video_id)
        .bind(&episode.description)
        .bind(episode.duration_seconds)
        .bind(&episode.duration_display)
        .bind(episode.view_count)
        .bind(&episode.raw_transcript_text)
        .bind(episode.word_count)
        .execute(&self.pool)
        .await?;

        Ok(episode_id)
    }

    /// Upsert guests by slug and reconcile this episode's join rows to
    /// exactly the given set: stale links are removed, missing ones added.
    /// Guests themselves are never deleted. Returns (added, removed).
    pub async fn upsert_guests_and_links(
        &self,
        episode_id: &str,
        guests: &[(String, String)],
    ) -> Result<(usize, usize)> {
        let mut desired: HashSet<String> = HashSet::new();
        for (name, slug) in guests {
            let existing_id: Option<String> =
                sqlx::query_scalar("SELECT id FROM guests WHERE slug = ?")
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await?;
            let guest_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

            sqlx::query(
                r#"
                INSERT INTO guests (id, name, slug) VALUES (?, ?, ?)
                ON CONFLICT(slug) DO UPDATE SET name = excluded.name
                "#,
            )
            .bind(&guest_id)
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .await?;

            desired.insert(guest_id);
        }

        let current: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT guest_id FROM episode_guests WHERE episode_id = ?",
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let to_add: Vec<&String> = desired.difference(&current).collect();
        let to_remove: Vec<&String> = current.difference(&desired).collect();

        for guest_id in &to_add {
            sqlx::query("INSERT INTO episode_guests (episode_id, guest_id) VALUES (?, ?)")
                .bind(episode_id)
                .bind(guest_id)
                .execute(&self.pool)
                .await?;
        }
        for guest_id in &to_remove {
            sqlx::query("DELETE FROM episode_guests WHERE episode_id = ? AND guest_id = ?")
                .bind(episode_id)
                .bind(guest_id)
                .execute(&self.pool)
                .await?;
        }

        Ok((to_add.len(), to_remove.len()))
    }

    /// Current chunk rows for an episode, keyed by index. Ingestion uses
    /// this to skip re-embedding chunks whose content did not change.
    pub async fn chunk_states(&self, episode_id: &str) -> Result<HashMap<i64, ChunkState>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_index, speaker, timestamp_label, timestamp_seconds,
                   content, word_count, embedding IS NOT NULL AS embedded
            FROM transcript_chunks WHERE episode_id = ?
            "#,
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await?;

        let mut states = HashMap::with_capacity(rows.len());
        for row in rows {
            states.insert(
                row.get::<i64, _>("chunk_index"),
                ChunkState {
                    speaker: row.get("speaker"),
                    timestamp_label: row.get("timestamp_label"),
                    timestamp_seconds: row.get("timestamp_seconds"),
                    content: row.get("content"),
                    word_count: row.get("word_count"),
                    embedded: row.get::<bool, _>("embedded"),
                },
            );
        }
        Ok(states)
    }

    /// Write a batch of chunks for one episode and trim any indices at or
    /// past `total_count`, all in one transaction. Upserts go through the
    /// `(episode_id, chunk_index)` natural key, so existing chunk ids
    /// survive and every mutable field, the embedding included, takes the
    /// new value.
    pub async fn apply_chunks(
        &self,
        episode_id: &str,
        writes: &[ChunkWrite<'_>],
        total_count: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for write in writes {
            let draft = write.draft;
            let blob = write.embedding.as_ref().map(|v| vec_to_blob(v));
            sqlx::query(
                r#"
                INSERT INTO transcript_chunks
                    (id, episode_id, chunk_index, speaker, timestamp_label,
                     timestamp_seconds, content, word_count, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(episode_id, chunk_index) DO UPDATE SET
                    speaker = excluded.speaker,
                    timestamp_label = excluded.timestamp_label,
                    timestamp_seconds = excluded.timestamp_seconds,
                    content = excluded.content,
                    word_count = excluded.word_count,
                    embedding = excluded.embedding
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(episode_id)
            .bind(draft.chunk_index)
            .bind(&draft.speaker)
            .bind(&draft.timestamp_label)
            .bind(draft.timestamp_seconds)
            .bind(&draft.content)
            .bind(draft.word_count)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        }

        // Shrink convergence: a transcript that now yields fewer chunks
        // leaves no orphans past the new count.
        sqlx::query("DELETE FROM transcript_chunks WHERE episode_id = ? AND chunk_index >= ?")
            .bind(episode_id)
            .bind(total_count)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Backfill one chunk's embedding (used by `sage embed`).
    pub async fn set_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        sqlx::query("UPDATE transcript_chunks SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(embedding))
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Null out every stored embedding. `sage embed rebuild` runs this
    /// before re-embedding so a mid-run failure leaves chunks pending
    /// rather than carrying vectors from the old model.
    pub async fn clear_embeddings(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE transcript_chunks SET embedding = NULL WHERE embedding IS NOT NULL")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Chunks with no embedding yet, in natural-key order.
    pub async fn pending_chunks(&self, limit: Option<i64>) -> Result<Vec<StoredChunk>> {
        self.chunk_batch("WHERE embedding IS NULL", limit).await
    }

    /// Every chunk, for re-embedding after a model change.
    pub async fn all_chunks(&self, limit: Option<i64>) -> Result<Vec<StoredChunk>> {
        self.chunk_batch("", limit).await
    }

    async fn chunk_batch(&self, filter: &str, limit: Option<i64>) -> Result<Vec<StoredChunk>> {
        let sql = format!(
            "SELECT id, episode_id, chunk_index, content FROM transcript_chunks {} \
             ORDER BY episode_id, chunk_index LIMIT ?",
            filter
        );
        let rows = sqlx::query(&sql)
            .bind(limit.unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredChunk {
                id: row.get("id"),
                episode_id: row.get("episode_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
            })
            .collect())
    }

    /// Embedded chunk rows joined with episode title and left-joined onto
    /// guests, ready for similarity ranking. `guest_filter` keeps only
    /// rows whose guest name contains the filter, case-insensitively.
    pub async fn candidate_rows(&self, guest_filter: Option<&str>) -> Result<Vec<CandidateRow>> {
        let base = r#"
            SELECT c.id AS chunk_id, c.episode_id, c.chunk_index, e.title AS episode_title,
                   g.name AS guest_name, c.speaker, c.content, c.timestamp_label, c.embedding
            FROM transcript_chunks c
            JOIN episodes e ON e.id = c.episode_id
            LEFT JOIN episode_guests eg ON eg.episode_id = c.episode_id
            LEFT JOIN guests g ON g.id = eg.guest_id
            WHERE c.embedding IS NOT NULL
        "#;

        let rows = match guest_filter {
            Some(name) => {
                let sql = format!(
                    "{} AND g.name IS NOT NULL AND instr(lower(g.name), lower(?)) > 0 \
                     ORDER BY c.episode_id, c.chunk_index",
                    base
                );
                sqlx::query(&sql).bind(name).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("{} ORDER BY c.episode_id, c.chunk_index", base);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| CandidateRow {
                chunk_id: row.get("chunk_id"),
                episode_id: row.get("episode_id"),
                chunk_index: row.get("chunk_index"),
                episode_title: row.get("episode_title"),
                guest_name: row.get("guest_name"),
                speaker: row.get("speaker"),
                content: row.get("content"),
                timestamp_label: row.get("timestamp_label"),
                embedding: row.get("embedding"),
            })
            .collect())
    }

    /// Metadata-only episode listing with optional guest and text filters.
    pub async fn list_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<EpisodeListing>> {
        let order = match filter.sort {
            EpisodeSort::Views => "e.view_count DESC, e.slug",
            EpisodeSort::Duration => "e.duration_seconds DESC, e.slug",
            EpisodeSort::Recent => "e.rowid DESC",
        };

        let mut clauses = Vec::new();
        if filter.guest.is_some() {
            clauses.push(
                "EXISTS (SELECT 1 FROM episode_guests eg JOIN guests g ON g.id = eg.guest_id \
                 WHERE eg.episode_id = e.id AND instr(lower(g.name), lower(?)) > 0)",
            );
        }
        if filter.search.is_some() {
            clauses.push(
                "(instr(lower(e.title), lower(?)) > 0 \
                 OR instr(lower(IFNULL(e.description, '')), lower(?)) > 0)",
            );
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT e.id, e.title, e.slug, e.source_url, e.description,
                   e.duration_display, e.view_count,
                   (SELECT COUNT(*) FROM transcript_chunks c WHERE c.episode_id = e.id)
                       AS chunk_count
            FROM episodes e
            {}
            ORDER BY {}
            LIMIT ?
            "#,
            where_sql, order
        );

        let mut query = sqlx::query(&sql);
        if let Some(guest) = &filter.guest {
            query = query.bind(guest);
        }
        if let Some(search) = &filter.search {
            query = query.bind(search).bind(search);
        }
        let rows = query.bind(filter.limit).fetch_all(&self.pool).await?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            let episode_id: String = row.get("id");
            let guests = self.guests_for_episode(&episode_id).await?;
            listings.push(EpisodeListing {
                title: row.get("title"),
                slug: row.get("slug"),
                guests,
                source_url: row.get("source_url"),
                description: row.get("description"),
                duration_display: row.get("duration_display"),
                view_count: row.get("view_count"),
                chunk_count: row.get("chunk_count"),
            });
        }
        Ok(listings)
    }

    pub async fn guests_for_episode(&self, episode_id: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT g.name FROM episode_guests eg JOIN guests g ON g.id = eg.guest_id \
             WHERE eg.episode_id = ? ORDER BY g.name",
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Remove an episode by slug; chunks and guest links cascade. Guests
    /// stay. Returns false when the slug was unknown.
    pub async fn delete_episode(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM episodes WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn chunk_count(&self, episode_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM transcript_chunks WHERE episode_id = ?")
            .bind(episode_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn counts(&self) -> Result<StoreCounts> {
        let guests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guests")
            .fetch_one(&self.pool)
            .await?;
        let episodes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM episodes")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transcript_chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded_chunks: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transcript_chunks WHERE embedding IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let transcript_words: i64 =
            sqlx::query_scalar("SELECT IFNULL(SUM(word_count), 0) FROM episodes")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreCounts {
            guests,
            episodes,
            chunks,
            embedded_chunks,
            transcript_words,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr as _;

    async fn test_store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .unwrap()
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        (dir, ChunkStore::new(pool))
    }

    fn episode(slug: &str) -> Episode {
        Episode {
            id: String::new(),
            title: format!("Episode {slug}"),
            slug: slug.to_string(),
            source_url: None,
            external_video_id: None,
            description: Some("A test episode".to_string()),
            duration_seconds: 3600,
            duration_display: Some("1:00:00".to_string()),
            view_count: 100,
            raw_transcript_text: "raw text".to_string(),
            word_count: 2,
        }
    }

    fn draft(index: i64, content: &str) -> ChunkDraft {
        ChunkDraft {
            chunk_index: index,
            speaker: "Guest".to_string(),
            timestamp_label: Some("00:00:10".to_string()),
            timestamp_seconds: Some(10),
            content: content.to_string(),
            word_count: content.split_whitespace().count() as i64,
        }
    }

    async fn chunk_ids(store: &ChunkStore, episode_id: &str) -> Vec<(i64, String)> {
        let rows = sqlx::query(
            "SELECT chunk_index, id FROM transcript_chunks WHERE episode_id = ? ORDER BY chunk_index",
        )
        .bind(episode_id)
        .fetch_all(store.pool())
        .await
        .unwrap();
        rows.into_iter()
            .map(|r| (r.get::<i64, _>("chunk_index"), r.get::<String, _>("id")))
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_episode_is_idempotent() {
        let (_dir, store) = test_store().await;
        let first = store.upsert_episode(&episode("pricing")).await.unwrap();
        let second = store.upsert_episode(&episode("pricing")).await.unwrap();
        assert_eq!(first, second);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM episodes")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_upsert_episode_updates_fields() {
        let (_dir, store) = test_store().await;
        let id = store.upsert_episode(&episode("growth")).await.unwrap();

        let mut updated = episode("growth");
        updated.view_count = 999;
        updated.title = "Episode growth, remastered".to_string();
        let id2 = store.upsert_episode(&updated).await.unwrap();
        assert_eq!(id, id2);

        let (title, views): (String, i64) =
            sqlx::query_as("SELECT title, view_count FROM episodes WHERE id = ?")
                .bind(&id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(title, "Episode growth, remastered");
        assert_eq!(views, 999);
    }

    #[tokio::test]
    async fn test_chunk_upsert_preserves_ids() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("retention")).await.unwrap();

        let drafts: Vec<ChunkDraft> = (0..3).map(|i| draft(i, &format!("chunk {i}"))).collect();
        let writes: Vec<ChunkWrite> = drafts
            .iter()
            .map(|d| ChunkWrite {
                draft: d,
                embedding: Some(vec![0.5; crate::config::EMBEDDING_DIMS]),
            })
            .collect();

        store.apply_chunks(&ep, &writes, 3).await.unwrap();
        let before = chunk_ids(&store, &ep).await;

        store.apply_chunks(&ep, &writes, 3).await.unwrap();
        let after = chunk_ids(&store, &ep).await;

        assert_eq!(before, after);
        assert_eq!(after.len(), 3);
    }

    #[tokio::test]
    async fn test_shrink_removes_orphan_indices() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("shrink")).await.unwrap();

        let five: Vec<ChunkDraft> = (0..5).map(|i| draft(i, &format!("chunk {i}"))).collect();
        let writes: Vec<ChunkWrite> = five
            .iter()
            .map(|d| ChunkWrite { draft: d, embedding: None })
            .collect();
        store.apply_chunks(&ep, &writes, 5).await.unwrap();
        assert_eq!(store.chunk_count(&ep).await.unwrap(), 5);

        let three: Vec<ChunkDraft> = (0..3).map(|i| draft(i, &format!("chunk {i}"))).collect();
        let writes: Vec<ChunkWrite> = three
            .iter()
            .map(|d| ChunkWrite { draft: d, embedding: None })
            .collect();
        store.apply_chunks(&ep, &writes, 3).await.unwrap();

        let ids = chunk_ids(&store, &ep).await;
        assert_eq!(ids.len(), 3);
        assert_eq!(ids.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_guest_links_reconcile_to_new_set() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("panel")).await.unwrap();

        let (added, removed) = store
            .upsert_guests_and_links(
                &ep,
                &[
                    ("Jane Doe".to_string(), "jane-doe".to_string()),
                    ("John Roe".to_string(), "john-roe".to_string()),
                ],
            )
            .await
            .unwrap();
        assert_eq!((added, removed), (2, 0));

        // Corrected guest list: John out, Ada in.
        let (added, removed) = store
            .upsert_guests_and_links(
                &ep,
                &[
                    ("Jane Doe".to_string(), "jane-doe".to_string()),
                    ("Ada Example".to_string(), "ada-example".to_string()),
                ],
            )
            .await
            .unwrap();
        assert_eq!((added, removed), (1, 1));

        let names = store.guests_for_episode(&ep).await.unwrap();
        assert_eq!(names, vec!["Ada Example", "Jane Doe"]);

        // Unlinked guests stay in the guests table.
        let guest_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guests")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(guest_count, 3);
    }

    #[tokio::test]
    async fn test_delete_episode_cascades() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("gone")).await.unwrap();
        store
            .upsert_guests_and_links(&ep, &[("Jane Doe".to_string(), "jane-doe".to_string())])
            .await
            .unwrap();
        let drafts: Vec<ChunkDraft> = (0..2).map(|i| draft(i, "text here")).collect();
        let writes: Vec<ChunkWrite> = drafts
            .iter()
            .map(|d| ChunkWrite { draft: d, embedding: None })
            .collect();
        store.apply_chunks(&ep, &writes, 2).await.unwrap();

        assert!(store.delete_episode("gone").await.unwrap());
        assert!(!store.delete_episode("gone").await.unwrap());

        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transcript_chunks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM episode_guests")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let guests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guests")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!((chunks, links, guests), (0, 0, 1));
    }

    #[tokio::test]
    async fn test_pending_chunks_and_backfill() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("backfill")).await.unwrap();
        let drafts: Vec<ChunkDraft> = (0..2).map(|i| draft(i, &format!("pending {i}"))).collect();
        let writes: Vec<ChunkWrite> = drafts
            .iter()
            .map(|d| ChunkWrite { draft: d, embedding: None })
            .collect();
        store.apply_chunks(&ep, &writes, 2).await.unwrap();

        let pending = store.pending_chunks(None).await.unwrap();
        assert_eq!(pending.len(), 2);

        store
            .set_chunk_embedding(&pending[0].id, &vec![0.25; crate::config::EMBEDDING_DIMS])
            .await
            .unwrap();
        let pending = store.pending_chunks(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_candidate_rows_fan_out_and_filter() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("duo")).await.unwrap();
        store
            .upsert_guests_and_links(
                &ep,
                &[
                    ("Jane Doe".to_string(), "jane-doe".to_string()),
                    ("John Roe".to_string(), "john-roe".to_string()),
                ],
            )
            .await
            .unwrap();
        let d = draft(0, "embedded chunk");
        let writes = vec![ChunkWrite {
            draft: &d,
            embedding: Some(vec![0.1; crate::config::EMBEDDING_DIMS]),
        }];
        store.apply_chunks(&ep, &writes, 1).await.unwrap();

        // Two guests, one embedded chunk: two fan-out rows.
        let rows = store.candidate_rows(None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].chunk_id, rows[1].chunk_id);

        let filtered = store.candidate_rows(Some("jane")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].guest_name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_unembedded_chunks_not_candidates() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("null-emb")).await.unwrap();
        let d = draft(0, "no vector yet");
        store
            .apply_chunks(&ep, &[ChunkWrite { draft: &d, embedding: None }], 1)
            .await
            .unwrap();

        assert!(store.candidate_rows(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_episodes_filters_and_sorts() {
        let (_dir, store) = test_store().await;

        let mut a = episode("alpha");
        a.view_count = 10;
        let mut b = episode("beta");
        b.view_count = 500;
        b.description = Some("All about retention".to_string());
        let ep_a = store.upsert_episode(&a).await.unwrap();
        let _ep_b = store.upsert_episode(&b).await.unwrap();
        store
            .upsert_guests_and_links(&ep_a, &[("Jane Doe".to_string(), "jane-doe".to_string())])
            .await
            .unwrap();

        let by_views = store
            .list_episodes(&EpisodeFilter {
                sort: EpisodeSort::Views,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_views[0].slug, "beta");

        let by_guest = store
            .list_episodes(&EpisodeFilter {
                guest: Some("jane".to_string()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_guest.len(), 1);
        assert_eq!(by_guest[0].slug, "alpha");
        assert_eq!(by_guest[0].guests, vec!["Jane Doe"]);

        let by_search = store
            .list_episodes(&EpisodeFilter {
                search: Some("retention".to_string()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_search.len(), 1);
        assert_eq!(by_search[0].slug, "beta");
    }

    #[tokio::test]
    async fn test_counts() {
        let (_dir, store) = test_store().await;
        let ep = store.upsert_episode(&episode("counted")).await.unwrap();
        let d0 = draft(0, "first");
        let d1 = draft(1, "second");
        store
            .apply_chunks(
                &ep,
                &[
                    ChunkWrite {
                        draft: &d0,
                        embedding: Some(vec![0.1; crate::config::EMBEDDING_DIMS]),
                    },
                    ChunkWrite { draft: &d1, embedding: None },
                ],
                2,
            )
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.episodes, 1);
        assert_eq!(counts.chunks, 2);
        assert_eq!(counts.embedded_chunks, 1);
        assert_eq!(counts.transcript_words, 2);
    }
}
