use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema creation. Safe to run against an existing database.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guests (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS episodes (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            source_url TEXT,
            external_video_id TEXT UNIQUE,
            description TEXT,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            duration_display TEXT,
            view_count INTEGER NOT NULL DEFAULT 0,
            raw_transcript_text TEXT NOT NULL,
            word_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS episode_guests (
            episode_id TEXT NOT NULL,
            guest_id TEXT NOT NULL,
            PRIMARY KEY (episode_id, guest_id),
            FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE,
            FOREIGN KEY (guest_id) REFERENCES guests(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The UNIQUE(episode_id, chunk_index) natural key is what makes
    // re-ingestion an upsert instead of a duplicate insert.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transcript_chunks (
            id TEXT PRIMARY KEY,
            episode_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            speaker TEXT NOT NULL,
            timestamp_label TEXT,
            timestamp_seconds INTEGER,
            content TEXT NOT NULL,
            word_count INTEGER NOT NULL DEFAULT 0,
            embedding BLOB,
            UNIQUE(episode_id, chunk_index),
            FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transcript_chunks_episode_id \
         ON transcript_chunks(episode_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_episode_guests_guest_id \
         ON episode_guests(guest_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_episodes_view_count ON episodes(view_count DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
