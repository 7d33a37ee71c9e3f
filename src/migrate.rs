use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create inbox items table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inbox_items (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_tried_at INTEGER,
            barcode TEXT,
            raw_title TEXT,
            raw_artist TEXT,
            raw_row_json TEXT,
            photo_uris_json TEXT NOT NULL DEFAULT '[]',
            ocr_status TEXT NOT NULL DEFAULT 'NOT_STARTED',
            next_ocr_at INTEGER,
            lookup_status TEXT NOT NULL DEFAULT 'NOT_ELIGIBLE',
            next_lookup_at INTEGER,
            retry_count INTEGER NOT NULL DEFAULT 0,
            error_code TEXT NOT NULL DEFAULT 'NONE',
            extracted_title TEXT,
            extracted_artist TEXT,
            extracted_label TEXT,
            extracted_catalog_no TEXT,
            confidence_score INTEGER,
            confidence_reasons_json TEXT NOT NULL DEFAULT '[]',
            committed_provider_item_id TEXT,
            is_unknown INTEGER NOT NULL DEFAULT 0,
            was_undone INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            reference_photo_uri TEXT,
            revision INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create provider snapshots table; position keeps provider order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_snapshots (
            id TEXT PRIMARY KEY,
            inbox_item_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            provider TEXT NOT NULL,
            provider_item_id TEXT NOT NULL,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            label TEXT,
            catalog_no TEXT,
            barcode TEXT,
            format_summary TEXT,
            thumb_url TEXT,
            raw_json TEXT NOT NULL DEFAULT '{}',
            confidence INTEGER NOT NULL,
            reasons_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (inbox_item_id) REFERENCES inbox_items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_inbox_lookup_due ON inbox_items(lookup_status, next_lookup_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_inbox_ocr_due ON inbox_items(ocr_status, next_ocr_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_inbox_created_at ON inbox_items(created_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_item ON provider_snapshots(inbox_item_id, confidence DESC, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
