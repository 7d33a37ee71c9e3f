//! Inbox statistics.
//!
//! A quick summary of where items sit in the pipeline: active and deleted
//! totals, lookup status breakdown, and what is due right now. Used by
//! `dig stats` to check that scans are making progress.

use anyhow::Result;

use digbin_core::models::{LookupStatus, OcrStatus};
use digbin_core::store::InboxStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let now = chrono::Utc::now().timestamp_millis();

    let active = store.count_active().await?;
    let deleted: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM inbox_items WHERE deleted_at IS NOT NULL")
            .fetch_one(store.pool())
            .await?;
    let ocr_pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM inbox_items WHERE deleted_at IS NULL AND ocr_status IN (?, ?)",
    )
    .bind(OcrStatus::NotStarted.as_str())
    .bind(OcrStatus::InProgress.as_str())
    .fetch_one(store.pool())
    .await?;

    let by_status = store.count_by_lookup_status().await?;
    let lookup_due = store.lookup_due(now, i64::MAX).await?.len();
    let requeue_due = store.lookup_requeue_due(now, i64::MAX).await?.len();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("digbin inbox stats");
    println!("==================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Active:      {}", active);
    println!("  Deleted:     {}", deleted);
    println!("  OCR queued:  {}", ocr_pending);
    println!("  Due now:     {} lookup, {} retry", lookup_due, requeue_due);

    if !by_status.is_empty() {
        println!();
        println!("  By lookup status:");
        println!("  {:<16} {:>6}", "STATUS", "ITEMS");
        println!("  {}", "-".repeat(23));
        for (status, n) in &by_status {
            println!("  {:<16} {:>6}", status.as_str(), n);
        }
        let review = by_status
            .iter()
            .find(|(s, _)| *s == LookupStatus::NeedsReview)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        if review > 0 {
            println!();
            println!(
                "  {} item{} waiting for review (dig list --review)",
                review,
                if review == 1 { "" } else { "s" }
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
