//! Inbox listing and item detail.
//!
//! Used by `dig list` and `dig show`.

use anyhow::{bail, Result};

use digbin_core::eligibility::{awaits_decision, is_needs_review};
use digbin_core::models::{InboxItem, LookupStatus};
use digbin_core::store::InboxStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

const SHOW_CANDIDATES: i64 = 5;

/// `dig list [--limit N] [--review]`.
pub async fn run_list(config: &Config, limit: i64, review_only: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let items: Vec<InboxItem> = store
        .list_active(limit)
        .await?
        .into_iter()
        .filter(|i| !review_only || awaits_decision(i))
        .collect();

    if items.is_empty() {
        println!("Inbox is empty.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<12} {:<11} {:<13} {:>4}  {}",
        "ID", "SOURCE", "OCR", "LOOKUP", "CONF", "ITEM"
    );
    println!("{}", "-".repeat(100));
    for item in &items {
        let confidence = item
            .confidence_score
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<12} {:<11} {:<13} {:>4}  {}",
            item.id,
            item.source_type.as_str(),
            item.ocr_status.as_str(),
            item.lookup_status.as_str(),
            confidence,
            describe(item)
        );
    }

    store.pool().close().await;
    Ok(())
}

/// `dig show <id>`.
pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let item = match store.get_item(id).await? {
        Some(item) => item,
        None => bail!("inbox item not found: {}", id),
    };

    println!("--- Item ---");
    println!("id:           {}", item.id);
    println!("source:       {}", item.source_type.as_str());
    println!("created:      {}", format_ts_relative(item.created_at));
    println!("updated:      {}", format_ts_relative(item.updated_at));
    if let Some(deleted) = item.deleted_at {
        println!("deleted:      {}", format_ts_relative(deleted));
    }
    if let Some(barcode) = &item.barcode {
        println!("barcode:      {}", barcode);
    }
    println!("title:        {}", item.best_title().unwrap_or("-"));
    println!("artist:       {}", item.best_artist().unwrap_or("-"));
    println!("label:        {}", item.best_label().unwrap_or("-"));
    println!("catalog_no:   {}", item.best_catalog_no().unwrap_or("-"));
    for uri in &item.photo_uris {
        println!("photo:        {}", uri);
    }
    println!();

    println!("--- Pipeline ---");
    println!("ocr:          {}", item.ocr_status.as_str());
    if let Some(at) = item.next_ocr_at {
        println!("next_ocr:     {}", format_ts_relative(at));
    }
    println!("lookup:       {}", item.lookup_status.as_str());
    if let Some(at) = item.next_lookup_at {
        println!("next_lookup:  {}", format_ts_relative(at));
    }
    println!("retries:      {}", item.retry_count);
    println!("error:        {}", item.error_code.as_str());
    if let Some(score) = item.confidence_score {
        println!("confidence:   {}", score);
        println!("reasons:      {}", reason_list(&item));
    }
    if let Some(committed) = &item.committed_provider_item_id {
        println!("committed:    {}", committed);
    }
    if item.is_unknown {
        println!("marked:       unknown");
    }
    if is_needs_review(&item) {
        println!("review:       needed");
    }
    println!();

    let candidates = store.top_snapshots(id, SHOW_CANDIDATES).await?;
    println!("--- Candidates ({}) ---", candidates.len());
    for snap in &candidates {
        let reasons: Vec<&str> = snap.score.reasons.iter().map(|r| r.as_str()).collect();
        println!(
            "[{:>3}] {} / {}  ({} {})",
            snap.confidence(),
            snap.title,
            snap.artist,
            snap.provider,
            snap.provider_item_id
        );
        println!("      snapshot: {}", snap.id);
        if let Some(catno) = &snap.catalog_no {
            println!(
                "      {} {}",
                snap.label.as_deref().unwrap_or("-"),
                catno
            );
        }
        println!("      {}", reasons.join(", "));
    }

    store.pool().close().await;
    Ok(())
}

fn describe(item: &InboxItem) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(item.best_title());
    parts.extend(item.best_artist());
    if parts.is_empty() {
        parts.extend(item.best_barcode());
    }
    let mut text = parts.join(" / ");
    if item.lookup_status == LookupStatus::Committed {
        text.push_str(" [committed]");
    }
    text
}

fn reason_list(item: &InboxItem) -> String {
    let names: Vec<&str> = item.confidence_reasons.iter().map(|r| r.as_str()).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

/// Format an epoch-millisecond timestamp relative to now (e.g. "3 hours ago",
/// "in 10 mins").
pub(crate) fn format_ts_relative(ts_ms: i64) -> String {
    let delta = (chrono::Utc::now().timestamp_millis() - ts_ms) / 1000;

    if delta.abs() < 60 {
        return "just now".to_string();
    }
    let (amount, unit) = if delta.abs() < 3600 {
        (delta.abs() / 60, "min")
    } else if delta.abs() < 86400 {
        (delta.abs() / 3600, "hour")
    } else if delta.abs() < 86400 * 30 {
        (delta.abs() / 86400, "day")
    } else {
        return format_ts_iso(ts_ms);
    };
    let plural = if amount == 1 { "" } else { "s" };
    if delta > 0 {
        format!("{} {}{} ago", amount, unit, plural)
    } else {
        format!("in {} {}{}", amount, unit, plural)
    }
}

fn format_ts_iso(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}
