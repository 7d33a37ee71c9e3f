//! Human decisions on inbox items.
//!
//! Every command here is a single orchestrator transition. A transition
//! that does not apply (missing item, deleted item, wrong state) is an
//! error so the CLI exits non-zero.

use anyhow::{bail, Result};

use digbin_core::models::{ExtractedFields, InboxItem};

use crate::config::Config;
use crate::sqlite_store::open_pipeline;

/// `dig confirm <id> [--candidate <snapshot>]`.
///
/// Without a candidate the current best snapshot is committed.
pub async fn run_confirm(config: &Config, id: &str, candidate: Option<&str>) -> Result<()> {
    let pipeline = open_pipeline(config, None).await?;
    let updated = match candidate {
        Some(snapshot_id) => pipeline.confirm_candidate(id, snapshot_id).await?,
        None => pipeline.mark_committed(id).await?,
    };
    report("confirm", id, updated)
}

/// `dig retry <id>`.
pub async fn run_retry(config: &Config, id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, None).await?;
    report("retry", id, pipeline.retry_lookup(id).await?)
}

/// `dig undo <id>`.
pub async fn run_undo(config: &Config, id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, None).await?;
    report("undo", id, pipeline.undo_commit(id).await?)
}

/// `dig unknown <id>`.
pub async fn run_unknown(config: &Config, id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, None).await?;
    report("unknown", id, pipeline.mark_unknown(id).await?)
}

/// `dig edit <id> [--title] [--artist] [--label] [--catalog-no]`.
pub async fn run_edit(config: &Config, id: &str, fields: ExtractedFields) -> Result<()> {
    if fields.is_empty() {
        bail!("edit needs at least one of --title, --artist, --label, --catalog-no");
    }
    let pipeline = open_pipeline(config, None).await?;
    report("edit", id, pipeline.edit_fields(id, &fields).await?)
}

/// `dig delete <id> [--purge]`.
pub async fn run_delete(config: &Config, id: &str, purge: bool) -> Result<()> {
    let pipeline = open_pipeline(config, None).await?;
    if purge {
        if !pipeline.purge(id).await? {
            bail!("no inbox item: {}", id);
        }
        println!("Purged {}", id);
        return Ok(());
    }
    report("delete", id, pipeline.soft_delete(id).await?)
}

fn report(action: &str, id: &str, updated: Option<InboxItem>) -> Result<()> {
    let Some(item) = updated else {
        bail!(
            "{} did not apply to {}: item is missing, deleted, or in the wrong state",
            action,
            id
        );
    };
    println!(
        "{} {}: lookup {}, ocr {}",
        action,
        item.id,
        item.lookup_status.as_str(),
        item.ocr_status.as_str()
    );
    if let Some(committed) = &item.committed_provider_item_id {
        println!("  committed: {}", committed);
    }
    Ok(())
}
