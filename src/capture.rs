//! Capture commands: put new items into the inbox.
//!
//! Each `dig add` variant maps onto one pipeline create operation. Imports
//! read a JSON Lines file, one object per row, and keep going past bad rows.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use digbin_core::models::InboxItem;

use crate::config::Config;
use crate::sqlite_store::open_pipeline;

/// How a new item enters the inbox.
#[derive(Debug, Clone)]
pub enum Capture {
    Quick { title: String, artist: String },
    Barcode(String),
    Cover(String),
}

/// `dig add quick|barcode|cover`.
pub async fn run_add(config: &Config, capture: Capture) -> Result<()> {
    let pipeline = open_pipeline(config, None).await?;
    let item = match capture {
        Capture::Quick { title, artist } => pipeline.create_quick_add(&title, &artist).await?,
        Capture::Barcode(barcode) => pipeline.create_barcode(&barcode).await?,
        Capture::Cover(uri) => pipeline.create_cover_capture(&uri).await?,
    };
    print_created(&item);
    Ok(())
}

/// `dig add import <file>`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let pipeline = open_pipeline(config, None).await?;

    let mut imported = 0;
    let mut skipped = 0;
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match pipeline.create_import_row(line).await {
            Ok(_) => imported += 1,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping import row");
                skipped += 1;
            }
        }
    }

    println!(
        "Imported {} row{} from {} ({} skipped)",
        imported,
        if imported == 1 { "" } else { "s" },
        path.display(),
        skipped
    );
    Ok(())
}

fn print_created(item: &InboxItem) {
    println!("Created {}", item.id);
    println!("  source:  {}", item.source_type.as_str());
    println!("  ocr:     {}", item.ocr_status.as_str());
    println!("  lookup:  {}", item.lookup_status.as_str());
}
