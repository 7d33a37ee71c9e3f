//! Local collaborator implementations.
//!
//! - [`SidecarTextExtractor`] reads pre-recognised text from a `.txt` file
//!   stored next to the photo, one line per recognised line.
//! - [`FixtureProvider`] answers lookups from a JSON catalog file.
//!
//! Both are selected by `[ocr].engine` / `[lookup].provider` in the config.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use digbin_core::models::{non_blank, ProviderCandidate};

use crate::config::{LookupConfig, OcrConfig};
use crate::traits::{LookupError, LookupProvider, LookupQuery, TextExtractor};

/// Most candidates a fixture lookup returns.
const MAX_FIXTURE_RESULTS: usize = 10;

pub fn build_extractor(config: &OcrConfig) -> Option<Arc<dyn TextExtractor>> {
    match config.engine.as_str() {
        "sidecar" => Some(Arc::new(SidecarTextExtractor)),
        _ => None,
    }
}

pub fn build_provider(config: &LookupConfig) -> Result<Option<Arc<dyn LookupProvider>>> {
    match (config.provider.as_str(), &config.fixtures_path) {
        ("fixtures", Some(path)) => Ok(Some(Arc::new(FixtureProvider::load(path)?))),
        _ => Ok(None),
    }
}

// ============ Sidecar OCR ============

/// Reads `<photo>.txt` (or the photo path with a `.txt` extension).
pub struct SidecarTextExtractor;

impl SidecarTextExtractor {
    fn sidecar_paths(photo_uri: &str) -> Vec<PathBuf> {
        let photo = PathBuf::from(photo_uri.strip_prefix("file://").unwrap_or(photo_uri));
        let mut appended = photo.clone().into_os_string();
        appended.push(".txt");
        vec![PathBuf::from(appended), photo.with_extension("txt")]
    }
}

#[async_trait]
impl TextExtractor for SidecarTextExtractor {
    fn name(&self) -> &str {
        "sidecar"
    }

    async fn extract_text(&self, photo_uri: &str) -> Result<Vec<String>> {
        for path in Self::sidecar_paths(photo_uri) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text.lines().map(String::from).collect()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()))
                }
            }
        }
        anyhow::bail!("no text sidecar for {}", photo_uri)
    }
}

// ============ Fixture lookup ============

#[derive(Debug, Deserialize)]
struct FixtureRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    label: Option<String>,
    catalog_no: Option<String>,
    format_summary: Option<String>,
    thumb_url: Option<String>,
    barcode: Option<String>,
    /// Simulated failure when this record matches: `offline`,
    /// `rate_limited`, or `api`.
    error: Option<String>,
}

/// Lookup provider over a JSON array of catalog records.
///
/// A record matches on equal barcode, equal catalog number
/// (case-insensitive), or a title containing the query title.
pub struct FixtureProvider {
    records: Vec<(FixtureRecord, String)>,
}

impl FixtureProvider {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lookup fixtures: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse lookup fixtures: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let records = values
            .into_iter()
            .map(|v| {
                let raw = v.to_string();
                serde_json::from_value::<FixtureRecord>(v).map(|r| (r, raw))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    fn matches(record: &FixtureRecord, query: &LookupQuery) -> bool {
        if let Some(barcode) = non_blank(query.barcode.as_deref()) {
            if record.barcode.as_deref().map(str::trim) == Some(barcode) {
                return true;
            }
        }
        if let Some(catno) = non_blank(query.catalog_no.as_deref()) {
            let hit = record
                .catalog_no
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(catno));
            if hit {
                return true;
            }
        }
        match non_blank(query.title.as_deref()) {
            Some(title) => record.title.to_lowercase().contains(&title.to_lowercase()),
            None => false,
        }
    }
}

#[async_trait]
impl LookupProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixtures"
    }

    async fn search(&self, query: &LookupQuery) -> Result<Vec<ProviderCandidate>, LookupError> {
        let mut out = Vec::new();
        for (record, raw) in &self.records {
            if !Self::matches(record, query) {
                continue;
            }
            match record.error.as_deref() {
                Some("offline") => return Err(LookupError::Offline(record.id.clone())),
                Some("rate_limited") => return Err(LookupError::RateLimited),
                Some(other) => return Err(LookupError::Api(other.to_string())),
                None => {}
            }
            out.push(ProviderCandidate {
                provider: self.name().to_string(),
                provider_item_id: record.id.clone(),
                title: record.title.clone(),
                artist: record.artist.clone(),
                label: record.label.clone(),
                catalog_no: record.catalog_no.clone(),
                format_summary: record.format_summary.clone(),
                thumb_url: record.thumb_url.clone(),
                barcode: record.barcode.clone(),
                raw_json: raw.clone(),
            });
            if out.len() >= MAX_FIXTURE_RESULTS {
                break;
            }
        }
        Ok(out)
    }
}
