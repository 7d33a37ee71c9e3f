//! Collaborator traits for the scan passes.
//!
//! The pipeline itself never talks to an OCR engine or a metadata service.
//! The scan passes in [`crate::scan`] drive two collaborators through these
//! traits and hand their results to the orchestrator:
//!
//! | Trait | Input | Output |
//! |-------|-------|--------|
//! | [`TextExtractor`] | photo URI | recognised text lines |
//! | [`LookupProvider`] | [`LookupQuery`] | candidates or a [`LookupError`] |
//!
//! Local implementations live in [`crate::providers`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use digbin_core::models::{ErrorCode, InboxItem, ProviderCandidate};

// ═══════════════════════════════════════════════════════════════════════
// Text extraction
// ═══════════════════════════════════════════════════════════════════════

/// Turns a cover photo into lines of text.
///
/// Any error counts as a failed OCR attempt; the scan pass records it as
/// `API_ERROR` and moves on.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract_text(&self, photo_uri: &str) -> Result<Vec<String>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Metadata lookup
// ═══════════════════════════════════════════════════════════════════════

/// Query fields sent to a lookup provider: the item's best-known values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LookupQuery {
    pub barcode: Option<String>,
    pub catalog_no: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl LookupQuery {
    pub fn from_item(item: &InboxItem) -> Self {
        Self {
            barcode: item.best_barcode().map(String::from),
            catalog_no: item.best_catalog_no().map(String::from),
            title: item.best_title().map(String::from),
            artist: item.best_artist().map(String::from),
        }
    }
}

/// Closed set of lookup failures. Every variant is recoverable.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup provider unreachable: {0}")]
    Offline(String),
    #[error("lookup provider rate limit hit")]
    RateLimited,
    #[error("lookup provider error: {0}")]
    Api(String),
    #[error("no match")]
    NoMatch,
}

impl LookupError {
    /// The error code recorded on the item.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Offline(_) => ErrorCode::Offline,
            Self::RateLimited => ErrorCode::RateLimit,
            Self::Api(_) => ErrorCode::ApiError,
            Self::NoMatch => ErrorCode::NoMatch,
        }
    }
}

/// A metadata source that returns match candidates for a query.
///
/// An empty `Ok` list is treated like [`LookupError::NoMatch`].
#[async_trait]
pub trait LookupProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &LookupQuery) -> Result<Vec<ProviderCandidate>, LookupError>;
}
