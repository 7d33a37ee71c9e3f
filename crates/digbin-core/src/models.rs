//! Core data models for the inbox ingestion pipeline.
//!
//! Value objects ([`OcrStatus`], [`LookupStatus`], [`ErrorCode`],
//! [`SourceType`], [`ReasonCode`], [`CandidateScore`], [`ProviderCandidate`],
//! [`ExtractedFields`]) and the two entities ([`InboxItem`],
//! [`ProviderSnapshot`]).
//!
//! # Persistence encoding
//!
//! Status-like enums persist as their `SCREAMING_SNAKE_CASE` names via
//! `as_str()` and are read back with `decode()`. Decoding never fails; an
//! unrecognised value falls back to the variant that parks the item safely:
//!
//! | Enum | Fallback |
//! |------|----------|
//! | [`OcrStatus`] | `NOT_STARTED` |
//! | [`LookupStatus`] | `NOT_ELIGIBLE` |
//! | [`ErrorCode`] | `NONE` |
//! | [`SourceType`] | `QUICK_ADD` |
//!
//! Reason lists persist as a JSON array of snake_case codes
//! (see [`encode_reasons`] / [`decode_reasons`]). Unknown codes are dropped.
//!
//! All timestamps are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OCR sub-state of an [`InboxItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcrStatus {
    NotStarted,
    InProgress,
    Done,
    Failed,
}

impl OcrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn decode(s: &str) -> Self {
        match s {
            "IN_PROGRESS" => Self::InProgress,
            "DONE" => Self::Done,
            "FAILED" => Self::Failed,
            _ => Self::NotStarted,
        }
    }
}

/// Lookup sub-state of an [`InboxItem`].
///
/// `NOT_ELIGIBLE → PENDING → {COMMITTED | NEEDS_REVIEW | FAILED}`,
/// `FAILED → PENDING`, `NEEDS_REVIEW → COMMITTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStatus {
    NotEligible,
    Pending,
    Committed,
    NeedsReview,
    Failed,
}

impl LookupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotEligible => "NOT_ELIGIBLE",
            Self::Pending => "PENDING",
            Self::Committed => "COMMITTED",
            Self::NeedsReview => "NEEDS_REVIEW",
            Self::Failed => "FAILED",
        }
    }

    pub fn decode(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "COMMITTED" => Self::Committed,
            "NEEDS_REVIEW" => Self::NeedsReview,
            "FAILED" => Self::Failed,
            _ => Self::NotEligible,
        }
    }

    pub const ALL: [LookupStatus; 5] = [
        Self::NotEligible,
        Self::Pending,
        Self::Committed,
        Self::NeedsReview,
        Self::Failed,
    ];
}

/// Closed error taxonomy recorded on an item after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    None,
    Offline,
    RateLimit,
    ApiError,
    NoMatch,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Offline => "OFFLINE",
            Self::RateLimit => "RATE_LIMIT",
            Self::ApiError => "API_ERROR",
            Self::NoMatch => "NO_MATCH",
        }
    }

    pub fn decode(s: &str) -> Self {
        match s {
            "OFFLINE" => Self::Offline,
            "RATE_LIMIT" => Self::RateLimit,
            "API_ERROR" => Self::ApiError,
            "NO_MATCH" => Self::NoMatch,
            _ => Self::None,
        }
    }
}

/// How an item entered the inbox. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    QuickAdd,
    Barcode,
    CoverPhoto,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickAdd => "QUICK_ADD",
            Self::Barcode => "BARCODE",
            Self::CoverPhoto => "COVER_PHOTO",
        }
    }

    pub fn decode(s: &str) -> Self {
        match s {
            "BARCODE" => Self::Barcode,
            "COVER_PHOTO" => Self::CoverPhoto,
            _ => Self::QuickAdd,
        }
    }
}

/// Why a score came out the way it did.
///
/// The first four are emitted by [`crate::scoring::score_candidate`]; the
/// rest are review triggers checked by [`crate::eligibility::is_needs_review`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    BarcodeMatch,
    CatalogNoMatch,
    TitleMatch,
    ArtistMatch,
    LowSignal,
    MultipleCandidates,
    MissingTitle,
    MissingArtist,
    WeakMatchTitle,
    WeakMatchArtist,
    NoApiMatch,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BarcodeMatch => "barcode_match",
            Self::CatalogNoMatch => "catalog_no_match",
            Self::TitleMatch => "title_match",
            Self::ArtistMatch => "artist_match",
            Self::LowSignal => "low_signal",
            Self::MultipleCandidates => "multiple_candidates",
            Self::MissingTitle => "missing_title",
            Self::MissingArtist => "missing_artist",
            Self::WeakMatchTitle => "weak_match_title",
            Self::WeakMatchArtist => "weak_match_artist",
            Self::NoApiMatch => "no_api_match",
        }
    }

    /// Parse a persisted code. Accepts either case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "barcode_match" => Some(Self::BarcodeMatch),
            "catalog_no_match" => Some(Self::CatalogNoMatch),
            "title_match" => Some(Self::TitleMatch),
            "artist_match" => Some(Self::ArtistMatch),
            "low_signal" => Some(Self::LowSignal),
            "multiple_candidates" => Some(Self::MultipleCandidates),
            "missing_title" => Some(Self::MissingTitle),
            "missing_artist" => Some(Self::MissingArtist),
            "weak_match_title" => Some(Self::WeakMatchTitle),
            "weak_match_artist" => Some(Self::WeakMatchArtist),
            "no_api_match" => Some(Self::NoApiMatch),
            _ => None,
        }
    }

    /// Codes that force an item into human review.
    pub const REVIEW_TRIGGERS: [ReasonCode; 7] = [
        Self::LowSignal,
        Self::MultipleCandidates,
        Self::MissingTitle,
        Self::MissingArtist,
        Self::WeakMatchTitle,
        Self::WeakMatchArtist,
        Self::NoApiMatch,
    ];

    pub fn triggers_review(&self) -> bool {
        Self::REVIEW_TRIGGERS.contains(self)
    }
}

/// Encode a reason list as a JSON array of snake_case codes.
pub fn encode_reasons(reasons: &[ReasonCode]) -> String {
    let codes: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
    serde_json::to_string(&codes).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a persisted reason list.
///
/// Unknown codes are dropped and duplicates collapse to their first
/// occurrence. Malformed JSON decodes to an empty list.
pub fn decode_reasons(json: &str) -> Vec<ReasonCode> {
    let raw: Vec<String> = serde_json::from_str(json).unwrap_or_default();
    let mut out = Vec::with_capacity(raw.len());
    for code in raw.iter().filter_map(|s| ReasonCode::parse(s)) {
        if !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// Result of scoring one candidate against a query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Confidence in `[0, 100]`.
    pub confidence: i32,
    /// Triggered rules, in rule-table order.
    pub reasons: Vec<ReasonCode>,
}

impl CandidateScore {
    pub fn reasons_json(&self) -> String {
        encode_reasons(&self.reasons)
    }
}

/// A match candidate returned by a metadata lookup provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub provider: String,
    pub provider_item_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub catalog_no: Option<String>,
    #[serde(default)]
    pub format_summary: Option<String>,
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub raw_json: String,
}

/// Fields recovered from OCR lines or a human edit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub label: Option<String>,
    pub catalog_no: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        [&self.title, &self.artist, &self.label, &self.catalog_no]
            .iter()
            .all(|f| non_blank(f.as_deref()).is_none())
    }
}

/// One capture event tracked from creation through OCR and lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxItem {
    pub id: String,
    pub source_type: SourceType,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_tried_at: Option<i64>,

    pub barcode: Option<String>,
    pub raw_title: Option<String>,
    pub raw_artist: Option<String>,
    pub raw_row_json: Option<String>,
    pub photo_uris: Vec<String>,

    pub ocr_status: OcrStatus,
    pub next_ocr_at: Option<i64>,

    pub lookup_status: LookupStatus,
    pub next_lookup_at: Option<i64>,
    pub retry_count: u32,
    pub error_code: ErrorCode,

    pub extracted_title: Option<String>,
    pub extracted_artist: Option<String>,
    pub extracted_label: Option<String>,
    pub extracted_catalog_no: Option<String>,

    pub confidence_score: Option<i32>,
    pub confidence_reasons: Vec<ReasonCode>,
    pub committed_provider_item_id: Option<String>,
    pub is_unknown: bool,
    pub was_undone: bool,

    pub deleted_at: Option<i64>,
    pub reference_photo_uri: Option<String>,

    /// Write counter for optimistic concurrency; bumped by every save.
    pub revision: i64,
}

impl InboxItem {
    /// A fresh item with every sub-state at its initial value.
    pub fn new(source_type: SourceType, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_type,
            created_at: now,
            updated_at: now,
            last_tried_at: None,
            barcode: None,
            raw_title: None,
            raw_artist: None,
            raw_row_json: None,
            photo_uris: Vec::new(),
            ocr_status: OcrStatus::NotStarted,
            next_ocr_at: None,
            lookup_status: LookupStatus::NotEligible,
            next_lookup_at: None,
            retry_count: 0,
            error_code: ErrorCode::None,
            extracted_title: None,
            extracted_artist: None,
            extracted_label: None,
            extracted_catalog_no: None,
            confidence_score: None,
            confidence_reasons: Vec::new(),
            committed_provider_item_id: None,
            is_unknown: false,
            was_undone: false,
            deleted_at: None,
            reference_photo_uri: None,
            revision: 0,
        }
    }

    /// Extracted title if present, else the raw one.
    pub fn best_title(&self) -> Option<&str> {
        non_blank(self.extracted_title.as_deref()).or(non_blank(self.raw_title.as_deref()))
    }

    /// Extracted artist if present, else the raw one.
    pub fn best_artist(&self) -> Option<&str> {
        non_blank(self.extracted_artist.as_deref()).or(non_blank(self.raw_artist.as_deref()))
    }

    pub fn best_catalog_no(&self) -> Option<&str> {
        non_blank(self.extracted_catalog_no.as_deref())
    }

    pub fn best_label(&self) -> Option<&str> {
        non_blank(self.extracted_label.as_deref())
    }

    pub fn best_barcode(&self) -> Option<&str> {
        non_blank(self.barcode.as_deref())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn reasons_json(&self) -> String {
        encode_reasons(&self.confidence_reasons)
    }
}

/// A scored lookup candidate attached to an [`InboxItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub id: String,
    pub inbox_item_id: String,
    pub provider: String,
    pub provider_item_id: String,
    pub title: String,
    pub artist: String,
    pub label: Option<String>,
    pub catalog_no: Option<String>,
    pub barcode: Option<String>,
    pub format_summary: Option<String>,
    pub thumb_url: Option<String>,
    pub raw_json: String,
    pub score: CandidateScore,
    pub created_at: i64,
}

impl ProviderSnapshot {
    pub fn from_candidate(
        inbox_item_id: &str,
        candidate: &ProviderCandidate,
        score: CandidateScore,
        now: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            inbox_item_id: inbox_item_id.to_string(),
            provider: candidate.provider.clone(),
            provider_item_id: candidate.provider_item_id.clone(),
            title: candidate.title.clone(),
            artist: candidate.artist.clone(),
            label: candidate.label.clone(),
            catalog_no: candidate.catalog_no.clone(),
            barcode: candidate.barcode.clone(),
            format_summary: candidate.format_summary.clone(),
            thumb_url: candidate.thumb_url.clone(),
            raw_json: candidate.raw_json.clone(),
            score,
            created_at: now,
        }
    }

    pub fn confidence(&self) -> i32 {
        self.score.confidence
    }
}

/// `Some(trimmed)` when the value has visible content.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
