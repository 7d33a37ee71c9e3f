//! Candidate scoring and the auto-commit decision.
//!
//! # Rule table
//!
//! | Condition | Points | Reason |
//! |-----------|--------|--------|
//! | query barcode equals candidate barcode | +50 | `barcode_match` |
//! | query catalog no equals candidate's (case-insensitive) | +25 | `catalog_no_match` |
//! | candidate title contains query title (case-insensitive) | +15 | `title_match` |
//! | candidate artist contains query artist (case-insensitive) | +10 | `artist_match` |
//!
//! Blank query fields never match. Each rule fires at most once and the
//! total is clamped to `[0, 100]`.

use crate::models::{non_blank, CandidateScore, ProviderCandidate, ReasonCode};

pub const BARCODE_POINTS: i32 = 50;
pub const CATALOG_NO_POINTS: i32 = 25;
pub const TITLE_POINTS: i32 = 15;
pub const ARTIST_POINTS: i32 = 10;

/// Top confidence at or above which a lookup commits without review.
pub const AUTO_COMMIT_THRESHOLD: i32 = 85;

/// Query-side signals for scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreQuery<'a> {
    pub title: Option<&'a str>,
    pub artist: Option<&'a str>,
    pub catalog_no: Option<&'a str>,
    pub barcode: Option<&'a str>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Score one candidate against the query.
pub fn score_candidate(query: &ScoreQuery<'_>, candidate: &ProviderCandidate) -> CandidateScore {
    let mut confidence = 0;
    let mut reasons = Vec::new();

    if let Some(barcode) = non_blank(query.barcode) {
        if candidate.barcode.as_deref() == Some(barcode) {
            confidence += BARCODE_POINTS;
            reasons.push(ReasonCode::BarcodeMatch);
        }
    }

    if let Some(catno) = non_blank(query.catalog_no) {
        let matched = candidate
            .catalog_no
            .as_deref()
            .is_some_and(|c| c.trim().to_lowercase() == catno.to_lowercase());
        if matched {
            confidence += CATALOG_NO_POINTS;
            reasons.push(ReasonCode::CatalogNoMatch);
        }
    }

    if let Some(title) = non_blank(query.title) {
        if contains_ci(&candidate.title, title) {
            confidence += TITLE_POINTS;
            reasons.push(ReasonCode::TitleMatch);
        }
    }

    if let Some(artist) = non_blank(query.artist) {
        if contains_ci(&candidate.artist, artist) {
            confidence += ARTIST_POINTS;
            reasons.push(ReasonCode::ArtistMatch);
        }
    }

    CandidateScore {
        confidence: confidence.clamp(0, 100),
        reasons,
    }
}

/// Which auto-commit rule the orchestrator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitRule {
    /// Commit when the top confidence reaches the threshold.
    Threshold,
    /// Additionally require a lead of `min_gap` over the runner-up and
    /// refuse items a human has already undone.
    Gap { min_gap: i32 },
}

impl Default for CommitRule {
    fn default() -> Self {
        Self::Threshold
    }
}

/// Gap-aware commit check.
///
/// A missing runner-up counts as an unbeatable lead.
pub fn should_auto_commit(
    top: i32,
    second: Option<i32>,
    was_undone: bool,
    threshold: i32,
    min_gap: i32,
) -> bool {
    if was_undone || top < threshold {
        return false;
    }
    match second {
        Some(s) => top - s >= min_gap,
        None => true,
    }
}

impl CommitRule {
    pub fn decide(&self, threshold: i32, top: i32, second: Option<i32>, was_undone: bool) -> bool {
        match *self {
            Self::Threshold => top >= threshold,
            Self::Gap { min_gap } => should_auto_commit(top, second, was_undone, threshold, min_gap),
        }
    }
}
