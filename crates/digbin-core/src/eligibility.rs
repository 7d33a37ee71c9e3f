//! Time-parameterized readiness predicates over an [`InboxItem`].
//!
//! Every function here is pure: callers pass `now` explicitly (epoch
//! milliseconds). The orchestrator uses them to decide transitions and the
//! stores use them to filter batch queries, so both always agree on what
//! "due" means.

use crate::models::{InboxItem, LookupStatus, OcrStatus, SourceType};

/// Confidence below which an item is flagged for review.
pub const REVIEW_THRESHOLD: i32 = 70;

/// True when the item carries enough to query a metadata provider.
///
/// Any one of: a barcode, a catalog number, both title and artist, or a
/// title on a cover-photo capture.
pub fn has_signal(item: &InboxItem) -> bool {
    if item.best_barcode().is_some() || item.best_catalog_no().is_some() {
        return true;
    }
    let title = item.best_title().is_some();
    if title && item.best_artist().is_some() {
        return true;
    }
    item.source_type == SourceType::CoverPhoto && title
}

fn due(at: Option<i64>, now: i64) -> bool {
    at.unwrap_or(0) <= now
}

pub fn is_ocr_eligible(item: &InboxItem, now: i64) -> bool {
    !item.is_deleted()
        && item.ocr_status == OcrStatus::NotStarted
        && !item.photo_uris.is_empty()
        && due(item.next_ocr_at, now)
}

pub fn is_lookup_eligible(item: &InboxItem, now: i64) -> bool {
    !item.is_deleted()
        && item.lookup_status == LookupStatus::Pending
        && has_signal(item)
        && due(item.next_lookup_at, now)
}

/// True when no automatic decision cleared the confidence/signal bar.
pub fn is_needs_review(item: &InboxItem) -> bool {
    if item.is_unknown {
        return true;
    }
    if item.best_title().is_none() || item.best_artist().is_none() {
        return true;
    }
    if item.confidence_score.unwrap_or(0) < REVIEW_THRESHOLD {
        return true;
    }
    item.confidence_reasons.iter().any(|r| r.triggers_review())
}

/// True when the item is waiting on a human.
///
/// NEEDS_REVIEW and FAILED items, plus NOT_ELIGIBLE items with no OCR
/// attempt still to come. PENDING and COMMITTED items are excluded
/// whatever their confidence.
pub fn awaits_decision(item: &InboxItem) -> bool {
    if item.is_deleted() {
        return false;
    }
    match item.lookup_status {
        LookupStatus::NeedsReview | LookupStatus::Failed => true,
        LookupStatus::NotEligible if item.source_type == SourceType::CoverPhoto => {
            match item.ocr_status {
                OcrStatus::Done => true,
                OcrStatus::Failed => item.next_ocr_at.is_none(),
                OcrStatus::NotStarted | OcrStatus::InProgress => false,
            }
        }
        LookupStatus::NotEligible => true,
        LookupStatus::Pending | LookupStatus::Committed => false,
    }
}

/// A FAILED lookup whose backoff has elapsed.
pub fn is_lookup_requeue_due(item: &InboxItem, now: i64) -> bool {
    !item.is_deleted()
        && item.lookup_status == LookupStatus::Failed
        && has_signal(item)
        && item.next_lookup_at.is_some_and(|at| at <= now)
}

/// A FAILED OCR pass with a retry time that has elapsed.
///
/// Items that failed without a retry time stay failed.
pub fn is_ocr_requeue_due(item: &InboxItem, now: i64) -> bool {
    !item.is_deleted()
        && item.ocr_status == OcrStatus::Failed
        && item.next_ocr_at.is_some_and(|at| at <= now)
}

/// An OCR attempt that has been in flight for at least `stale_after_ms`.
pub fn is_ocr_stale(item: &InboxItem, now: i64, stale_after_ms: i64) -> bool {
    !item.is_deleted()
        && item.ocr_status == OcrStatus::InProgress
        && item.last_tried_at.unwrap_or(0).saturating_add(stale_after_ms) <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReasonCode;

    fn reviewed_item() -> InboxItem {
        let mut item = InboxItem::new(SourceType::QuickAdd, 0);
        item.raw_title = Some("Blue Train".into());
        item.raw_artist = Some("John Coltrane".into());
        item.confidence_score = Some(90);
        item
    }

    #[test]
    fn test_signal_sources() {
        let mut item = InboxItem::new(SourceType::QuickAdd, 0);
        assert!(!has_signal(&item));

        item.raw_title = Some("Blue Train".into());
        assert!(!has_signal(&item), "title alone is not enough for quick add");

        item.raw_artist = Some("John Coltrane".into());
        assert!(has_signal(&item));

        let mut cover = InboxItem::new(SourceType::CoverPhoto, 0);
        cover.extracted_title = Some("Blue Train".into());
        assert!(has_signal(&cover), "cover photo title alone is a signal");

        let mut catno = InboxItem::new(SourceType::QuickAdd, 0);
        catno.extracted_catalog_no = Some("BLP 1577".into());
        assert!(has_signal(&catno));

        let mut barcode = InboxItem::new(SourceType::Barcode, 0);
        barcode.barcode = Some("   ".into());
        assert!(!has_signal(&barcode), "blank barcode is not a signal");
    }

    #[test]
    fn test_ocr_eligibility() {
        let mut item = InboxItem::new(SourceType::CoverPhoto, 0);
        assert!(!is_ocr_eligible(&item, 100), "no photos");

        item.photo_uris.push("file:///cover.jpg".into());
        assert!(is_ocr_eligible(&item, 100));

        item.next_ocr_at = Some(200);
        assert!(!is_ocr_eligible(&item, 100));
        assert!(is_ocr_eligible(&item, 200));

        item.ocr_status = OcrStatus::InProgress;
        assert!(!is_ocr_eligible(&item, 200));
    }

    #[test]
    fn test_lookup_eligibility_requires_signal() {
        let mut item = InboxItem::new(SourceType::QuickAdd, 0);
        item.lookup_status = LookupStatus::Pending;
        for now in [0, 1_000, i64::MAX] {
            assert!(!is_lookup_eligible(&item, now));
        }

        item.barcode = Some("012345678905".into());
        item.next_lookup_at = Some(500);
        assert!(!is_lookup_eligible(&item, 499));
        assert!(is_lookup_eligible(&item, 500));

        item.lookup_status = LookupStatus::Failed;
        assert!(!is_lookup_eligible(&item, 500));
    }

    #[test]
    fn test_deleted_items_are_never_eligible() {
        let mut item = InboxItem::new(SourceType::Barcode, 0);
        item.barcode = Some("012345678905".into());
        item.lookup_status = LookupStatus::Pending;
        item.photo_uris.push("file:///cover.jpg".into());
        item.deleted_at = Some(1);
        assert!(!is_lookup_eligible(&item, 10));
        assert!(!is_ocr_eligible(&item, 10));
    }

    #[test]
    fn test_needs_review() {
        let item = reviewed_item();
        assert!(!is_needs_review(&item));

        let mut low = reviewed_item();
        low.confidence_score = Some(69);
        assert!(is_needs_review(&low));

        let mut unscored = reviewed_item();
        unscored.confidence_score = None;
        assert!(is_needs_review(&unscored));

        let mut unknown = reviewed_item();
        unknown.is_unknown = true;
        assert!(is_needs_review(&unknown));

        let mut no_artist = reviewed_item();
        no_artist.raw_artist = None;
        assert!(is_needs_review(&no_artist));

        let mut flagged = reviewed_item();
        flagged.confidence_reasons = vec![ReasonCode::TitleMatch, ReasonCode::MultipleCandidates];
        assert!(is_needs_review(&flagged));

        let mut positive = reviewed_item();
        positive.confidence_reasons = vec![ReasonCode::BarcodeMatch, ReasonCode::TitleMatch];
        assert!(!is_needs_review(&positive));
    }

    #[test]
    fn test_awaits_decision_skips_queued_and_committed() {
        // Queued work is not a review item, however low its confidence.
        let mut pending = InboxItem::new(SourceType::Barcode, 0);
        pending.barcode = Some("X123".into());
        pending.lookup_status = LookupStatus::Pending;
        assert!(is_needs_review(&pending));
        assert!(!awaits_decision(&pending));

        let mut failed = pending.clone();
        failed.lookup_status = LookupStatus::Failed;
        assert!(awaits_decision(&failed));

        let mut committed = reviewed_item();
        committed.lookup_status = LookupStatus::Committed;
        committed.confidence_score = Some(25);
        assert!(!awaits_decision(&committed));

        let mut review = reviewed_item();
        review.lookup_status = LookupStatus::NeedsReview;
        assert!(awaits_decision(&review));
        review.deleted_at = Some(1);
        assert!(!awaits_decision(&review));

        let mut cover = InboxItem::new(SourceType::CoverPhoto, 0);
        cover.photo_uris.push("file:///cover.jpg".into());
        assert!(!awaits_decision(&cover), "OCR has not run yet");
        cover.ocr_status = OcrStatus::Failed;
        cover.next_ocr_at = Some(500);
        assert!(!awaits_decision(&cover), "OCR retry scheduled");
        cover.next_ocr_at = None;
        assert!(awaits_decision(&cover));
        cover.ocr_status = OcrStatus::Done;
        assert!(awaits_decision(&cover), "OCR read nothing searchable");

        let blank = InboxItem::new(SourceType::QuickAdd, 0);
        assert!(awaits_decision(&blank));
    }

    #[test]
    fn test_requeue_and_stale_predicates() {
        let mut item = InboxItem::new(SourceType::Barcode, 0);
        item.barcode = Some("X123".into());
        item.lookup_status = LookupStatus::Failed;
        assert!(!is_lookup_requeue_due(&item, 1_000), "no retry time scheduled");
        item.next_lookup_at = Some(600);
        assert!(!is_lookup_requeue_due(&item, 599));
        assert!(is_lookup_requeue_due(&item, 600));

        item.ocr_status = OcrStatus::Failed;
        assert!(!is_ocr_requeue_due(&item, 1_000));
        item.next_ocr_at = Some(10);
        assert!(is_ocr_requeue_due(&item, 10));

        item.ocr_status = OcrStatus::InProgress;
        item.last_tried_at = Some(1_000);
        assert!(!is_ocr_stale(&item, 1_500, 900));
        assert!(is_ocr_stale(&item, 1_900, 900));
    }
}
