//! Heuristic field extraction from OCR text lines.
//!
//! Sleeve and label text tends to put the title first and the artist
//! second; label and catalog number appear later as `"Label - CAT 123"` or
//! `"Label # CAT 123"`. The first such line wins.

use crate::models::ExtractedFields;

/// Parse recognised text lines into [`ExtractedFields`].
///
/// Blank lines are ignored before positions are assigned.
pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> ExtractedFields {
    let mut visible = lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty());

    let title = visible.next().map(String::from);
    let artist = visible.next().map(String::from);

    let mut fields = ExtractedFields {
        title,
        artist,
        ..Default::default()
    };

    if let Some((label, catno)) = visible.find_map(split_label_catno) {
        fields.label = Some(label);
        fields.catalog_no = Some(catno);
    }

    fields
}

/// Split `"label - catno"` / `"label # catno"`.
///
/// A spaced separator is preferred so catalog numbers like `SD-1311`
/// survive intact.
fn split_label_catno(line: &str) -> Option<(String, String)> {
    let at = [" - ", " # "]
        .iter()
        .filter_map(|sep| line.find(sep).map(|i| (i, sep.len())))
        .min_by_key(|(i, _)| *i)
        .or_else(|| line.find(|c| c == '#' || c == '-').map(|i| (i, 1)))?;

    let (idx, len) = at;
    let label = line[..idx].trim();
    let catno = line[idx + len..].trim();
    if label.is_empty() || catno.is_empty() {
        return None;
    }
    Some((label.to_string(), catno.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_artist_label_catno() {
        let fields = parse_lines(&["Blue Train", "John Coltrane", "Blue Note - BLP 1577"]);
        assert_eq!(fields.title.as_deref(), Some("Blue Train"));
        assert_eq!(fields.artist.as_deref(), Some("John Coltrane"));
        assert_eq!(fields.label.as_deref(), Some("Blue Note"));
        assert_eq!(fields.catalog_no.as_deref(), Some("BLP 1577"));
    }

    #[test]
    fn test_hash_separator_and_first_match_wins() {
        let fields = parse_lines(&[
            "Giant Steps",
            "John Coltrane",
            "Stereo",
            "Atlantic # SD 1311",
            "Rhino - R2 75203",
        ]);
        assert_eq!(fields.label.as_deref(), Some("Atlantic"));
        assert_eq!(fields.catalog_no.as_deref(), Some("SD 1311"));
    }

    #[test]
    fn test_hyphenated_catalog_number_is_kept() {
        let fields = parse_lines(&["Title", "Artist", "Atlantic - SD-1311"]);
        assert_eq!(fields.catalog_no.as_deref(), Some("SD-1311"));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let fields = parse_lines(&["", "  Kind of Blue ", "", "Miles Davis"]);
        assert_eq!(fields.title.as_deref(), Some("Kind of Blue"));
        assert_eq!(fields.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(fields.label, None);
    }

    #[test]
    fn test_label_line_needs_both_sides() {
        let fields = parse_lines(&["T", "A", "- 1234", "Columbia -"]);
        assert_eq!(fields.label, None);
        assert_eq!(fields.catalog_no, None);
    }

    #[test]
    fn test_empty_input() {
        let empty: [&str; 0] = [];
        assert!(parse_lines(&empty).is_empty());
    }
}
