use regex::Regex;
use uuid::Uuid;

use crate::document::Segment;

/// Quality deduction applied when no structural boundary was found and the
/// whole text is kept as a single act.
const NO_BOUNDARY_PENALTY: f64 = 0.15;

const BASE_SCORE: f64 = 0.10;
const DATE_SCORE: f64 = 0.35;
const NAME_SCORE: f64 = 0.35;
const PLACE_SCORE: f64 = 0.20;

/// Splits normalized text into act-level segments using paragraph breaks and
/// the record-opening phrases of period registers, then scores each segment
/// for structural completeness.
pub struct Segmenter {
    opening: Regex,
    blank_line: Regex,
    date_marker: Regex,
    name_marker: Regex,
    place_marker: Regex,
}

impl Segmenter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            // "L'an de grâce 1643", "Le 12 mars 1687", "1651, 23 janvier",
            // "Au nom de Dieu", "Acte de baptême"
            opening: Regex::new(
                r"(?:L'an\s+(?:de\s+(?:grâce\s+)?)?\d{3,4}|Le\s+\d{1,2}\s+[[:alpha:]àâéèêîôûç]+|\d{4},\s*\d{1,2}\s|Au\s+nom\s+de\s+Dieu|Ce\s+jourd?'hui|Acte\s+de\s+[[:alpha:]é]+)",
            )
            .unwrap(),
            blank_line: Regex::new(r"\n{2,}").unwrap(),
            date_marker: Regex::new(
                r"\b(?:1[5-7]\d{2}|\d{1,2}\s+(?:janvier|février|mars|avril|mai|juin|juillet|août|septembre|octobre|novembre|décembre))\b",
            )
            .unwrap(),
            name_marker: Regex::new(
                r"(?:\b[A-ZÀ-Ý][a-zà-ÿ']+\s+[A-ZÀ-Ý][a-zà-ÿ'-]+|\b(?:[Ss]ieur|[Mm]essire|[Dd]amoiselle|[Éé]cuyer|[Ss]eigneur)\b)",
            )
            .unwrap(),
            place_marker: Regex::new(
                r"(?:\b(?:paroisse|église|commune|bourg|ville)\s+d[e']\s*[A-ZÀ-Ý]|\bà\s+[A-ZÀ-Ý][a-zà-ÿ-]+)",
            )
            .unwrap(),
        }
    }

    /// Produces the act-level segments of `text`. Empty input yields an
    /// empty list; this is a data condition, not an error.
    #[must_use]
    pub fn segment(&self, document_id: Uuid, text: &str) -> Vec<Segment> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut boundaries = self.find_boundaries(text);
        let found_structure = !boundaries.is_empty();
        if !boundaries.contains(&0) {
            boundaries.insert(0, 0);
        }
        boundaries.push(text.len());
        boundaries.sort_unstable();
        boundaries.dedup();

        let mut segments = Vec::new();
        for window in boundaries.windows(2) {
            let (start, end) = (window[0], window[1]);
            let raw = &text[start..end];
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }

            let mut quality = self.score(trimmed);
            if !found_structure {
                quality -= NO_BOUNDARY_PENALTY;
            }
            segments.push(Segment::new(
                document_id,
                trimmed.to_string(),
                start,
                end,
                quality.clamp(0.0, 1.0),
            ));
        }

        segments
    }

    fn find_boundaries(&self, text: &str) -> Vec<usize> {
        let mut boundaries: Vec<usize> = self
            .blank_line
            .find_iter(text)
            .map(|m| m.end())
            .collect();

        for m in self.opening.find_iter(text) {
            if Self::starts_record(text, m.start()) {
                boundaries.push(m.start());
            }
        }

        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries
    }

    /// An opening phrase only starts a record at the start of the text, of a
    /// line, or directly after a sentence end.
    fn starts_record(text: &str, offset: usize) -> bool {
        let before = text[..offset].trim_end_matches([' ', '\t']);
        before.is_empty() || before.ends_with(['\n', '.'])
    }

    fn score(&self, text: &str) -> f64 {
        let mut quality = BASE_SCORE;
        if self.date_marker.is_match(text) {
            quality += DATE_SCORE;
        }
        if self.name_marker.is_match(text) {
            quality += NAME_SCORE;
        }
        if self.place_marker.is_match(text) {
            quality += PLACE_SCORE;
        }
        quality
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}
