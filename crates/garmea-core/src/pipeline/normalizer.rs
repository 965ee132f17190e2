use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PipelineConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty input text")]
    EmptyText,
    #[error("Input text too long: {len} bytes (max {max})")]
    TextTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub text: String,
    /// Edits applied divided by token count; a high value signals degraded
    /// source OCR.
    pub improvement_ratio: f64,
}

/// Cleans OCR noise and archaic orthography with a fixed, ordered set of
/// rewrite rules. Deterministic and idempotent: normalizing already
/// normalized text returns it unchanged with a ratio of 0.
pub struct TextNormalizer {
    max_text_len: usize,
    word_corrections: Vec<(&'static str, &'static str)>,
    pattern_fixes: Vec<(Regex, &'static str)>,
    abbreviations: Vec<(Regex, &'static str)>,
    multi_space: Regex,
    multi_newline: Regex,
    trailing_space: Regex,
}

/// Exact corrections for transcription errors recurring across registers.
/// Each output must not itself contain any listed error, or idempotence
/// breaks.
const WORD_CORRECTIONS: &[(&str, &str)] = &[
    // Systematic "Aii" misreads
    ("Aiicelle", "Ancelle"),
    ("Aiieelle", "Ancelle"),
    ("Aiiber", "Auber"),
    ("Aiimont", "Aumont"),
    ("Aiivray", "Auvray"),
    // Common letter confusions
    ("Jaeques", "Jacques"),
    ("Franteois", "François"),
    ("Catlierhie", "Catherine"),
    ("Guillaïune", "Guillaume"),
    ("Iagdeleine", "Madeleine"),
    ("Jlagdeleiue", "Madeleine"),
    ("Cliarles", "Charles"),
    ("Jeau", "Jean"),
    ("Nicollas", "Nicolas"),
    ("Toussaiut", "Toussaint"),
    ("Muiiie", "Marie"),
    ("Vietoire", "Victoire"),
    ("Padelaine", "Madeleine"),
    ("Cardinne", "Catherine"),
    ("Gabi-iel", "Gabriel"),
    ("Aimép", "Aimée"),
    // Truncated compounds
    ("Marie- An", "Marie-Anne"),
    // "1" misread for "i" in relation keywords; listed here so the generic
    // digit fix (which rewrites 1 to l) never sees them
    ("f1ls", "fils"),
    ("f1lle", "fille"),
    // Split or mangled relation keywords
    ("parr ain", "parrain"),
    ("Parr ain", "Parrain"),
    ("marr aine", "marraine"),
    ("Marr aine", "Marraine"),
    ("épous de", "épouse de"),
    ("fils d ", "fils de "),
    ("fille d ", "fille de "),
];

impl TextNormalizer {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let pattern_fixes = vec![
            // Digits misread for letters inside words
            (Regex::new(r"([a-zà-ÿ])1([a-zà-ÿ])").unwrap(), "${1}l${2}"),
            (Regex::new(r"([a-zà-ÿ])0([a-zà-ÿ])").unwrap(), "${1}o${2}"),
            // Repeated punctuation left by column bleed
            (Regex::new(r"[,;.]{2,}").unwrap(), ","),
            // Punctuation wedged into "de"/"et" connectors
            (Regex::new(r"\s*[,;.]\s*de\s+").unwrap(), " de "),
            (Regex::new(r"\s*[,;.]\s*et\s+").unwrap(), " et "),
        ];

        let abbreviations = vec![
            (Regex::new(r"\b[Ss]gr\.?\s").unwrap(), "seigneur "),
            (Regex::new(r"\b[Ss]r\.?\s").unwrap(), "sieur "),
            (Regex::new(r"\b[ÉéEe]c\.\s").unwrap(), "écuyer "),
            (Regex::new(r"\b[Bb]apt\.\s").unwrap(), "baptême "),
            (Regex::new(r"\b[Mm]ar\.\s").unwrap(), "mariage "),
            (Regex::new(r"\b[Ii]nh\.\s").unwrap(), "inhumation "),
            (Regex::new(r"\bjanv\.").unwrap(), "janvier"),
            (Regex::new(r"\bfév\.").unwrap(), "février"),
            (Regex::new(r"\bsept\.").unwrap(), "septembre"),
            (Regex::new(r"\boct\.").unwrap(), "octobre"),
            (Regex::new(r"\bnov\.").unwrap(), "novembre"),
            (Regex::new(r"\bdéc\.").unwrap(), "décembre"),
        ];

        Self {
            max_text_len: config.max_text_len,
            word_corrections: WORD_CORRECTIONS.to_vec(),
            pattern_fixes,
            abbreviations,
            multi_space: Regex::new(r"[ \t]{2,}").unwrap(),
            multi_newline: Regex::new(r"\n{3,}").unwrap(),
            trailing_space: Regex::new(r"[ \t]+\n").unwrap(),
        }
    }

    pub fn normalize(&self, raw: &str) -> Result<NormalizedText, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if raw.len() > self.max_text_len {
            return Err(ValidationError::TextTooLong {
                len: raw.len(),
                max: self.max_text_len,
            });
        }

        let mut edits = 0usize;
        let mut text = self.strip_controls(raw, &mut edits);
        text = self.unify_punctuation(&text, &mut edits);
        text = self.collapse_whitespace(&text, &mut edits);

        for (error, correction) in &self.word_corrections {
            let occurrences = text.matches(error).count();
            if occurrences > 0 {
                edits += occurrences;
                text = text.replace(error, correction);
            }
        }

        // Abbreviations first: the punctuation fixes below would otherwise
        // strip the dot that marks "inh. de" as an abbreviation.
        for (pattern, replacement) in &self.abbreviations {
            text = replace_counting(pattern, &text, replacement, &mut edits);
        }
        for (pattern, replacement) in &self.pattern_fixes {
            text = replace_counting(pattern, &text, replacement, &mut edits);
        }

        let trimmed = text.trim();
        if trimmed.len() != text.len() {
            edits += 1;
            text = trimmed.to_string();
        }

        let tokens = text.split_whitespace().count().max(1);
        #[allow(clippy::cast_precision_loss)]
        let improvement_ratio = (edits as f64 / tokens as f64).min(1.0);

        Ok(NormalizedText {
            text,
            improvement_ratio,
        })
    }

    fn strip_controls(&self, text: &str, edits: &mut usize) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if c != '\n' && c != '\t' && c.is_control() {
                *edits += 1;
            } else {
                out.push(c);
            }
        }
        out
    }

    fn unify_punctuation(&self, text: &str, edits: &mut usize) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\u{2018}' | '\u{2019}' | '`' => {
                    *edits += 1;
                    out.push('\'');
                }
                '\u{201C}' | '\u{201D}' => {
                    *edits += 1;
                    out.push('"');
                }
                '\u{2026}' => {
                    *edits += 1;
                    out.push_str("...");
                }
                c => out.push(c),
            }
        }
        out
    }

    fn collapse_whitespace(&self, text: &str, edits: &mut usize) -> String {
        let text = text.replace("\r\n", "\n");
        let text = replace_counting(&self.trailing_space, &text, "\n", edits);
        let text = replace_counting(&self.multi_space, &text, " ", edits);
        replace_counting(&self.multi_newline, &text, "\n\n", edits)
    }
}

fn replace_counting(pattern: &Regex, text: &str, replacement: &str, edits: &mut usize) -> String {
    let occurrences = pattern.find_iter(text).count();
    if occurrences == 0 {
        return text.to_string();
    }
    *edits += occurrences;
    pattern.replace_all(text, replacement).into_owned()
}
