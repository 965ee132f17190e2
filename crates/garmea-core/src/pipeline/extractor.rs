use regex::Regex;

use crate::config::PipelineConfig;
use crate::document::Segment;
use crate::person::{PersonMention, RoleHint};

const TITLE_STRENGTH: f64 = 0.9;
const FULL_NAME_STRENGTH: f64 = 0.8;
const ANCHORED_STRENGTH: f64 = 0.7;
const ATTRIBUTE_BONUS: f64 = 0.05;

/// Words that the capitalized-name patterns must never promote to person
/// mentions: articles, connectors, month names.
const NAME_STOPWORDS: &[&str] = &[
    "le", "la", "les", "de", "du", "des", "et", "ou", "en", "dans", "pour", "avec", "sans",
    "sur", "sous", "par", "ce", "cette", "son", "sa", "ses", "leur", "leurs", "que", "qui",
    "dont", "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août",
    "septembre", "octobre", "novembre", "décembre", "an", "jour", "paroisse", "église",
];

struct Candidate {
    start: usize,
    end: usize,
    raw_name: String,
    title: Option<String>,
    strength: f64,
}

/// Finds person mentions in one segment using pattern rules tuned to
/// Ancien-Régime naming conventions. Pure per segment: extraction for a
/// segment never depends on which batch it was processed in.
pub struct EntityExtractor {
    min_name_confidence: f64,
    min_date_confidence: f64,
    title_name: Regex,
    full_name: Regex,
    anchored_name: Regex,
    year: Regex,
    birth_context: Regex,
    death_context: Regex,
    place: Regex,
    profession: Regex,
    child_after: Regex,
    father_before: Regex,
    mother_before: Regex,
    spouse_before: Regex,
    godfather_before: Regex,
    godmother_before: Regex,
}

impl EntityExtractor {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        // One capitalized name word, hyphenated compounds included.
        let word = r"[A-ZÀ-Ý][a-zà-ÿ']+(?:-[A-ZÀ-Ý][a-zà-ÿ']+)*";

        Self {
            min_name_confidence: config.min_name_confidence,
            min_date_confidence: config.min_date_confidence,
            title_name: Regex::new(&format!(
                r"\b((?i:messire|sieur|damoiselle|demoiselle|écuyer|noble\s+homme|noble\s+dame|maître|comte|comtesse|duc|duchesse|marquis|marquise))\s+({word}(?:\s+(?:(?:de|du|des|le|la)\s+)?{word})*)"
            ))
            .unwrap(),
            full_name: Regex::new(&format!(
                r"\b{word}(?:\s+(?:(?:de|du|des|le|la)\s+)?{word})+"
            ))
            .unwrap(),
            anchored_name: Regex::new(&format!(
                r"\b(?i:baptisée?|ondoyée?|inhumée?|née?|épousa|mariée?\s+à|(?:fils|fille|filz)\s+de|veuve?\s+de|parrain\s*:?\s|marraine\s*:?\s)\s*({word})"
            ))
            .unwrap(),
            year: Regex::new(r"\b(1[5-7]\d{2})\b").unwrap(),
            birth_context: Regex::new(r"(?i)\b(?:baptême|baptisé|ondoyé|né|née|naissance)").unwrap(),
            death_context: Regex::new(r"(?i)\b(?:inhumation|inhumé|décès|décédé|enterré)").unwrap(),
            place: Regex::new(
                r"(?:paroisse\s+d[e']\s*|commune\s+de\s+|\bà\s+)([A-ZÀ-Ý][a-zà-ÿ]+(?:-[A-ZÀ-Ý'][a-zà-ÿ']*)*)",
            )
            .unwrap(),
            profession: Regex::new(
                r"(?i)\b(curé|prestre|prêtre|avocat|conseiller|trésorier|notaire|marchand|laboureur|chirurgien|tisserand|meunier)\b",
            )
            .unwrap(),
            child_after: Regex::new(r"^\s*,?\s*(?:fils|fille|filz)\b").unwrap(),
            father_before: Regex::new(r"(?i)(?:fils|fille|filz)\s+de\s+$").unwrap(),
            mother_before: Regex::new(r"(?i)\bet\s+de\s+$").unwrap(),
            spouse_before: Regex::new(r"(?i)(?:épouse|époux|femme|mari|veuve|veuf)\s+de\s+$")
                .unwrap(),
            godfather_before: Regex::new(r"(?i)parrain\s*:?\s*$").unwrap(),
            godmother_before: Regex::new(r"(?i)marraine\s*:?\s*$").unwrap(),
        }
    }

    #[must_use]
    pub fn extract(&self, segment: &Segment) -> Vec<PersonMention> {
        let text = &segment.text;
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut used: Vec<(usize, usize)> = Vec::new();

        // Highest-precision tier first; later tiers must not overlap spans
        // already claimed.
        for caps in self.title_name.captures_iter(text) {
            let title = caps.get(1).map(|m| m.as_str().to_string());
            let name = match caps.get(2) {
                Some(m) => m,
                None => continue,
            };
            let whole = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };
            if overlaps(&used, whole.start(), whole.end()) {
                continue;
            }
            used.push((whole.start(), whole.end()));
            candidates.push(Candidate {
                start: name.start(),
                end: name.end(),
                raw_name: name.as_str().to_string(),
                title,
                strength: TITLE_STRENGTH,
            });
        }

        for m in self.full_name.find_iter(text) {
            if overlaps(&used, m.start(), m.end()) || self.is_stopword_name(m.as_str()) {
                continue;
            }
            used.push((m.start(), m.end()));
            candidates.push(Candidate {
                start: m.start(),
                end: m.end(),
                raw_name: m.as_str().to_string(),
                title: None,
                strength: FULL_NAME_STRENGTH,
            });
        }

        for caps in self.anchored_name.captures_iter(text) {
            let Some(name) = caps.get(1) else { continue };
            if overlaps(&used, name.start(), name.end()) || self.is_stopword_name(name.as_str()) {
                continue;
            }
            used.push((name.start(), name.end()));
            candidates.push(Candidate {
                start: name.start(),
                end: name.end(),
                raw_name: name.as_str().to_string(),
                title: None,
                strength: ANCHORED_STRENGTH,
            });
        }

        candidates.sort_by(|a, b| a.start.cmp(&b.start).then(a.raw_name.cmp(&b.raw_name)));

        let segment_year = self
            .year
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok());
        let has_birth_context = self.birth_context.is_match(text);
        let has_death_context = self.death_context.is_match(text);
        let segment_place = self.find_place(text, &candidates);

        let mut mentions = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.iter().enumerate() {
            let role = self.role_for(text, candidate);
            let principal = index == 0 || role == Some(RoleHint::Child);

            let mut confidence = candidate.strength * (0.5 + 0.5 * segment.quality);

            let mut mention = PersonMention::new(
                segment.id,
                segment.document_id,
                candidate.raw_name.clone(),
                0.0,
            );
            if let Some(title) = &candidate.title {
                mention = mention.with_title(title.clone());
            }
            if let Some(role) = role {
                mention = mention.with_role_hint(role);
            }

            // Dates from low-quality segments are unreliable; keep them off
            // the record below the configured floor.
            if principal && segment.quality >= self.min_date_confidence {
                if let Some(year) = segment_year {
                    if has_birth_context {
                        mention = mention.with_birth_year(year);
                        confidence += ATTRIBUTE_BONUS;
                    } else if has_death_context {
                        mention = mention.with_death_year(year);
                        confidence += ATTRIBUTE_BONUS;
                    }
                }
            }
            if principal {
                if let Some(place) = &segment_place {
                    mention = mention.with_place(place.clone());
                    confidence += ATTRIBUTE_BONUS;
                }
            }
            if let Some(profession) = self.find_profession(text, candidate.end) {
                mention = mention.with_profession(profession);
            }

            let (given, surname) = split_name(&candidate.raw_name);
            mention = mention
                .with_name_parts(given, surname)
                .with_confidence(confidence)
                .flagged_low_confidence(self.min_name_confidence);

            mentions.push(mention);
        }

        mentions
    }

    fn is_stopword_name(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        NAME_STOPWORDS.contains(&lowered.as_str())
    }

    fn role_for(&self, text: &str, candidate: &Candidate) -> Option<RoleHint> {
        let before = &text[..candidate.start];
        let after = &text[candidate.end..];

        if self.father_before.is_match(before) {
            return Some(RoleHint::Father);
        }
        if self.mother_before.is_match(before) {
            return Some(RoleHint::Mother);
        }
        if self.spouse_before.is_match(before) {
            return Some(RoleHint::Spouse);
        }
        if self.godfather_before.is_match(before) {
            return Some(RoleHint::Godfather);
        }
        if self.godmother_before.is_match(before) {
            return Some(RoleHint::Godmother);
        }
        if self.child_after.is_match(after) || before.trim_end().ends_with("baptisé")
            || before.trim_end().ends_with("baptisée")
        {
            return Some(RoleHint::Child);
        }
        None
    }

    fn find_place(&self, text: &str, candidates: &[Candidate]) -> Option<String> {
        for caps in self.place.captures_iter(text) {
            let m = caps.get(1)?;
            // "à Pierre Dupont" would otherwise read a person as a place.
            let inside_name = candidates
                .iter()
                .any(|c| m.start() >= c.start && m.end() <= c.end);
            if !inside_name {
                return Some(m.as_str().to_string());
            }
        }
        None
    }

    fn find_profession(&self, text: &str, after: usize) -> Option<String> {
        let mut window_end = text.len().min(after + 48);
        // Accented text can put the cutoff mid-character.
        while !text.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &text[after..window_end];
        self.profession
            .captures(window)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
    }
}

fn overlaps(used: &[(usize, usize)], start: usize, end: usize) -> bool {
    used.iter().any(|&(s, e)| start < e && end > s)
}

fn split_name(raw: &str) -> (Vec<String>, Option<String>) {
    let words: Vec<&str> = raw
        .split_whitespace()
        .filter(|w| !matches!(w.to_lowercase().as_str(), "de" | "du" | "des" | "le" | "la"))
        .collect();
    match words.as_slice() {
        [] => (Vec::new(), None),
        [only] => (vec![(*only).to_string()], None),
        [given @ .., last] => (
            given.iter().map(|w| (*w).to_string()).collect(),
            Some((*last).to_string()),
        ),
    }
}
