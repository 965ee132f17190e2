use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a mention plays inside its act, when the surrounding keywords give
/// one away. Used as corroborating evidence, never as a hard constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleHint {
    Child,
    Father,
    Mother,
    Spouse,
    Godfather,
    Godmother,
    Witness,
}

impl RoleHint {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Father => "father",
            Self::Mother => "mother",
            Self::Spouse => "spouse",
            Self::Godfather => "godfather",
            Self::Godmother => "godmother",
            Self::Witness => "witness",
        }
    }
}

impl std::fmt::Display for RoleHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate person reference extracted from one segment. Immutable; many
/// mentions may later resolve to the same canonical [`Person`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonMention {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub document_id: Uuid,
    pub raw_name: String,
    pub normalized_name: String,
    pub given_names: Vec<String>,
    pub surname: Option<String>,
    pub title: Option<String>,
    pub role_hint: Option<RoleHint>,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
    pub place: Option<String>,
    pub profession: Option<String>,
    pub confidence: f64,
    pub low_confidence: bool,
}

impl PersonMention {
    #[must_use]
    pub fn new(segment_id: Uuid, document_id: Uuid, raw_name: String, confidence: f64) -> Self {
        let normalized_name = normalize_name(&raw_name);
        Self {
            id: Uuid::now_v7(),
            segment_id,
            document_id,
            raw_name,
            normalized_name,
            given_names: Vec::new(),
            surname: None,
            title: None,
            role_hint: None,
            birth_year: None,
            death_year: None,
            place: None,
            profession: None,
            confidence: confidence.clamp(0.0, 1.0),
            low_confidence: false,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: String) -> Self {
        self.title = Some(title);
        self
    }

    #[must_use]
    pub fn with_role_hint(mut self, role: RoleHint) -> Self {
        self.role_hint = Some(role);
        self
    }

    #[must_use]
    pub fn with_birth_year(mut self, year: i32) -> Self {
        self.birth_year = Some(year);
        self
    }

    #[must_use]
    pub fn with_death_year(mut self, year: i32) -> Self {
        self.death_year = Some(year);
        self
    }

    #[must_use]
    pub fn with_place(mut self, place: String) -> Self {
        self.place = Some(place);
        self
    }

    #[must_use]
    pub fn with_profession(mut self, profession: String) -> Self {
        self.profession = Some(profession);
        self
    }

    #[must_use]
    pub fn with_name_parts(mut self, given_names: Vec<String>, surname: Option<String>) -> Self {
        self.given_names = given_names;
        self.surname = surname;
        self
    }

    #[must_use]
    pub fn flagged_low_confidence(mut self, min_confidence: f64) -> Self {
        self.low_confidence = self.confidence < min_confidence;
        self
    }
}

/// Lowercased, accent-stripped, space-collapsed form used for matching.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_space = true;
    for c in name.chars() {
        let mapped = fold_char(c);
        match mapped {
            Some(c) if c == ' ' => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
            Some(c) => {
                out.push(c);
                last_space = false;
            }
            None => {}
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn fold_char(c: char) -> Option<char> {
    let c = match c {
        'à' | 'á' | 'â' | 'ä' | 'À' | 'Á' | 'Â' | 'Ä' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
        'ò' | 'ó' | 'ô' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'œ' | 'Œ' => 'e',
        'ÿ' | 'ý' | 'Ý' => 'y',
        '-' | '\'' => ' ',
        c if c.is_whitespace() => ' ',
        c if c.is_alphanumeric() => c.to_ascii_lowercase(),
        _ => return None,
    };
    Some(c.to_ascii_lowercase())
}

/// One best-known attribute value with its confidence and source trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute<T> {
    pub value: T,
    pub confidence: f64,
    pub source_segment: Uuid,
}

impl<T: PartialEq> Attribute<T> {
    #[must_use]
    pub fn new(value: T, confidence: f64, source_segment: Uuid) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source_segment,
        }
    }

    /// Keeps the higher-confidence value; on a tie the incoming (most
    /// recently processed) value wins. Returns true when the incoming value
    /// disagreed with the stored one.
    pub fn merge(&mut self, incoming: Self) -> bool {
        let conflicting = incoming.value != self.value;
        if incoming.confidence >= self.confidence {
            *self = incoming;
        }
        conflicting
    }
}

/// The merged, deduplicated identity for one real individual. Mutated by the
/// registry each time a new matching mention arrives; never deleted within a
/// processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub canonical_name: String,
    pub name_variants: Vec<String>,
    pub birth_year: Option<Attribute<i32>>,
    pub death_year: Option<Attribute<i32>>,
    pub place: Option<Attribute<String>>,
    pub profession: Option<Attribute<String>>,
    pub mention_ids: Vec<Uuid>,
    pub low_confidence: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    #[must_use]
    pub fn from_mention(mention: &PersonMention) -> Self {
        let now = Utc::now();
        let mut person = Self {
            id: Uuid::now_v7(),
            canonical_name: mention.raw_name.clone(),
            name_variants: vec![mention.raw_name.clone()],
            birth_year: None,
            death_year: None,
            place: None,
            profession: None,
            mention_ids: vec![mention.id],
            low_confidence: mention.low_confidence,
            created_at: now,
            updated_at: now,
        };
        person.merge_conflicts_from(mention);
        person
    }

    /// Folds a newly attached mention into the record. Returns the number of
    /// attribute conflicts resolved by the confidence/tie-break rule.
    pub fn absorb(&mut self, mention: &PersonMention) -> usize {
        if !self.mention_ids.contains(&mention.id) {
            self.mention_ids.push(mention.id);
        }
        if !self.name_variants.contains(&mention.raw_name) {
            self.name_variants.push(mention.raw_name.clone());
        }
        // A longer variant usually carries the surname; prefer it as the
        // canonical form.
        if mention.raw_name.len() > self.canonical_name.len() {
            self.canonical_name = mention.raw_name.clone();
        }
        if self.low_confidence && !mention.low_confidence {
            self.low_confidence = false;
        }
        let conflicts = self.merge_conflicts_from(mention);
        self.updated_at = Utc::now();
        conflicts
    }

    fn merge_conflicts_from(&mut self, mention: &PersonMention) -> usize {
        let mut conflicts = 0;
        conflicts += merge_attr(
            &mut self.birth_year,
            mention.birth_year,
            mention.confidence,
            mention.segment_id,
        );
        conflicts += merge_attr(
            &mut self.death_year,
            mention.death_year,
            mention.confidence,
            mention.segment_id,
        );
        conflicts += merge_attr(
            &mut self.place,
            mention.place.clone(),
            mention.confidence,
            mention.segment_id,
        );
        conflicts += merge_attr(
            &mut self.profession,
            mention.profession.clone(),
            mention.confidence,
            mention.segment_id,
        );
        conflicts
    }

    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.canonical_name)
    }
}

fn merge_attr<T: PartialEq>(
    slot: &mut Option<Attribute<T>>,
    incoming: Option<T>,
    confidence: f64,
    source_segment: Uuid,
) -> usize {
    let Some(value) = incoming else {
        return 0;
    };
    let incoming = Attribute::new(value, confidence, source_segment);
    match slot {
        Some(existing) => usize::from(existing.merge(incoming)),
        None => {
            *slot = Some(incoming);
            0
        }
    }
}
