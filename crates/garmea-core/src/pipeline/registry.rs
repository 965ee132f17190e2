use std::collections::{HashMap, HashSet};

use strsim::jaro_winkler;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::person::{normalize_name, Person, PersonMention};

const PERIOD_BONUS: f64 = 0.10;
const PERIOD_PENALTY: f64 = 0.30;
const PLACE_BONUS: f64 = 0.05;
const PLACE_PENALTY: f64 = 0.10;
const ASSOCIATE_BONUS: f64 = 0.05;

/// Given names weigh more than surnames; whole households share a surname,
/// so "Anne Dupont" must not score close to "Jean Dupont".
const GIVEN_WEIGHT: f64 = 0.6;
const SURNAME_WEIGHT: f64 = 0.4;

/// Years this far apart still count as the same event; register copies often
/// disagree by a year or two.
const YEAR_TOLERANCE: i32 = 2;

/// Resolves mentions to canonical persons across the whole run. Matching
/// starts from name similarity and is adjusted by corroborating or
/// contradicting evidence; candidates are scanned in creation order and ties
/// keep the earliest match, so resolution is deterministic for a given
/// mention order.
pub struct PersonRegistry {
    merge_threshold: f64,
    persons: Vec<Person>,
    index: HashMap<Uuid, usize>,
    mention_owner: HashMap<Uuid, Uuid>,
    associates: HashMap<Uuid, HashSet<String>>,
    merge_conflicts: u64,
}

impl PersonRegistry {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            merge_threshold: config.merge_threshold,
            persons: Vec::new(),
            index: HashMap::new(),
            mention_owner: HashMap::new(),
            associates: HashMap::new(),
            merge_conflicts: 0,
        }
    }

    /// Attaches `mention` to an existing person or creates a new one, and
    /// returns the owning person's id. `context` carries the normalized
    /// names co-occurring in the mention's segment; shared associates count
    /// as corroborating evidence. Each mention ends up owned by exactly one
    /// person.
    pub fn resolve(&mut self, mention: &PersonMention, context: &[String]) -> Uuid {
        if let Some(&owner) = self.mention_owner.get(&mention.id) {
            return owner;
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, person) in self.persons.iter().enumerate() {
            let score = self.score(person, mention, context);
            if score >= self.merge_threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let person_id = match best {
            Some((i, score)) => {
                let person = &mut self.persons[i];
                tracing::debug!(
                    person = %person.canonical_name,
                    mention = %mention.raw_name,
                    score,
                    "merging mention into existing person"
                );
                let conflicts = person.absorb(mention);
                if conflicts > 0 {
                    self.merge_conflicts += conflicts as u64;
                    tracing::warn!(
                        person = %person.canonical_name,
                        conflicts,
                        "attribute conflicts resolved during merge"
                    );
                }
                person.id
            }
            None => {
                let person = Person::from_mention(mention);
                let id = person.id;
                self.index.insert(id, self.persons.len());
                self.persons.push(person);
                id
            }
        };

        self.mention_owner.insert(mention.id, person_id);
        let known = self.associates.entry(person_id).or_default();
        for name in context {
            if *name != mention.normalized_name {
                known.insert(name.clone());
            }
        }
        person_id
    }

    fn score(&self, person: &Person, mention: &PersonMention, context: &[String]) -> f64 {
        let similarity = person
            .name_variants
            .iter()
            .map(|v| name_similarity(&normalize_name(v), &mention.normalized_name))
            .fold(0.0_f64, f64::max);

        let mut score = similarity;
        score += year_adjustment(
            person.birth_year.as_ref().map(|a| a.value),
            mention.birth_year,
        );
        score += year_adjustment(
            person.death_year.as_ref().map(|a| a.value),
            mention.death_year,
        );

        if let (Some(known), Some(seen)) = (person.place.as_ref(), mention.place.as_ref()) {
            if normalize_name(&known.value) == normalize_name(seen) {
                score += PLACE_BONUS;
            } else {
                score -= PLACE_PENALTY;
            }
        }

        if let Some(known) = self.associates.get(&person.id) {
            if context.iter().any(|name| known.contains(name)) {
                score += ASSOCIATE_BONUS;
            }
        }

        score.clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn owner_of(&self, mention_id: Uuid) -> Option<Uuid> {
        self.mention_owner.get(&mention_id).copied()
    }

    #[must_use]
    pub fn get(&self, person_id: Uuid) -> Option<&Person> {
        self.index.get(&person_id).map(|&i| &self.persons[i])
    }

    #[must_use]
    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    #[must_use]
    pub fn into_persons(self) -> Vec<Person> {
        self.persons
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    /// Attribute conflicts resolved across all merges so far.
    #[must_use]
    pub fn merge_conflicts(&self) -> u64 {
        self.merge_conflicts
    }
}

/// Similarity of two normalized names, comparing the leading given name and
/// the remainder separately. A bare given name only matches another bare
/// given name at full strength; it never scores high against "given surname"
/// forms, which keeps lone child names from attaching to whoever shares the
/// first name.
fn name_similarity(a: &str, b: &str) -> f64 {
    let (a_given, a_rest) = split_first(a);
    let (b_given, b_rest) = split_first(b);
    match (a_rest.is_empty(), b_rest.is_empty()) {
        (true, true) => jaro_winkler(a_given, b_given),
        (false, false) => {
            GIVEN_WEIGHT * jaro_winkler(a_given, b_given)
                + SURNAME_WEIGHT * jaro_winkler(a_rest, b_rest)
        }
        _ => GIVEN_WEIGHT * jaro_winkler(a_given, b_given),
    }
}

fn split_first(name: &str) -> (&str, &str) {
    match name.split_once(' ') {
        Some((first, rest)) => (first, rest),
        None => (name, ""),
    }
}

fn year_adjustment(known: Option<i32>, seen: Option<i32>) -> f64 {
    match (known, seen) {
        (Some(a), Some(b)) if (a - b).abs() <= YEAR_TOLERANCE => PERIOD_BONUS,
        (Some(_), Some(_)) => -PERIOD_PENALTY,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PersonRegistry {
        PersonRegistry::new(&PipelineConfig::default())
    }

    fn mention(name: &str) -> PersonMention {
        PersonMention::new(Uuid::now_v7(), Uuid::now_v7(), name.into(), 0.8)
    }

    #[test]
    fn test_same_name_across_documents_merges() {
        let mut r = registry();
        let a = mention("Jean Dupont").with_birth_year(1687);
        let b = mention("Jean Dupont").with_birth_year(1687);

        let pa = r.resolve(&a, &[]);
        let pb = r.resolve(&b, &[]);

        assert_eq!(pa, pb);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(pa).map(|p| p.mention_ids.len()), Some(2));
    }

    #[test]
    fn test_spelling_variant_merges() {
        let mut r = registry();
        let pa = r.resolve(&mention("Jean Dupont"), &[]);
        let pb = r.resolve(&mention("Jean Dupond"), &[]);

        assert_eq!(pa, pb);
        let person = r.get(pa).expect("person");
        assert!(person.name_variants.contains(&"Jean Dupond".to_string()));
    }

    #[test]
    fn test_shared_surname_does_not_merge() {
        let mut r = registry();
        let pa = r.resolve(&mention("Jean Dupont"), &[]);
        let pb = r.resolve(&mention("Anne Dupont"), &[]);

        assert_ne!(pa, pb);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_bare_given_name_does_not_merge_into_full_name() {
        let mut r = registry();
        let pa = r.resolve(&mention("Jean Dupont"), &[]);
        let pb = r.resolve(&mention("Jean"), &[]);

        assert_ne!(pa, pb);
    }

    #[test]
    fn test_distinct_names_stay_separate() {
        let mut r = registry();
        let pa = r.resolve(&mention("Pierre Dupont"), &[]);
        let pb = r.resolve(&mention("Marie Lefèvre"), &[]);

        assert_ne!(pa, pb);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_conflicting_birth_years_block_merge() {
        let mut r = registry();
        let pa = r.resolve(&mention("Jean Dupont").with_birth_year(1610), &[]);
        let pb = r.resolve(&mention("Jean Dupont").with_birth_year(1687), &[]);

        assert_ne!(pa, pb);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_near_year_merge_counts_conflict() {
        let mut r = registry();
        let pa = r.resolve(&mention("Jean Dupont").with_birth_year(1687), &[]);
        let pb = r.resolve(&mention("Jean Dupont").with_birth_year(1688), &[]);

        assert_eq!(pa, pb);
        assert_eq!(r.merge_conflicts(), 1);
    }

    #[test]
    fn test_each_mention_owned_exactly_once() {
        let mut r = registry();
        let mentions = vec![
            mention("Jean Dupont"),
            mention("Jean Dupont"),
            mention("Marie Lefèvre"),
        ];
        for m in &mentions {
            r.resolve(m, &[]);
        }

        for m in &mentions {
            let owner = r.owner_of(m.id).expect("owner");
            let person = r.get(owner).expect("person");
            assert!(person.mention_ids.contains(&m.id));
        }
        let total: usize = r.persons().iter().map(|p| p.mention_ids.len()).sum();
        assert_eq!(total, mentions.len());
    }

    #[test]
    fn test_resolving_same_mention_twice_is_stable() {
        let mut r = registry();
        let m = mention("Charles Le Boucher");
        let first = r.resolve(&m, &[]);
        let second = r.resolve(&m, &[]);

        assert_eq!(first, second);
        assert_eq!(r.get(first).map(|p| p.mention_ids.len()), Some(1));
    }

    #[test]
    fn test_low_confidence_cleared_by_strong_mention() {
        let mut r = registry();
        let weak =
            PersonMention::new(Uuid::now_v7(), Uuid::now_v7(), "Jean Dupont".into(), 0.3)
                .flagged_low_confidence(0.4);
        assert!(weak.low_confidence);

        let pa = r.resolve(&weak, &[]);
        assert!(r.get(pa).expect("person").low_confidence);

        let strong = mention("Jean Dupont");
        let pb = r.resolve(&strong, &[]);
        assert_eq!(pa, pb);
        assert!(!r.get(pa).expect("person").low_confidence);
    }
}
