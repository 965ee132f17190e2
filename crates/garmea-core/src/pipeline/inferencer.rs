use std::collections::HashSet;

use petgraph::graphmap::DiGraphMap;
use regex::Regex;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::document::Segment;
use crate::person::{PersonMention, RoleHint};
use crate::relationship::{Provenance, RelationKind, Relationship};

/// How a relation keyword binds its surrounding mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// "X fils de Y": the mention before is the child, the one after the
    /// parent; edge runs parent -> child. Supports "et de Z" double parents.
    ChildOfFollowing,
    /// "X père de Y": edge runs from the mention before to the one after.
    BeforeToAfter,
    /// "parrain: X": the named mention relates to the act's principal.
    NamedToPrincipal,
}

struct KeywordRule {
    pattern: Regex,
    kind: RelationKind,
    binding: Binding,
    strength: f64,
}

/// Detects explicitly stated family links around extracted mentions, then
/// derives further edges by closure over the accumulated graph.
pub struct RelationshipInferencer {
    decay: f64,
    max_depth: usize,
    rules: Vec<KeywordRule>,
    conjunction: Regex,
}

impl RelationshipInferencer {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let rule = |pattern: &str, kind, binding, strength| KeywordRule {
            pattern: Regex::new(pattern).unwrap(),
            kind,
            binding,
            strength,
        };

        // Keywords appear both sentence-initial and inline, so all rules
        // match case-insensitively.
        let rules = vec![
            rule(
                r"(?i)\b(?:fils|fille|filz)\s+de\b",
                RelationKind::ParentOf,
                Binding::ChildOfFollowing,
                0.9,
            ),
            rule(
                r"(?i)\b(?:père|mère)\s+de\b",
                RelationKind::ParentOf,
                Binding::BeforeToAfter,
                0.9,
            ),
            rule(
                r"(?i)\b(?:épouse|époux|femme|mari|veuve|veuf)\s+de\b",
                RelationKind::SpouseOf,
                Binding::BeforeToAfter,
                0.85,
            ),
            rule(
                r"(?i)\b(?:frère|sœur|soeur)\s+de\b",
                RelationKind::SiblingOf,
                Binding::BeforeToAfter,
                0.8,
            ),
            rule(
                r"(?i)\b(?:parrain|marraine)\b",
                RelationKind::GodparentOf,
                Binding::NamedToPrincipal,
                0.8,
            ),
            rule(
                r"(?i)\b(?:oncle|tante|cousin|cousine|neveu|nièce)\s+de\b",
                RelationKind::ExtendedFamily,
                Binding::BeforeToAfter,
                0.7,
            ),
        ];

        Self {
            decay: config.inference_decay,
            max_depth: config.max_inference_depth,
            rules,
            conjunction: Regex::new(r"^\s*(?:et|&)\s+(?:de\s+)?$").unwrap(),
        }
    }

    /// Explicit pass over one segment. Edges connect mention ids; confidence
    /// is keyword strength scaled by segment quality.
    #[must_use]
    pub fn infer_explicit(
        &self,
        mentions: &[PersonMention],
        segment: &Segment,
    ) -> Vec<Relationship> {
        let spans = locate_mentions(mentions, &segment.text);
        if spans.is_empty() {
            return Vec::new();
        }

        let principal = mentions
            .iter()
            .position(|m| m.role_hint == Some(RoleHint::Child))
            .unwrap_or(0);

        let mut edges = Vec::new();
        for rule in &self.rules {
            for found in rule.pattern.find_iter(&segment.text) {
                let confidence = rule.strength * segment.quality;
                match rule.binding {
                    Binding::ChildOfFollowing => {
                        let Some(child) = nearest_before(&spans, found.start()) else {
                            continue;
                        };
                        let Some(parent) = nearest_after(&spans, found.end()) else {
                            continue;
                        };
                        self.push_edge(
                            &mut edges,
                            mentions[parent].id,
                            mentions[child].id,
                            rule.kind,
                            confidence,
                            segment.id,
                        );
                        // "fils de X et de Z": bind the second parent too.
                        if let Some(second) = self.conjoined_after(&spans, segment, parent) {
                            self.push_edge(
                                &mut edges,
                                mentions[second].id,
                                mentions[child].id,
                                rule.kind,
                                confidence,
                                segment.id,
                            );
                        }
                    }
                    Binding::BeforeToAfter => {
                        let Some(before) = nearest_before(&spans, found.start()) else {
                            continue;
                        };
                        let Some(after) = nearest_after(&spans, found.end()) else {
                            continue;
                        };
                        self.push_edge(
                            &mut edges,
                            mentions[before].id,
                            mentions[after].id,
                            rule.kind,
                            confidence,
                            segment.id,
                        );
                    }
                    Binding::NamedToPrincipal => {
                        let Some(named) = nearest_after(&spans, found.end()) else {
                            continue;
                        };
                        if named == principal {
                            continue;
                        }
                        self.push_edge(
                            &mut edges,
                            mentions[named].id,
                            mentions[principal].id,
                            rule.kind,
                            confidence,
                            segment.id,
                        );
                    }
                }
            }
        }

        edges
    }

    /// Closure pass over the whole accumulated graph for a run. Existing
    /// edges are the input; only newly derived edges are returned. Derived
    /// confidence is the product of the contributing confidences times the
    /// configured decay, and depth is bounded to guarantee termination on
    /// any mention graph, cyclic ones included. Each derived edge records
    /// the pivot person it was stepped through in `extra`.
    #[must_use]
    pub fn infer_transitive(&self, existing: &[Relationship]) -> Vec<Relationship> {
        let mut parent: DiGraphMap<Uuid, (f64, usize)> = DiGraphMap::new();
        let mut spouse: DiGraphMap<Uuid, (f64, usize)> = DiGraphMap::new();
        let mut known: HashSet<(Uuid, Uuid, RelationKind)> = HashSet::new();

        for rel in existing {
            known.insert(rel.edge_key());
            if rel.kind.is_symmetric() {
                known.insert((rel.to, rel.from, rel.kind));
            }
            match rel.kind {
                RelationKind::ParentOf => {
                    parent.add_edge(rel.from, rel.to, (rel.confidence, rel.provenance.depth()));
                }
                RelationKind::SpouseOf => {
                    spouse.add_edge(rel.from, rel.to, (rel.confidence, rel.provenance.depth()));
                    spouse.add_edge(rel.to, rel.from, (rel.confidence, rel.provenance.depth()));
                }
                _ => {}
            }
        }

        let mut derived = Vec::new();

        for _round in 0..self.max_depth {
            let mut fresh: Vec<(Uuid, Uuid, RelationKind, f64, usize, Uuid)> = Vec::new();

            // parent-of ∘ parent-of => grandparent-of
            for (a, b, &(c1, d1)) in parent.all_edges() {
                for (_, c, &(c2, d2)) in parent.edges(b) {
                    fresh.push((a, c, RelationKind::GrandparentOf, c1 * c2, d1.max(d2) + 1, b));
                }
            }

            // shared parent => sibling-of, one canonical direction
            for p in parent.nodes() {
                let children: Vec<(Uuid, (f64, usize))> =
                    parent.edges(p).map(|(_, c, &w)| (c, w)).collect();
                for (i, &(a, (c1, d1))) in children.iter().enumerate() {
                    for &(b, (c2, d2)) in &children[i + 1..] {
                        let (from, to) = if a < b { (a, b) } else { (b, a) };
                        fresh.push((from, to, RelationKind::SiblingOf, c1 * c2, d1.max(d2) + 1, p));
                    }
                }
            }

            // spouse-of ∘ parent-of => step/in-law qualifier
            for (a, b, &(c1, d1)) in spouse.all_edges() {
                for (_, c, &(c2, d2)) in parent.edges(b) {
                    if known.contains(&(a, c, RelationKind::ParentOf)) {
                        continue;
                    }
                    fresh.push((a, c, RelationKind::StepParentOf, c1 * c2, d1.max(d2) + 1, b));
                }
            }

            fresh.sort_by(|x, y| (x.0, x.1, x.2).cmp(&(y.0, y.1, y.2)));

            let mut added_any = false;
            for (from, to, kind, raw_confidence, depth, via) in fresh {
                if from == to || depth > self.max_depth {
                    continue;
                }
                if known.contains(&(from, to, kind)) {
                    continue;
                }
                known.insert((from, to, kind));
                if kind.is_symmetric() {
                    known.insert((to, from, kind));
                }

                let confidence = (raw_confidence * self.decay).clamp(0.0, 1.0);
                match Relationship::new(from, to, kind) {
                    Ok(rel) => {
                        derived.push(
                            rel.with_confidence(confidence)
                                .with_provenance(Provenance::Inferred { depth })
                                .with_extra(serde_json::json!({ "via": via })),
                        );
                        added_any = true;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping invalid derived relationship: {}", e);
                    }
                }
            }

            if !added_any {
                break;
            }
        }

        derived
    }

    fn push_edge(
        &self,
        edges: &mut Vec<Relationship>,
        from: Uuid,
        to: Uuid,
        kind: RelationKind,
        confidence: f64,
        segment_id: Uuid,
    ) {
        if edges
            .iter()
            .any(|r| r.from == from && r.to == to && r.kind == kind)
        {
            return;
        }
        match Relationship::new(from, to, kind) {
            Ok(rel) => edges.push(
                rel.with_confidence(confidence)
                    .with_provenance(Provenance::Explicit)
                    .with_segment(segment_id),
            ),
            Err(e) => {
                tracing::warn!("Skipping invalid explicit relationship: {}", e);
            }
        }
    }

    /// Index of a mention joined to `after` by "et (de)", if any.
    fn conjoined_after(
        &self,
        spans: &[(usize, usize)],
        segment: &Segment,
        after: usize,
    ) -> Option<usize> {
        let end = spans[after].1;
        let next = nearest_after(spans, end)?;
        let between = segment.text.get(end..spans[next].0)?;
        self.conjunction.is_match(between).then_some(next)
    }
}

/// Recovers each mention's span in the segment text. Mentions arrive in
/// reading order, so a forward scan is enough.
fn locate_mentions(mentions: &[PersonMention], text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::with_capacity(mentions.len());
    let mut cursor = 0;
    for mention in mentions {
        match text[cursor.min(text.len())..].find(&mention.raw_name) {
            Some(offset) => {
                let start = cursor + offset;
                let end = start + mention.raw_name.len();
                spans.push((start, end));
                cursor = end;
            }
            None => {
                tracing::warn!(name = %mention.raw_name, "mention text not found in segment");
                return Vec::new();
            }
        }
    }
    spans
}

fn nearest_before(spans: &[(usize, usize)], position: usize) -> Option<usize> {
    spans
        .iter()
        .enumerate()
        .filter(|(_, &(_, end))| end <= position)
        .max_by_key(|(_, &(_, end))| end)
        .map(|(i, _)| i)
}

fn nearest_after(spans: &[(usize, usize)], position: usize) -> Option<usize> {
    spans
        .iter()
        .enumerate()
        .filter(|(_, &(start, _))| start >= position)
        .min_by_key(|(_, &(start, _))| start)
        .map(|(i, _)| i)
}
