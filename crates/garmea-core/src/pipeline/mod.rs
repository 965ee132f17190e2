//! The extraction pipeline: normalization, act segmentation, mention
//! extraction, relationship inference, person resolution, and the final
//! quality report. Stages are deterministic; given the same inputs and
//! configuration a run produces the same persons and edges regardless of
//! batch sizes or cache state.

pub mod extractor;
pub mod inferencer;
pub mod normalizer;
pub mod registry;
pub mod segmenter;
pub mod validator;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::cache::{fingerprint, CacheValue, PipelineStage, ProcessingCache};
use crate::config::PipelineConfig;
use crate::document::{Document, DocumentInput, DocumentProvider, Segment};
use crate::person::{Person, PersonMention};
use crate::relationship::{RelationKind, Relationship};

pub use extractor::EntityExtractor;
pub use inferencer::RelationshipInferencer;
pub use normalizer::{NormalizedText, TextNormalizer, ValidationError};
pub use registry::PersonRegistry;
pub use segmenter::Segmenter;
pub use validator::{
    QualityBucket, QualityDistribution, QualityReport, QualityValidator, ReportWarning,
    ValidationInput,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] crate::Error),
    #[error("extraction worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A document dropped from the run. Failures are per-document; the run
/// continues with the remaining inputs.
#[derive(Debug)]
pub struct DocumentFailure {
    pub source_ref: String,
    pub error: ValidationError,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub documents: Vec<Document>,
    pub persons: Vec<Person>,
    pub mentions: Vec<PersonMention>,
    pub relationships: Vec<Relationship>,
    pub failures: Vec<DocumentFailure>,
    pub report: QualityReport,
}

pub struct ExtractionPipeline {
    config: PipelineConfig,
    normalizer: TextNormalizer,
    segmenter: Segmenter,
    extractor: Arc<EntityExtractor>,
    inferencer: Arc<RelationshipInferencer>,
    cache: Option<Arc<ProcessingCache>>,
}

impl ExtractionPipeline {
    /// Builds a pipeline after validating the configuration; construction is
    /// the only place configuration errors surface.
    pub fn new(config: PipelineConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: TextNormalizer::new(&config),
            segmenter: Segmenter::new(),
            extractor: Arc::new(EntityExtractor::new(&config)),
            inferencer: Arc::new(RelationshipInferencer::new(&config)),
            cache: None,
            config,
        })
    }

    /// Attaches a shared memoization cache. Optional; runs behave
    /// identically with or without one.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ProcessingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches documents from `provider` and runs [`Self::process`] on them.
    pub async fn process_from(
        &self,
        provider: &dyn DocumentProvider,
    ) -> Result<RunOutput, PipelineError> {
        let inputs = provider.fetch().await?;
        self.process(inputs).await
    }

    /// Runs the full pipeline over `inputs`. Invalid documents are reported
    /// in the output's failures and do not abort the run.
    pub async fn process(&self, inputs: Vec<DocumentInput>) -> Result<RunOutput, PipelineError> {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for input in inputs {
            match self.normalize_cached(&input.text) {
                Ok(normalized) => {
                    let mut document = Document::new(input.source_ref, normalized.text.clone())
                        .with_improvement_ratio(normalized.improvement_ratio);
                    document.segments = self.segment_cached(document.id, &normalized.text);
                    documents.push(document);
                }
                Err(error) => {
                    tracing::warn!(source_ref = %input.source_ref, %error, "skipping document");
                    failures.push(DocumentFailure {
                        source_ref: input.source_ref,
                        error,
                    });
                }
            }
        }

        let (mentions_by_segment, explicit_edges) = self.extract_all(&documents).await?;

        // Resolution walks mentions strictly in document order, in chunks of
        // `mention_batch_size`; per-mention context is only materialized for
        // the chunk being worked on.
        let mut ordered: Vec<&PersonMention> = Vec::new();
        let mut names_by_segment: HashMap<Uuid, Vec<String>> = HashMap::new();
        for document in &documents {
            for segment in &document.segments {
                let Some(segment_mentions) = mentions_by_segment.get(&segment.id) else {
                    continue;
                };
                names_by_segment.insert(
                    segment.id,
                    segment_mentions
                        .iter()
                        .map(|m| m.normalized_name.clone())
                        .collect(),
                );
                ordered.extend(segment_mentions.iter());
            }
        }

        let mut registry = PersonRegistry::new(&self.config);
        let mut owner: HashMap<Uuid, Uuid> = HashMap::new();
        let mut mentions = Vec::with_capacity(ordered.len());
        for batch in ordered.chunks(self.config.mention_batch_size) {
            for mention in batch {
                let context: Vec<String> = names_by_segment
                    .get(&mention.segment_id)
                    .map(|names| {
                        names
                            .iter()
                            .filter(|n| **n != mention.normalized_name)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                let person_id = registry.resolve(mention, &context);
                owner.insert(mention.id, person_id);
                mentions.push((*mention).clone());
            }
            tracing::debug!(resolved = mentions.len(), "resolved mention batch");
        }

        let mut relationships = map_to_person_edges(explicit_edges, &owner);
        let derived = self.inferencer.infer_transitive(&relationships);
        relationships.extend(derived);

        let report = QualityValidator::new().report(&ValidationInput {
            documents: &documents,
            failed_documents: failures.len(),
            mentions: &mentions,
            persons: registry.persons(),
            relationships: &relationships,
            merge_conflicts: registry.merge_conflicts(),
            cache: self.cache.as_ref().map(|c| c.stats()),
        });

        Ok(RunOutput {
            documents,
            persons: registry.into_persons(),
            mentions,
            relationships,
            failures,
            report,
        })
    }

    /// Extracts mentions and explicit edges for every segment, in batches of
    /// `segment_batch_size` concurrent workers. Results are collected in
    /// segment order, so batching never changes the output.
    async fn extract_all(
        &self,
        documents: &[Document],
    ) -> Result<(HashMap<Uuid, Vec<PersonMention>>, Vec<Relationship>), PipelineError> {
        enum Slot {
            Ready(Vec<PersonMention>, Vec<Relationship>),
            Pending(tokio::task::JoinHandle<(Vec<PersonMention>, Vec<Relationship>)>),
        }

        let all_segments: Vec<&Segment> = documents
            .iter()
            .flat_map(|d| d.segments.iter())
            .collect();

        let mut mentions_by_segment = HashMap::new();
        let mut explicit_edges = Vec::new();

        for batch in all_segments.chunks(self.config.segment_batch_size) {
            let mut slots = Vec::with_capacity(batch.len());
            for segment in batch {
                let fp = fingerprint(&segment.text);
                let cached = self.cache.as_ref().and_then(|c| c.get_mentions(fp));
                if let Some(hit) = cached {
                    let (adopted, ids) = adopt_mentions(hit, segment);
                    let edges = self
                        .cache
                        .as_ref()
                        .and_then(|c| c.get_relationships(fp))
                        .and_then(|hit| adopt_relationships(hit, &ids, segment))
                        .unwrap_or_else(|| self.inferencer.infer_explicit(&adopted, segment));
                    slots.push(Slot::Ready(adopted, edges));
                    continue;
                }
                let extractor = Arc::clone(&self.extractor);
                let inferencer = Arc::clone(&self.inferencer);
                let segment = (*segment).clone();
                slots.push(Slot::Pending(tokio::spawn(async move {
                    let mentions = extractor.extract(&segment);
                    let edges = inferencer.infer_explicit(&mentions, &segment);
                    (mentions, edges)
                })));
            }

            for (slot, segment) in slots.into_iter().zip(batch) {
                let (mentions, edges) = match slot {
                    Slot::Ready(mentions, edges) => (mentions, edges),
                    Slot::Pending(handle) => handle.await?,
                };
                if let Some(cache) = &self.cache {
                    let fp = fingerprint(&segment.text);
                    cache.put(PipelineStage::Extract, fp, CacheValue::Mentions(mentions.clone()));
                    cache.put(
                        PipelineStage::Infer,
                        fp,
                        CacheValue::Relationships(edges.clone()),
                    );
                }
                mentions_by_segment.insert(segment.id, mentions);
                explicit_edges.extend(edges);
            }

            if let Some(cache) = &self.cache {
                cache.trim();
            }
        }

        Ok((mentions_by_segment, explicit_edges))
    }

    fn normalize_cached(&self, text: &str) -> Result<NormalizedText, ValidationError> {
        let fp = fingerprint(text);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get_normalized(fp)) {
            return Ok(hit);
        }
        let normalized = self.normalizer.normalize(text)?;
        if let Some(cache) = &self.cache {
            cache.put(
                PipelineStage::Normalize,
                fp,
                CacheValue::Normalized(normalized.clone()),
            );
        }
        Ok(normalized)
    }

    fn segment_cached(&self, document_id: Uuid, text: &str) -> Vec<Segment> {
        let fp = fingerprint(text);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get_segments(fp)) {
            return adopt_segments(hit, document_id);
        }
        let segments = self.segmenter.segment(document_id, text);
        if let Some(cache) = &self.cache {
            cache.put(
                PipelineStage::Segment,
                fp,
                CacheValue::Segments(segments.clone()),
            );
        }
        segments
    }
}

/// Rewrites mention-level edges onto canonical persons. Edges whose
/// endpoints merged into the same person are dropped with a warning;
/// duplicate (from, to, kind) edges collapse keeping the highest confidence
/// and the union of source segments.
fn map_to_person_edges(
    edges: Vec<Relationship>,
    owner: &HashMap<Uuid, Uuid>,
) -> Vec<Relationship> {
    let mut out: Vec<Relationship> = Vec::new();
    let mut index: HashMap<(Uuid, Uuid, RelationKind), usize> = HashMap::new();

    for edge in edges {
        let (Some(&from), Some(&to)) = (owner.get(&edge.from), owner.get(&edge.to)) else {
            tracing::warn!(kind = %edge.kind, "dropping edge with unresolved endpoint");
            continue;
        };
        if from == to {
            tracing::warn!(
                kind = %edge.kind,
                "dropping self-referential edge after person merge"
            );
            continue;
        }

        match index.entry((from, to, edge.kind)) {
            std::collections::hash_map::Entry::Occupied(slot) => {
                let existing = &mut out[*slot.get()];
                if edge.confidence > existing.confidence {
                    existing.confidence = edge.confidence;
                }
                for segment_id in edge.segment_ids {
                    if !existing.segment_ids.contains(&segment_id) {
                        existing.segment_ids.push(segment_id);
                    }
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                match Relationship::new(from, to, edge.kind) {
                    Ok(rel) => {
                        slot.insert(out.len());
                        out.push(
                            rel.with_confidence(edge.confidence)
                                .with_provenance(edge.provenance)
                                .with_segments(edge.segment_ids),
                        );
                    }
                    Err(e) => {
                        tracing::warn!("dropping invalid person edge: {}", e);
                    }
                }
            }
        }
    }

    out
}

fn adopt_segments(cached: Vec<Segment>, document_id: Uuid) -> Vec<Segment> {
    cached
        .into_iter()
        .map(|s| Segment::new(document_id, s.text, s.start, s.end, s.quality))
        .collect()
}

/// Cached mentions belong to another run of the same text; give them fresh
/// identities tied to the current segment. The returned map records old id
/// to new id so cached edges can be rebound the same way.
fn adopt_mentions(
    cached: Vec<PersonMention>,
    segment: &Segment,
) -> (Vec<PersonMention>, HashMap<Uuid, Uuid>) {
    let mut ids = HashMap::with_capacity(cached.len());
    let adopted = cached
        .into_iter()
        .map(|mut m| {
            let previous = m.id;
            m.id = Uuid::now_v7();
            m.segment_id = segment.id;
            m.document_id = segment.document_id;
            ids.insert(previous, m.id);
            m
        })
        .collect();
    (adopted, ids)
}

/// Rebinds cached explicit edges onto the adopted mentions. An endpoint the
/// adoption map does not know makes the whole entry unusable; the caller
/// then recomputes inference from the adopted mentions.
fn adopt_relationships(
    cached: Vec<Relationship>,
    ids: &HashMap<Uuid, Uuid>,
    segment: &Segment,
) -> Option<Vec<Relationship>> {
    let mut out = Vec::with_capacity(cached.len());
    for edge in cached {
        let (&from, &to) = (ids.get(&edge.from)?, ids.get(&edge.to)?);
        let adopted = Relationship::new(from, to, edge.kind)
            .ok()?
            .with_confidence(edge.confidence)
            .with_provenance(edge.provenance)
            .with_segment(segment.id);
        out.push(adopted);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::RoleHint;

    #[test]
    fn test_duplicate_person_edges_collapse() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (ma, mb, mc) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let owner: HashMap<Uuid, Uuid> = [(ma, a), (mb, b), (mc, a)].into_iter().collect();

        let seg = Uuid::now_v7();
        let edges = vec![
            Relationship::new(ma, mb, RelationKind::ParentOf)
                .unwrap()
                .with_confidence(0.6)
                .with_segment(seg),
            Relationship::new(mc, mb, RelationKind::ParentOf)
                .unwrap()
                .with_confidence(0.8),
        ];

        let mapped = map_to_person_edges(edges, &owner);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].from, a);
        assert_eq!(mapped[0].to, b);
        assert!((mapped[0].confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(mapped[0].segment_ids, vec![seg]);
    }

    #[test]
    fn test_merged_endpoints_drop_edge() {
        let p = Uuid::now_v7();
        let (ma, mb) = (Uuid::now_v7(), Uuid::now_v7());
        let owner: HashMap<Uuid, Uuid> = [(ma, p), (mb, p)].into_iter().collect();

        let edges = vec![Relationship::new(ma, mb, RelationKind::SpouseOf).unwrap()];
        assert!(map_to_person_edges(edges, &owner).is_empty());
    }

    #[test]
    fn test_adopt_mentions_rebinds_identity() {
        let seg = Segment::new(Uuid::now_v7(), "texte".into(), 0, 5, 0.8);
        let original = PersonMention::new(Uuid::now_v7(), Uuid::now_v7(), "Jean".into(), 0.8)
            .with_role_hint(RoleHint::Child);

        let (adopted, ids) = adopt_mentions(vec![original.clone()], &seg);
        assert_eq!(adopted.len(), 1);
        assert_ne!(adopted[0].id, original.id);
        assert_eq!(adopted[0].segment_id, seg.id);
        assert_eq!(adopted[0].role_hint, Some(RoleHint::Child));
        assert_eq!(adopted[0].raw_name, original.raw_name);
        assert_eq!(ids.get(&original.id), Some(&adopted[0].id));
    }

    #[test]
    fn test_adopt_relationships_rebinds_endpoints() {
        let seg = Segment::new(Uuid::now_v7(), "texte".into(), 0, 5, 0.8);
        let (old_a, old_b) = (Uuid::now_v7(), Uuid::now_v7());
        let (new_a, new_b) = (Uuid::now_v7(), Uuid::now_v7());
        let ids: HashMap<Uuid, Uuid> = [(old_a, new_a), (old_b, new_b)].into_iter().collect();

        let cached = vec![Relationship::new(old_a, old_b, RelationKind::ParentOf)
            .unwrap()
            .with_confidence(0.72)
            .with_segment(Uuid::now_v7())];

        let adopted = adopt_relationships(cached, &ids, &seg).expect("rebound edges");
        assert_eq!(adopted.len(), 1);
        assert_eq!(adopted[0].from, new_a);
        assert_eq!(adopted[0].to, new_b);
        assert_eq!(adopted[0].segment_ids, vec![seg.id]);
        assert!((adopted[0].confidence - 0.72).abs() < f64::EPSILON);
    }

    #[test]
    fn test_adopt_relationships_rejects_unknown_endpoint() {
        let seg = Segment::new(Uuid::now_v7(), "texte".into(), 0, 5, 0.8);
        let cached =
            vec![Relationship::new(Uuid::now_v7(), Uuid::now_v7(), RelationKind::SpouseOf).unwrap()];

        assert!(adopt_relationships(cached, &HashMap::new(), &seg).is_none());
    }
}
