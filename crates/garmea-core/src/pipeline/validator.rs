use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::document::Document;
use crate::person::{Person, PersonMention};
use crate::relationship::{RelationKind, Relationship};

const EXCELLENT_MIN: f64 = 0.8;
const GOOD_MIN: f64 = 0.6;
const FAIR_MIN: f64 = 0.4;

/// Mean improvement ratio above which the source scans are probably degraded
/// enough to distort extraction.
const OCR_RATIO_THRESHOLD: f64 = 0.15;

/// Share of poor segments above which the run should be reviewed by hand.
const POOR_SHARE_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityBucket {
    #[must_use]
    pub fn of(score: f64) -> Self {
        if score >= EXCELLENT_MIN {
            Self::Excellent
        } else if score >= GOOD_MIN {
            Self::Good
        } else if score >= FAIR_MIN {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityDistribution {
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
}

impl QualityDistribution {
    pub fn record(&mut self, score: f64) {
        match QualityBucket::of(score) {
            QualityBucket::Excellent => self.excellent += 1,
            QualityBucket::Good => self.good += 1,
            QualityBucket::Fair => self.fair += 1,
            QualityBucket::Poor => self.poor += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.excellent + self.good + self.fair + self.poor
    }

    #[must_use]
    pub fn poor_share(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.poor as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReportWarning {
    /// The normalizer had to rewrite an unusually large share of tokens.
    DegradedSource { mean_improvement_ratio: f64 },
    /// Too many segments lack the structure the extractor relies on.
    ManualReviewAdvised { poor_share: f64 },
    /// Pairs of persons linked by more than one relation kind.
    AmbiguousRelationships { pairs: usize },
}

impl std::fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegradedSource {
                mean_improvement_ratio,
            } => write!(
                f,
                "source OCR appears degraded (mean improvement ratio {mean_improvement_ratio:.3})"
            ),
            Self::ManualReviewAdvised { poor_share } => write!(
                f,
                "{:.0}% of segments are poor quality; manual review advised",
                poor_share * 100.0
            ),
            Self::AmbiguousRelationships { pairs } => {
                write!(f, "{pairs} person pairs carry conflicting relation kinds")
            }
        }
    }
}

/// End-of-run summary: counts, quality distributions over segments,
/// mentions and relationships, and the warnings a reviewer should act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub documents: usize,
    pub failed_documents: usize,
    pub segments: usize,
    pub mentions: usize,
    pub low_confidence_mentions: usize,
    pub persons: usize,
    pub low_confidence_persons: usize,
    pub explicit_relationships: usize,
    pub inferred_relationships: usize,
    pub ambiguous_pairs: usize,
    pub merge_conflicts: u64,
    pub mean_improvement_ratio: f64,
    pub segment_quality: QualityDistribution,
    pub mention_confidence: QualityDistribution,
    pub relationship_confidence: QualityDistribution,
    pub warnings: Vec<ReportWarning>,
    pub cache: Option<CacheStats>,
}

/// Everything the validator needs to describe one finished run.
pub struct ValidationInput<'a> {
    pub documents: &'a [Document],
    pub failed_documents: usize,
    pub mentions: &'a [PersonMention],
    pub persons: &'a [Person],
    pub relationships: &'a [Relationship],
    pub merge_conflicts: u64,
    pub cache: Option<CacheStats>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityValidator;

impl QualityValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Purely advisory; never mutates anything it reads.
    #[must_use]
    pub fn report(&self, input: &ValidationInput<'_>) -> QualityReport {
        let mut segment_quality = QualityDistribution::default();
        let mut segments = 0usize;
        let mut ratio_sum = 0.0;
        for document in input.documents {
            ratio_sum += document.improvement_ratio;
            for segment in &document.segments {
                segments += 1;
                segment_quality.record(segment.quality);
            }
        }
        let mean_improvement_ratio = if input.documents.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                ratio_sum / input.documents.len() as f64
            }
        };

        let mut mention_confidence = QualityDistribution::default();
        for mention in input.mentions {
            mention_confidence.record(mention.confidence);
        }
        let mut relationship_confidence = QualityDistribution::default();
        for rel in input.relationships {
            relationship_confidence.record(rel.confidence);
        }

        let explicit_relationships = input
            .relationships
            .iter()
            .filter(|r| !r.provenance.is_inferred())
            .count();
        let ambiguous_pairs = count_ambiguous_pairs(input.relationships);

        let mut warnings = Vec::new();
        if mean_improvement_ratio > OCR_RATIO_THRESHOLD {
            warnings.push(ReportWarning::DegradedSource {
                mean_improvement_ratio,
            });
        }
        if segments > 0 && segment_quality.poor_share() > POOR_SHARE_THRESHOLD {
            warnings.push(ReportWarning::ManualReviewAdvised {
                poor_share: segment_quality.poor_share(),
            });
        }
        if ambiguous_pairs > 0 {
            warnings.push(ReportWarning::AmbiguousRelationships {
                pairs: ambiguous_pairs,
            });
        }
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        QualityReport {
            documents: input.documents.len(),
            failed_documents: input.failed_documents,
            segments,
            mentions: input.mentions.len(),
            low_confidence_mentions: input
                .mentions
                .iter()
                .filter(|m| m.low_confidence)
                .count(),
            persons: input.persons.len(),
            low_confidence_persons: input.persons.iter().filter(|p| p.low_confidence).count(),
            explicit_relationships,
            inferred_relationships: input.relationships.len() - explicit_relationships,
            ambiguous_pairs,
            merge_conflicts: input.merge_conflicts,
            mean_improvement_ratio,
            segment_quality,
            mention_confidence,
            relationship_confidence,
            warnings,
            cache: input.cache.clone(),
        }
    }
}

/// Unordered person pairs linked by more than one relation kind. These edges
/// are kept, not resolved; the report only surfaces them.
fn count_ambiguous_pairs(relationships: &[Relationship]) -> usize {
    let mut kinds_by_pair: HashMap<(Uuid, Uuid), HashSet<RelationKind>> = HashMap::new();
    for rel in relationships {
        let pair = if rel.from < rel.to {
            (rel.from, rel.to)
        } else {
            (rel.to, rel.from)
        };
        kinds_by_pair.entry(pair).or_default().insert(rel.kind);
    }
    kinds_by_pair.values().filter(|k| k.len() > 1).count()
}
