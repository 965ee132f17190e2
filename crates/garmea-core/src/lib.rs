pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod person;
pub mod pipeline;
pub mod relationship;

pub use cache::{fingerprint, CacheStats, CacheValue, PipelineStage, ProcessingCache};
pub use config::{PeriodHint, PipelineConfig, PERIOD_MAX_YEAR, PERIOD_MIN_YEAR};
pub use document::{Document, DocumentInput, DocumentProvider, Segment};
pub use error::{Error, Result};
pub use person::{normalize_name, Attribute, Person, PersonMention, RoleHint};
pub use pipeline::{
    DocumentFailure, EntityExtractor, ExtractionPipeline, NormalizedText, PersonRegistry,
    PipelineError, QualityBucket, QualityReport, QualityValidator, RelationshipInferencer,
    ReportWarning, RunOutput, Segmenter, TextNormalizer, ValidationError,
};
pub use relationship::{Provenance, RelationKind, Relationship};
