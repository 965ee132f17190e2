use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supplies raw documents to the pipeline. Implementations own the reading
/// side (files, archives, a scanning service); the pipeline only sees the
/// handoff type.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn fetch(&self) -> crate::Result<Vec<DocumentInput>>;
}

/// One unit of raw text handed over by the document-reader collaborator,
/// typically a page or a bundle of acts with a stable source reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub source_ref: String,
    pub text: String,
}

impl DocumentInput {
    #[must_use]
    pub fn new(source_ref: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_ref: String,
    /// Normalized text; segment offsets index into this.
    pub text: String,
    pub improvement_ratio: f64,
    pub segments: Vec<Segment>,
}

impl Document {
    #[must_use]
    pub fn new(source_ref: String, text: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_ref,
            text,
            improvement_ratio: 0.0,
            segments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_improvement_ratio(mut self, ratio: f64) -> Self {
        self.improvement_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }
}

/// A contiguous span of normalized text believed to hold one act. Read-only
/// once produced by the segmenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub quality: f64,
}

impl Segment {
    #[must_use]
    pub fn new(document_id: Uuid, text: String, start: usize, end: usize, quality: f64) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id,
            text,
            start,
            end,
            quality: quality.clamp(0.0, 1.0),
        }
    }
}
