use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    // Stated directly in acts
    ParentOf,
    SpouseOf,
    SiblingOf,
    GodparentOf,

    // Derived by closure
    GrandparentOf,
    StepParentOf,

    // Oncle/tante/cousin/nièce and other loose kinship wording
    ExtendedFamily,
}

impl RelationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentOf => "parent_of",
            Self::SpouseOf => "spouse_of",
            Self::SiblingOf => "sibling_of",
            Self::GodparentOf => "godparent_of",
            Self::GrandparentOf => "grandparent_of",
            Self::StepParentOf => "step_parent_of",
            Self::ExtendedFamily => "extended_family",
        }
    }

    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::SpouseOf | Self::SiblingOf | Self::ExtendedFamily)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent_of" => Ok(Self::ParentOf),
            "spouse_of" => Ok(Self::SpouseOf),
            "sibling_of" => Ok(Self::SiblingOf),
            "godparent_of" => Ok(Self::GodparentOf),
            "grandparent_of" => Ok(Self::GrandparentOf),
            "step_parent_of" => Ok(Self::StepParentOf),
            "extended_family" => Ok(Self::ExtendedFamily),
            _ => Err(crate::Error::InvalidRelationKind(s.to_string())),
        }
    }
}

/// How an edge came to exist: stated in the text, or derived by closure
/// rules over existing edges (depth = number of derivation steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Explicit,
    Inferred { depth: usize },
}

impl Provenance {
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Explicit => 0,
            Self::Inferred { depth } => *depth,
        }
    }

    #[must_use]
    pub fn is_inferred(&self) -> bool {
        matches!(self, Self::Inferred { .. })
    }
}

/// Directed typed edge between two mentions (inferencer output) or two
/// canonical persons (after registry mapping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub kind: RelationKind,
    pub confidence: f64,
    pub provenance: Provenance,
    pub segment_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Free-form annotations; the closure pass records the pivot person of
    /// a derived edge here.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl Relationship {
    pub fn new(from: Uuid, to: Uuid, kind: RelationKind) -> crate::Result<Self> {
        if from == to {
            return Err(crate::Error::SelfReference);
        }

        Ok(Self {
            id: Uuid::now_v7(),
            from,
            to,
            kind,
            confidence: 1.0,
            provenance: Provenance::Explicit,
            segment_ids: Vec::new(),
            created_at: Utc::now(),
            extra: serde_json::Value::Null,
        })
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    #[must_use]
    pub fn with_segment(mut self, segment_id: Uuid) -> Self {
        self.segment_ids.push(segment_id);
        self
    }

    #[must_use]
    pub fn with_segments(mut self, segment_ids: Vec<Uuid>) -> Self {
        self.segment_ids = segment_ids;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    /// Stable identity of an edge regardless of how it was produced.
    #[must_use]
    pub fn edge_key(&self) -> (Uuid, Uuid, RelationKind) {
        (self.from, self.to, self.kind)
    }
}
