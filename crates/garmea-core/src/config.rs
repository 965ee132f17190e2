use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported source period. Records outside this range use conventions the
/// extraction rules are not tuned for.
pub const PERIOD_MIN_YEAR: i32 = 1540;
pub const PERIOD_MAX_YEAR: i32 = 1789;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodHint {
    pub start_year: i32,
    pub end_year: i32,
}

impl PeriodHint {
    pub fn new(start_year: i32, end_year: i32) -> Result<Self> {
        if start_year > end_year {
            return Err(Error::InvalidConfig(format!(
                "period start {start_year} is after end {end_year}"
            )));
        }
        if start_year < PERIOD_MIN_YEAR || end_year > PERIOD_MAX_YEAR {
            return Err(Error::InvalidConfig(format!(
                "period {start_year}-{end_year} outside supported range \
                 {PERIOD_MIN_YEAR}-{PERIOD_MAX_YEAR}"
            )));
        }
        Ok(Self {
            start_year,
            end_year,
        })
    }

    #[must_use]
    pub fn contains(&self, year: i32) -> bool {
        year >= self.start_year && year <= self.end_year
    }
}

impl Default for PeriodHint {
    fn default() -> Self {
        Self {
            start_year: PERIOD_MIN_YEAR,
            end_year: PERIOD_MAX_YEAR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub period: PeriodHint,
    pub max_text_len: usize,
    pub segment_batch_size: usize,
    pub mention_batch_size: usize,
    pub merge_threshold: f64,
    pub inference_decay: f64,
    pub max_inference_depth: usize,
    pub cache_max_entries: usize,
    pub min_name_confidence: f64,
    pub min_date_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            period: PeriodHint::default(),
            max_text_len: 1_000_000,
            segment_batch_size: 50,
            mention_batch_size: 50,
            merge_threshold: 0.82,
            inference_decay: 0.85,
            max_inference_depth: 3,
            cache_max_entries: 1024,
            min_name_confidence: 0.40,
            min_date_confidence: 0.50,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_period(mut self, period: PeriodHint) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_segment_batch_size(mut self, size: usize) -> Self {
        self.segment_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_mention_batch_size(mut self, size: usize) -> Self {
        self.mention_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_merge_threshold(mut self, threshold: f64) -> Self {
        self.merge_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_inference_decay(mut self, decay: f64) -> Self {
        self.inference_decay = decay;
        self
    }

    #[must_use]
    pub fn with_max_inference_depth(mut self, depth: usize) -> Self {
        self.max_inference_depth = depth;
        self
    }

    #[must_use]
    pub fn with_cache_max_entries(mut self, entries: usize) -> Self {
        self.cache_max_entries = entries;
        self
    }

    #[must_use]
    pub fn with_min_name_confidence(mut self, confidence: f64) -> Self {
        self.min_name_confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_min_date_confidence(mut self, confidence: f64) -> Self {
        self.min_date_confidence = confidence;
        self
    }

    /// Validates the whole configuration once, at pipeline construction.
    pub fn validate(&self) -> Result<()> {
        PeriodHint::new(self.period.start_year, self.period.end_year)?;

        if self.max_text_len == 0 {
            return Err(Error::InvalidConfig("max_text_len must be non-zero".into()));
        }
        if self.segment_batch_size == 0 || self.mention_batch_size == 0 {
            return Err(Error::InvalidConfig("batch sizes must be non-zero".into()));
        }
        if self.cache_max_entries == 0 {
            return Err(Error::InvalidConfig(
                "cache_max_entries must be non-zero".into(),
            ));
        }
        if self.max_inference_depth == 0 {
            return Err(Error::InvalidConfig(
                "max_inference_depth must be non-zero".into(),
            ));
        }

        for (name, value) in [
            ("merge_threshold", self.merge_threshold),
            ("inference_decay", self.inference_decay),
            ("min_name_confidence", self.min_name_confidence),
            ("min_date_confidence", self.min_date_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(Error::InvalidConfig(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }

        Ok(())
    }
}
