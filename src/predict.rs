//! Ratio, time and memory prediction without invoking a codec
//!
//! The estimate starts from the sample's Shannon entropy, is scaled by how
//! well the detected content category usually compresses, then by the
//! requested strategy.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{classify, ContentCategory};
use crate::config::MIB;
use crate::entropy::shannon_entropy;
use crate::error::AdvisorError;
use crate::Strategy;

const MIN_BASE_RATIO: f64 = 0.1;
const MAX_RATIO: f64 = 0.95;
const MIN_MEMORY_MB: u64 = 64;
const MAX_MEMORY_MB: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_ratio: f64,
    pub confidence: f64,
    pub estimated_output_size: u64,
    pub recommended_preset: u32,
    pub estimated_time_seconds: f64,
    pub estimated_memory_mb: u64,
    pub entropy_bits: f64,
    pub category: ContentCategory,
}

pub(crate) fn category_factor(category: ContentCategory) -> f64 {
    match category {
        ContentCategory::Text => 0.85,
        ContentCategory::Executable => 0.70,
        ContentCategory::Image => 0.95,
        ContentCategory::Archive => 0.90,
        _ => 1.0,
    }
}

/// Ratio multiplier and preset for a strategy.
fn strategy_adjustment(strategy: Strategy) -> (f64, u32) {
    match strategy {
        Strategy::Speed => (0.90, 3),
        Strategy::Ratio => (1.05, 8),
        Strategy::MemoryEfficient => (0.92, 5),
        Strategy::Balanced | Strategy::Auto | Strategy::Custom => (1.0, 6),
    }
}

/// Throughput tier assumed for a preset, in MB/s.
pub(crate) fn speed_tier_mbps(preset: u32) -> f64 {
    match preset {
        0..=3 => 30.0,
        4..=6 => 15.0,
        _ => 5.0,
    }
}

#[derive(Debug, Clone)]
pub struct Predictor {
    sample_limit: usize,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(MIB as usize)
    }
}

impl Predictor {
    pub fn new(sample_limit: usize) -> Self {
        Self {
            sample_limit: sample_limit.max(1),
        }
    }

    /// Predict for an in-memory buffer. `None` for an empty buffer.
    pub fn predict(&self, data: &[u8], strategy: Strategy) -> Option<Prediction> {
        let sample = &data[..data.len().min(self.sample_limit)];
        self.estimate(sample, data.len() as u64, strategy)
    }

    /// Predict for a file, reading only its leading sample.
    /// `Ok(None)` for an empty file.
    pub fn predict_file(
        &self,
        path: impl AsRef<Path>,
        strategy: Strategy,
    ) -> Result<Option<Prediction>, AdvisorError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut sample = Vec::with_capacity(self.sample_limit.min(file_size as usize));
        file.take(self.sample_limit as u64).read_to_end(&mut sample)?;
        debug!(path = %path.display(), file_size, sampled = sample.len(), "predicting from file sample");

        Ok(self.estimate(&sample, file_size.max(sample.len() as u64), strategy))
    }

    /// `sample` is the leading part of an input of `total_size` bytes.
    fn estimate(&self, sample: &[u8], total_size: u64, strategy: Strategy) -> Option<Prediction> {
        if sample.is_empty() || total_size == 0 {
            return None;
        }

        let entropy = shannon_entropy(sample);
        let category = classify(sample);

        let mut ratio = (1.0 - entropy / 8.0).clamp(MIN_BASE_RATIO, MAX_RATIO);
        ratio *= category_factor(category);
        let (factor, preset) = strategy_adjustment(strategy);
        ratio = (ratio * factor).min(MAX_RATIO);

        let confidence = if sample.len() as u64 >= total_size {
            0.95
        } else {
            0.70 + 0.25 * (sample.len() as f64 / total_size as f64)
        };

        let size_mb = total_size as f64 / MIB as f64;
        let estimated_memory_mb =
            ((size_mb * 2.0 * preset as f64) as u64).clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);

        Some(Prediction {
            predicted_ratio: ratio,
            confidence,
            estimated_output_size: (total_size as f64 * ratio) as u64,
            recommended_preset: preset,
            estimated_time_seconds: size_mb / speed_tier_mbps(preset),
            estimated_memory_mb,
            entropy_bits: entropy,
            category,
        })
    }
}
