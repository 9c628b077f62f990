//! Empirical preset search
//!
//! Every preset in the strategy's range is tried on a truncated sample and
//! the smallest output wins. The search is exhaustive on purpose: callers
//! rely on the result being the best of everything in range.

use std::fs::File;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{classify, settings_for, ContentCategory};
use crate::codec::{Codec, FilterChain, IntegrityCheck, MAX_PRESET, MIN_PRESET};
use crate::config::MIB;
use crate::error::AdvisorError;
use crate::predict::speed_tier_mbps;
use crate::Strategy;

/// Approximate xz encoder memory per preset 0..=9, in MiB.
const ENCODER_MEMORY_MB: [u64; 10] = [3, 9, 17, 32, 48, 94, 94, 186, 370, 674];

pub fn encoder_memory_mb(preset: u32) -> u64 {
    ENCODER_MEMORY_MB[preset.min(MAX_PRESET) as usize]
}

/// Advisory limits. Only the memory limit has an effect, and only on the
/// upper end of the search range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationLimits {
    pub memory_limit_mb: Option<u64>,
    pub time_limit_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetTrial {
    pub preset: u32,
    /// `None` when the codec failed for this preset.
    pub ratio: Option<f64>,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimal_preset: u32,
    pub optimal_dict_size: Option<u32>,
    pub filters: FilterChain,
    pub estimated_ratio: f64,
    pub estimated_speed_mbps: f64,
    pub estimated_memory_mb: u64,
    pub category: ContentCategory,
    pub trials: Vec<PresetTrial>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterAdjustment {
    pub preset: u32,
    pub filters: FilterChain,
    pub dict_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub tests_run: u32,
    /// Lowest ratio seen across all calls since the last reset.
    pub best_ratio: Option<f64>,
    pub average_trial_seconds: f64,
}

pub struct Optimizer {
    trial_limit: usize,
    check: IntegrityCheck,
    stats: OptimizerStats,
    total_trial_seconds: f64,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(MIB as usize, IntegrityCheck::Crc32)
    }
}

impl Optimizer {
    pub fn new(trial_limit: usize, check: IntegrityCheck) -> Self {
        Self {
            trial_limit: trial_limit.max(1),
            check,
            stats: OptimizerStats::default(),
            total_trial_seconds: 0.0,
        }
    }

    /// Search the strategy's preset range on `sample`. `None` for an empty sample.
    pub fn analyze(
        &mut self,
        codec: &dyn Codec,
        sample: &[u8],
        strategy: Strategy,
        limits: OptimizationLimits,
    ) -> Option<OptimizationResult> {
        let range = bound_by_memory(strategy.preset_range(), limits.memory_limit_mb);
        let result = self.search(codec, sample, range)?;
        if let Some(limit) = limits.time_limit_seconds {
            let spent: f64 = result.trials.iter().map(|t| t.seconds).sum();
            if spent > limit {
                warn!(spent, limit, "preset search exceeded its advisory time limit");
            }
        }
        Some(result)
    }

    /// Search an explicit preset range.
    pub fn find_best_preset(
        &mut self,
        codec: &dyn Codec,
        sample: &[u8],
        min_preset: u32,
        max_preset: u32,
        memory_limit_mb: Option<u64>,
    ) -> Option<OptimizationResult> {
        let min = min_preset.clamp(MIN_PRESET, MAX_PRESET);
        let max = max_preset.clamp(min, MAX_PRESET);
        self.search(codec, sample, bound_by_memory(min..=max, memory_limit_mb))
    }

    /// Read the leading trial sample of a file and analyze it.
    pub fn optimize_file(
        &mut self,
        codec: &dyn Codec,
        path: impl AsRef<Path>,
        strategy: Strategy,
        limits: OptimizationLimits,
    ) -> Result<Option<OptimizationResult>, AdvisorError> {
        let mut sample = Vec::new();
        File::open(path)?
            .take(self.trial_limit as u64)
            .read_to_end(&mut sample)?;
        Ok(self.analyze(codec, &sample, strategy, limits))
    }

    pub fn stats(&self) -> &OptimizerStats {
        &self.stats
    }

    pub fn reset(&mut self) {
        self.stats = OptimizerStats::default();
        self.total_trial_seconds = 0.0;
    }

    fn search(
        &mut self,
        codec: &dyn Codec,
        sample: &[u8],
        range: RangeInclusive<u32>,
    ) -> Option<OptimizationResult> {
        if sample.is_empty() {
            return None;
        }
        let trial_data = &sample[..sample.len().min(self.trial_limit)];
        let category = classify(trial_data);
        let defaults = settings_for(category);

        let mut trials = Vec::with_capacity(range.clone().count());
        let mut best: Option<(u32, f64, f64)> = None;

        for preset in range.clone() {
            let start = Instant::now();
            let encoded = codec.encode(trial_data, preset, &FilterChain::default(), self.check);
            let seconds = start.elapsed().as_secs_f64();
            self.stats.tests_run += 1;
            self.total_trial_seconds += seconds;

            let ratio = match encoded {
                Ok(out) => out.len() as f64 / trial_data.len() as f64,
                Err(err) => {
                    debug!(preset, error = %err, codec = codec.name(), "trial skipped");
                    trials.push(PresetTrial { preset, ratio: None, seconds });
                    continue;
                }
            };
            debug!(preset, ratio, seconds, "trial finished");
            trials.push(PresetTrial {
                preset,
                ratio: Some(ratio),
                seconds,
            });
            if best.map_or(true, |(_, best_ratio, _)| ratio < best_ratio) {
                best = Some((preset, ratio, seconds));
            }
        }
        self.stats.average_trial_seconds = self.total_trial_seconds / self.stats.tests_run.max(1) as f64;

        let (preset, ratio, speed) = match best {
            Some((preset, ratio, seconds)) => {
                let mb = trial_data.len() as f64 / MIB as f64;
                let speed = if seconds > 0.0 {
                    mb / seconds
                } else {
                    speed_tier_mbps(preset)
                };
                (preset, ratio.min(1.0), speed)
            }
            None => {
                warn!(codec = codec.name(), ?range, "every preset trial failed");
                let preset = defaults.preset.clamp(*range.start(), *range.end());
                (preset, 1.0, speed_tier_mbps(preset))
            }
        };

        if best.is_some() && self.stats.best_ratio.map_or(true, |seen| ratio < seen) {
            self.stats.best_ratio = Some(ratio);
        }

        Some(OptimizationResult {
            optimal_preset: preset,
            optimal_dict_size: defaults.dict_size,
            filters: defaults.filters,
            estimated_ratio: ratio,
            estimated_speed_mbps: speed,
            estimated_memory_mb: encoder_memory_mb(preset),
            category,
            trials,
        })
    }
}

/// Cap the upper preset so the encoder fits in `memory_limit_mb`. The lower
/// bound is never raised or dropped.
fn bound_by_memory(range: RangeInclusive<u32>, memory_limit_mb: Option<u64>) -> RangeInclusive<u32> {
    let (min, max) = (*range.start(), *range.end());
    match memory_limit_mb {
        Some(limit) => {
            let capped = (min..=max)
                .rev()
                .find(|&p| encoder_memory_mb(p) <= limit)
                .unwrap_or(min);
            min..=capped
        }
        None => range,
    }
}

/// Pick the category's filter chain and nudge `preset` toward the
/// strategy's bound. No trials are run.
pub fn adjust_filters(sample: &[u8], preset: u32, strategy: Strategy) -> FilterAdjustment {
    let settings = settings_for(classify(sample));
    let preset = match strategy {
        Strategy::Speed => preset.min(4),
        Strategy::Ratio => preset.max(7),
        _ => preset,
    };
    FilterAdjustment {
        preset: preset.clamp(MIN_PRESET, MAX_PRESET),
        filters: settings.filters,
        dict_size: settings.dict_size,
    }
}
