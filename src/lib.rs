//! compress-advisor: prediction, tuning and recovery around an xz-style codec.
//!
//! Pieces:
//! - Content classification and Shannon entropy estimation
//! - Ratio/time/memory prediction without running the codec
//! - Trial-based preset search against a real codec
//! - Thread and block sizing for the codec's multithreaded mode
//! - Corruption recovery, stream verification and repair
//! - Last-measurement analytics and strategy-weighted quality grades
//!
//! All session state lives in caller-owned values; [`Advisor`] bundles them
//! behind one facade.

pub mod analytics;
pub mod classify;
pub mod codec;
pub mod config;
pub mod deflate;
pub mod entropy;
pub mod error;
pub mod integrity;
pub mod optimizer;
pub mod parallel;
pub mod predict;
pub mod quality;
pub mod recovery;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use crate::analytics::{Analytics, AnalyticsSnapshot};
pub use crate::classify::{classify, classify_file, settings_for, CategorySettings, ContentCategory};
pub use crate::codec::{
    Codec, Filter, FilterChain, IntegrityCheck, Progress, StreamDecoder, StreamStatus, XzCodec,
    DEFAULT_PRESET, MAX_PRESET, MIN_PRESET,
};
pub use crate::config::{AdvisorConfig, ParallelConfig};
pub use crate::deflate::DeflateCodec;
pub use crate::error::{AdvisorError, CodecError};
pub use crate::integrity::{IntegrityReport, IntegrityStatus, RepairReport};
pub use crate::optimizer::{OptimizationLimits, OptimizationResult, Optimizer, OptimizerStats};
pub use crate::parallel::{ParallelMetrics, ParallelPlan, ParallelPlanner};
pub use crate::predict::{Prediction, Predictor};
pub use crate::quality::{BenchmarkResult, Grade, QualityScore};
pub use crate::recovery::{FileRecovery, RecoveryAttempt, RecoveryEngine, RecoveryMode, RecoveryStats};

use crate::config::MIB;

/// What the caller wants to optimize for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Auto,
    Speed,
    Ratio,
    Balanced,
    MemoryEfficient,
    Custom,
}

impl Strategy {
    /// Presets the optimizer searches for this strategy.
    pub fn preset_range(&self) -> RangeInclusive<u32> {
        match self {
            Strategy::Speed => 1..=4,
            Strategy::Ratio => 7..=9,
            Strategy::Balanced => 4..=7,
            Strategy::MemoryEfficient => 1..=5,
            Strategy::Auto | Strategy::Custom => MIN_PRESET..=MAX_PRESET,
        }
    }
}

const MAX_BENCHMARK_PRESETS: usize = 10;
const MEMORY_EFFICIENT_DICT: u32 = 8 * MIB as u32;
/// Floor for timings so speeds stay finite.
const MIN_ELAPSED_SECONDS: f64 = 1e-6;

/// Settings suggested for a file before compressing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: ContentCategory,
    pub preset: u32,
    pub dict_size: Option<u32>,
    pub filters: FilterChain,
    pub parallel: ParallelPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBenchmark {
    pub result: BenchmarkResult,
    pub quality: QualityScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    pub recommendation: Recommendation,
    pub result: BenchmarkResult,
    pub quality: QualityScore,
    pub analytics: AnalyticsSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiFileReport {
    pub files_written: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Inputs that could not be read or encoded, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

/// Running totals across benchmarks and file compressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub files_processed: u64,
    pub bytes_compressed: u64,
    pub measurements: u64,
    ratio_sum: f64,
    speed_sum: f64,
}

impl EngineStats {
    pub fn average_ratio(&self) -> Option<f64> {
        (self.measurements > 0).then(|| self.ratio_sum / self.measurements as f64)
    }

    pub fn average_speed_mbps(&self) -> Option<f64> {
        (self.measurements > 0).then(|| self.speed_sum / self.measurements as f64)
    }

    fn record(&mut self, bytes: u64, result: &BenchmarkResult) {
        self.bytes_compressed += bytes;
        self.ratio_sum += result.compression_ratio;
        self.speed_sum += result.compression_speed_mbps;
        self.measurements += 1;
    }
}

/// Memory estimate used for benchmark scoring, in MiB.
fn estimated_memory_mb(input_len: usize, preset: u32) -> u64 {
    let size_mb = input_len as f64 / MIB as f64;
    ((size_mb * 2.0 * preset as f64) as u64).max(64)
}

/// One session: a codec plus every piece of mutable state the advisor keeps.
pub struct Advisor {
    codec: Box<dyn Codec>,
    config: AdvisorConfig,
    predictor: Predictor,
    optimizer: Optimizer,
    planner: ParallelPlanner,
    recovery: RecoveryEngine,
    analytics: Analytics,
    stats: EngineStats,
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(Box::new(XzCodec), AdvisorConfig::default())
    }
}

impl Advisor {
    pub fn new(codec: Box<dyn Codec>, config: AdvisorConfig) -> Self {
        Self {
            predictor: Predictor::new(config.sample_limit),
            optimizer: Optimizer::new(config.trial_limit, config.integrity_check),
            planner: ParallelPlanner::new(config.parallel.clone()),
            recovery: RecoveryEngine::new(
                config.recovery_mode,
                config.recovery_chunk_size,
                config.recovery_output_limit,
            ),
            analytics: Analytics::new(config.analytics_enabled),
            stats: EngineStats::default(),
            codec,
            config,
        }
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn predict(&self, data: &[u8], strategy: Strategy) -> Option<Prediction> {
        self.predictor.predict(data, strategy)
    }

    pub fn predict_file(
        &self,
        path: impl AsRef<Path>,
        strategy: Strategy,
    ) -> Result<Option<Prediction>, AdvisorError> {
        self.predictor.predict_file(path, strategy)
    }

    pub fn optimize(
        &mut self,
        sample: &[u8],
        strategy: Strategy,
        limits: OptimizationLimits,
    ) -> Option<OptimizationResult> {
        self.optimizer.analyze(self.codec.as_ref(), sample, strategy, limits)
    }

    pub fn optimize_file(
        &mut self,
        path: impl AsRef<Path>,
        strategy: Strategy,
        limits: OptimizationLimits,
    ) -> Result<Option<OptimizationResult>, AdvisorError> {
        self.optimizer
            .optimize_file(self.codec.as_ref(), path, strategy, limits)
    }

    /// Category defaults for the file's header, clamped by strategy, plus a
    /// thread plan for its size under the configured memory budget.
    pub fn recommend(
        &self,
        path: impl AsRef<Path>,
        strategy: Strategy,
    ) -> Result<Recommendation, AdvisorError> {
        let path = path.as_ref();
        let file_size = fs::metadata(path)?.len();
        let category = classify_file(path, self.config.header_sample)?;
        let CategorySettings {
            mut preset,
            mut dict_size,
            filters,
        } = settings_for(category);

        match strategy {
            Strategy::Speed => preset = preset.min(4),
            Strategy::Ratio => preset = preset.max(7),
            Strategy::MemoryEfficient => {
                preset = preset.min(5);
                dict_size = dict_size.map(|d| d.min(MEMORY_EFFICIENT_DICT));
            }
            Strategy::Balanced | Strategy::Auto | Strategy::Custom => {}
        }
        let filters = FilterChain(
            filters
                .filters()
                .iter()
                .map(|f| match f {
                    Filter::Lzma2 { .. } => Filter::Lzma2 { dict_size },
                    branch => *branch,
                })
                .collect(),
        );

        let parallel = self.planner.plan(file_size, self.config.recommendation_memory);
        debug!(path = %path.display(), ?category, preset, threads = parallel.threads, "recommendation");
        Ok(Recommendation {
            category,
            preset,
            dict_size,
            filters,
            parallel,
        })
    }

    /// Compress and decompress `data` at each preset, measuring both
    /// directions. At most ten presets are tried; presets above 9 and
    /// presets the codec rejects are skipped.
    pub fn benchmark(&mut self, data: &[u8], presets: &[u32], strategy: Strategy) -> Vec<ScoredBenchmark> {
        if data.is_empty() {
            return Vec::new();
        }
        let size_mb = data.len() as f64 / MIB as f64;
        let mut runs = Vec::new();

        for &preset in presets.iter().take(MAX_BENCHMARK_PRESETS) {
            if preset > MAX_PRESET {
                continue;
            }
            self.analytics.compress_start();
            let started = Instant::now();
            let encoded = match self.codec.encode(
                data,
                preset,
                &FilterChain::default(),
                self.config.integrity_check,
            ) {
                Ok(encoded) => encoded,
                Err(err) => {
                    self.analytics.compress_abort();
                    debug!(preset, error = %err, "benchmark preset skipped");
                    continue;
                }
            };
            let compression_time_sec = started.elapsed().as_secs_f64().max(MIN_ELAPSED_SECONDS);
            self.analytics.compress_end(data.len() as u64, encoded.len() as u64);

            self.analytics.decompress_start();
            let started = Instant::now();
            let decoded = self.codec.decode(&encoded, false);
            let decompression_time_sec = started.elapsed().as_secs_f64().max(MIN_ELAPSED_SECONDS);
            let decompression_speed_mbps = match decoded {
                Ok((bytes, StreamStatus::EndOfStream)) if bytes.len() == data.len() => {
                    self.analytics.decompress_end(bytes.len() as u64);
                    size_mb / decompression_time_sec
                }
                _ => {
                    self.analytics.decompress_abort();
                    warn!(preset, "benchmark stream did not decode back cleanly");
                    0.0
                }
            };

            let result = BenchmarkResult {
                preset,
                compression_ratio: encoded.len() as f64 / data.len() as f64,
                compression_speed_mbps: size_mb / compression_time_sec,
                decompression_speed_mbps,
                memory_used_mb: estimated_memory_mb(data.len(), preset),
                compression_time_sec,
                decompression_time_sec,
                output_size_bytes: encoded.len() as u64,
            };
            self.stats.record(data.len() as u64, &result);
            let quality = quality::score(&result, strategy);
            runs.push(ScoredBenchmark { result, quality });
        }
        runs
    }

    /// Compress a whole file with the recommended settings and grade the outcome.
    pub fn compress_file(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        strategy: Strategy,
    ) -> Result<CompressionReport, AdvisorError> {
        let input = input.as_ref();
        let recommendation = self.recommend(input, strategy)?;
        let data = fs::read(input)?;
        if data.is_empty() {
            return Err(AdvisorError::EmptyInput);
        }

        let plan = recommendation.parallel;
        self.analytics.compress_start();
        let started = Instant::now();
        let encoded = match self.encode_recommended(&data, &recommendation) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.analytics.compress_abort();
                return Err(err.into());
            }
        };
        let elapsed = started.elapsed().as_secs_f64().max(MIN_ELAPSED_SECONDS);
        self.analytics.compress_end(data.len() as u64, encoded.len() as u64);
        self.analytics.record_resources(
            plan.blocks_for(data.len() as u64),
            optimizer::encoder_memory_mb(recommendation.preset) * MIB,
            plan.threads,
        );
        self.planner.record_compression(&plan, data.len() as u64, elapsed);
        fs::write(output.as_ref(), &encoded)?;

        let result = BenchmarkResult {
            preset: recommendation.preset,
            compression_ratio: encoded.len() as f64 / data.len() as f64,
            compression_speed_mbps: data.len() as f64 / MIB as f64 / elapsed,
            memory_used_mb: estimated_memory_mb(data.len(), recommendation.preset),
            compression_time_sec: elapsed,
            output_size_bytes: encoded.len() as u64,
            ..BenchmarkResult::default()
        };
        let quality = quality::score(&result, strategy);
        self.stats.files_processed += 1;
        self.stats.record(data.len() as u64, &result);

        info!(
            input = %input.display(),
            preset = result.preset,
            ratio = result.compression_ratio,
            grade = %quality.grade,
            "file compressed"
        );
        Ok(CompressionReport {
            recommendation,
            result,
            quality,
            analytics: self.analytics.snapshot().clone(),
        })
    }

    /// Encode under the recommendation's thread plan. Backends without
    /// branch converters still get the category's dictionary.
    fn encode_recommended(&self, data: &[u8], rec: &Recommendation) -> Result<Vec<u8>, CodecError> {
        let check = self.config.integrity_check;
        match self
            .codec
            .encode_parallel(data, rec.preset, &rec.filters, check, &rec.parallel)
        {
            Err(CodecError::Options) if rec.filters.has_branch_converter() => {
                debug!(codec = self.codec.name(), "retrying without branch converter");
                self.codec.encode_parallel(
                    data,
                    rec.preset,
                    &FilterChain::lzma2(rec.dict_size),
                    check,
                    &rec.parallel,
                )
            }
            other => other,
        }
    }

    /// Write each input as its own stream at the default preset, back to
    /// back in `output`. Unreadable or empty inputs are reported and skipped.
    pub fn compress_multi<P: AsRef<Path>>(
        &mut self,
        inputs: &[P],
        output: impl AsRef<Path>,
    ) -> Result<MultiFileReport, AdvisorError> {
        let mut writer = BufWriter::new(File::create(output.as_ref())?);
        let mut report = MultiFileReport::default();

        for input in inputs {
            let input = input.as_ref();
            let encoded = fs::read(input)
                .map_err(AdvisorError::from)
                .and_then(|data| {
                    if data.is_empty() {
                        return Err(AdvisorError::EmptyInput);
                    }
                    let encoded = self.codec.encode(
                        &data,
                        DEFAULT_PRESET,
                        &FilterChain::default(),
                        self.config.integrity_check,
                    )?;
                    Ok((data.len() as u64, encoded))
                });
            match encoded {
                Ok((len, encoded)) => {
                    writer.write_all(&encoded)?;
                    report.files_written += 1;
                    report.bytes_in += len;
                    report.bytes_out += encoded.len() as u64;
                    self.stats.files_processed += 1;
                }
                Err(err) => {
                    warn!(input = %input.display(), error = %err, "skipping input");
                    report.failures.push((input.to_path_buf(), err.to_string()));
                }
            }
        }
        writer.flush()?;
        Ok(report)
    }

    pub fn verify(&self, stream: &[u8]) -> IntegrityStatus {
        integrity::verify(self.codec.as_ref(), stream)
    }

    pub fn verify_file(&self, path: impl AsRef<Path>) -> IntegrityStatus {
        integrity::verify_file(self.codec.as_ref(), path)
    }

    pub fn repair_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<RepairReport, AdvisorError> {
        integrity::repair_file(self.codec.as_ref(), input, output)
    }

    /// Chunked recovery using the engine's configured mode.
    pub fn recover_file(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<FileRecovery, AdvisorError> {
        let mode = self.recovery.mode();
        self.recovery
            .recover_file(self.codec.as_ref(), input, output, mode)
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = EngineStats::default();
    }

    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    pub fn recovery_mut(&mut self) -> &mut RecoveryEngine {
        &mut self.recovery
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn analytics_mut(&mut self) -> &mut Analytics {
        &mut self.analytics
    }

    pub fn planner(&self) -> &ParallelPlanner {
        &self.planner
    }

    pub fn planner_mut(&mut self) -> &mut ParallelPlanner {
        &mut self.planner
    }
}
