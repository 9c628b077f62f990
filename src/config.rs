//! Configuration for compress-advisor

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::IntegrityCheck;
use crate::error::AdvisorError;
use crate::recovery::RecoveryMode;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Leading bytes analyzed by the predictor.
    pub sample_limit: usize,
    /// Leading bytes compressed by each optimizer trial.
    pub trial_limit: usize,
    /// Header bytes read when classifying a file.
    pub header_sample: usize,
    pub recovery_chunk_size: usize,
    pub recovery_output_limit: usize,
    pub recovery_mode: RecoveryMode,
    pub analytics_enabled: bool,
    /// Memory budget handed to the thread planner by `recommend`.
    pub recommendation_memory: u64,
    pub integrity_check: IntegrityCheck,
    pub parallel: ParallelConfig,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            sample_limit: MIB as usize,
            trial_limit: MIB as usize,
            header_sample: 512,
            recovery_chunk_size: 64 * KIB as usize,
            recovery_output_limit: 64 * MIB as usize,
            recovery_mode: RecoveryMode::Partial,
            analytics_enabled: true,
            recommendation_memory: GIB,
            integrity_check: IntegrityCheck::Crc64,
            parallel: ParallelConfig::default(),
        }
    }
}

impl AdvisorConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AdvisorError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Parameters handed to the codec's own multithreaded mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Worker count, overriding the planner. 0 = let the planner choose.
    pub threads: u32,
    /// 0 = size blocks from the input.
    pub block_size: u64,
    pub timeout_ms: u32,
    /// Size the thread count from input size and memory instead of using every hardware thread.
    pub adaptive_threading: bool,
    /// Cut four blocks per worker instead of one.
    pub load_balancing: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            block_size: 0,
            timeout_ms: 300,
            adaptive_threading: true,
            load_balancing: true,
        }
    }
}
