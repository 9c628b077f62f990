//! Thread count and block size sizing for the codec's multithreaded mode
//!
//! Nothing here spawns threads; the plan is handed to the codec.

use serde::{Deserialize, Serialize};

use crate::config::{ParallelConfig, KIB, MIB};

const DEFAULT_BLOCK_SIZE: u64 = 3 * MIB;
pub const MIN_BLOCK_SIZE: u64 = 64 * KIB;
pub const MAX_BLOCK_SIZE: u64 = 64 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelPlan {
    pub threads: u32,
    pub block_size: u64,
    /// Longest a single codec call may block before returning, 0 = no limit.
    pub timeout_ms: u32,
}

impl ParallelPlan {
    /// One worker with no block splitting.
    pub fn single_threaded() -> Self {
        Self {
            threads: 1,
            block_size: 0,
            timeout_ms: 0,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.threads > 1
    }

    /// Blocks an input of `len` bytes is cut into under this plan.
    pub fn blocks_for(&self, len: u64) -> u32 {
        if !self.is_parallel() || self.block_size == 0 {
            return 1;
        }
        len.div_ceil(self.block_size).max(1) as u32
    }
}

/// Throughput of planned encodes. Decoding always runs on one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelMetrics {
    pub compression_speed_mbps: f64,
    pub active_threads: u32,
    pub total_blocks_processed: u64,
}

#[derive(Debug, Clone)]
pub struct ParallelPlanner {
    config: ParallelConfig,
    hardware_threads: u32,
    metrics: ParallelMetrics,
}

impl Default for ParallelPlanner {
    fn default() -> Self {
        Self::new(ParallelConfig::default())
    }
}

impl ParallelPlanner {
    pub fn new(config: ParallelConfig) -> Self {
        Self::with_hardware_threads(config, num_cpus::get() as u32)
    }

    /// Planner for a fixed hardware thread count instead of the detected one.
    pub fn with_hardware_threads(config: ParallelConfig, hardware_threads: u32) -> Self {
        Self {
            config,
            hardware_threads: hardware_threads.max(1),
            metrics: ParallelMetrics::default(),
        }
    }

    pub fn configure(&mut self, config: ParallelConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    pub fn hardware_threads(&self) -> u32 {
        self.hardware_threads
    }

    pub fn set_adaptive_threading(&mut self, enable: bool) {
        self.config.adaptive_threading = enable;
    }

    pub fn set_load_balancing(&mut self, enable: bool) {
        self.config.load_balancing = enable;
    }

    /// Smaller of the size-based and memory-based thread counts, always
    /// within `1..=hardware_threads`.
    pub fn optimal_threads(&self, file_size: u64, available_memory: u64) -> u32 {
        let max_threads = self.hardware_threads;

        let size_based = if file_size > 100 * MIB {
            max_threads
        } else if file_size > 10 * MIB {
            (max_threads / 2).max(1)
        } else {
            1
        };

        // each worker holds roughly three blocks in flight
        let block_size = match self.config.block_size {
            0 => DEFAULT_BLOCK_SIZE,
            size => size,
        };
        let memory_based = (available_memory / block_size.saturating_mul(3)).clamp(1, max_threads as u64) as u32;

        size_based.min(memory_based)
    }

    pub fn optimal_block_size(&self, threads: u32, file_size: u64) -> u64 {
        let threads = threads.max(1) as u64;
        (file_size / (threads * 4)).clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
    }

    /// Plan for the codec. A configured thread count or block size wins
    /// over the heuristics. Without adaptive threading every hardware
    /// thread is used; without load balancing each worker gets one block.
    pub fn plan(&self, file_size: u64, available_memory: u64) -> ParallelPlan {
        let threads = match self.config.threads {
            0 if self.config.adaptive_threading => self.optimal_threads(file_size, available_memory),
            0 => self.hardware_threads,
            configured => configured,
        };
        let block_size = match self.config.block_size {
            0 if self.config.load_balancing => self.optimal_block_size(threads, file_size),
            0 => (file_size / threads as u64).clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE),
            configured => configured.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE),
        };
        ParallelPlan {
            threads,
            block_size,
            timeout_ms: self.config.timeout_ms,
        }
    }

    pub fn record_compression(&mut self, plan: &ParallelPlan, bytes: u64, seconds: f64) {
        if seconds > 0.0 {
            self.metrics.compression_speed_mbps = bytes as f64 / MIB as f64 / seconds;
        }
        self.metrics.active_threads = plan.threads;
        self.metrics.total_blocks_processed += plan.blocks_for(bytes) as u64;
    }

    pub fn metrics(&self) -> &ParallelMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = ParallelMetrics::default();
    }
}
