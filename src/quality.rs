//! Strategy-weighted quality scoring of benchmark results

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Strategy;

/// Throughput treated as a perfect speed score.
const EXCELLENT_SPEED_MBPS: f64 = 50.0;
/// Memory use that costs half of the memory score.
const HALF_SCORE_MEMORY_MB: f64 = 500.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub preset: u32,
    /// compressed / uncompressed
    pub compression_ratio: f64,
    pub compression_speed_mbps: f64,
    pub decompression_speed_mbps: f64,
    pub memory_used_mb: u64,
    pub compression_time_sec: f64,
    pub decompression_time_sec: f64,
    pub output_size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    F,
    D,
    C,
    CPlus,
    B,
    BPlus,
    A,
    APlus,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 95.0 => Grade::APlus,
            s if s >= 90.0 => Grade::A,
            s if s >= 85.0 => Grade::BPlus,
            s if s >= 80.0 => Grade::B,
            s if s >= 75.0 => Grade::CPlus,
            s if s >= 70.0 => Grade::C,
            s if s >= 60.0 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub ratio_score: f64,
    pub speed_score: f64,
    pub memory_score: f64,
    pub overall_score: f64,
    pub grade: Grade,
}

/// (speed, ratio, memory) weights; each row sums to 1.
fn weights(strategy: Strategy) -> (f64, f64, f64) {
    match strategy {
        Strategy::Speed => (0.6, 0.2, 0.2),
        Strategy::Ratio => (0.2, 0.6, 0.2),
        Strategy::MemoryEfficient => (0.2, 0.3, 0.5),
        Strategy::Balanced | Strategy::Auto | Strategy::Custom => (0.4, 0.4, 0.2),
    }
}

pub fn score(result: &BenchmarkResult, strategy: Strategy) -> QualityScore {
    let ratio_score = ((1.0 - result.compression_ratio) * 100.0).clamp(0.0, 100.0);
    let speed_score = (result.compression_speed_mbps / EXCELLENT_SPEED_MBPS * 100.0).clamp(0.0, 100.0);
    let memory_score =
        (100.0 - result.memory_used_mb as f64 / HALF_SCORE_MEMORY_MB * 50.0).clamp(0.0, 100.0);

    let (ws, wr, wm) = weights(strategy);
    let overall_score = speed_score * ws + ratio_score * wr + memory_score * wm;

    QualityScore {
        ratio_score,
        speed_score,
        memory_score,
        overall_score,
        grade: Grade::from_score(overall_score),
    }
}
