//! Last-measurement analytics around compression and decompression calls

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::MIB;
use crate::error::AdvisorError;

/// The most recent measurement. Each `*_end` call overwrites its fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    /// compressed / uncompressed; left untouched when the input was empty.
    pub compression_ratio: f64,
    pub compression_time: f64,
    pub decompression_time: f64,
    pub blocks_count: u32,
    pub memory_used: u64,
    pub threads_used: u32,
}

#[derive(Serialize)]
struct Report {
    compression: ReportBody,
}

#[derive(Serialize)]
struct ReportBody {
    uncompressed_size: u64,
    compressed_size: u64,
    ratio: f64,
    time: f64,
    decompression_time: f64,
    blocks: u32,
    memory_mb: u64,
    threads: u32,
}

#[derive(Debug, Clone)]
pub struct Analytics {
    enabled: bool,
    snapshot: AnalyticsSnapshot,
    compress_started: Option<Instant>,
    decompress_started: Option<Instant>,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Analytics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            snapshot: AnalyticsSnapshot::default(),
            compress_started: None,
            decompress_started: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable recording and start from a clean snapshot.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.reset();
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn compress_start(&mut self) {
        if self.enabled {
            self.compress_started = Some(Instant::now());
        }
    }

    pub fn compress_end(&mut self, uncompressed: u64, compressed: u64) {
        if !self.enabled {
            return;
        }
        self.snapshot.compression_time = elapsed(self.compress_started.take());
        self.snapshot.uncompressed_size = uncompressed;
        self.snapshot.compressed_size = compressed;
        if uncompressed > 0 {
            self.snapshot.compression_ratio = compressed as f64 / uncompressed as f64;
        }
    }

    /// Forget a pending start after a failed compression.
    pub fn compress_abort(&mut self) {
        self.compress_started = None;
    }

    pub fn decompress_start(&mut self) {
        if self.enabled {
            self.decompress_started = Some(Instant::now());
        }
    }

    pub fn decompress_end(&mut self, uncompressed: u64) {
        if !self.enabled {
            return;
        }
        self.snapshot.decompression_time = elapsed(self.decompress_started.take());
        self.snapshot.uncompressed_size = uncompressed;
    }

    pub fn decompress_abort(&mut self) {
        self.decompress_started = None;
    }

    pub fn record_resources(&mut self, blocks: u32, memory_bytes: u64, threads: u32) {
        if !self.enabled {
            return;
        }
        self.snapshot.blocks_count = blocks;
        self.snapshot.memory_used = memory_bytes;
        self.snapshot.threads_used = threads;
    }

    pub fn snapshot(&self) -> &AnalyticsSnapshot {
        &self.snapshot
    }

    pub fn reset(&mut self) {
        self.snapshot = AnalyticsSnapshot::default();
        self.compress_started = None;
        self.decompress_started = None;
    }

    /// JSON report of the snapshot, with memory rounded down to MiB.
    /// `None` while disabled.
    pub fn to_json(&self) -> Result<Option<String>, AdvisorError> {
        if !self.enabled {
            return Ok(None);
        }
        let s = &self.snapshot;
        let report = Report {
            compression: ReportBody {
                uncompressed_size: s.uncompressed_size,
                compressed_size: s.compressed_size,
                ratio: s.compression_ratio,
                time: s.compression_time,
                decompression_time: s.decompression_time,
                blocks: s.blocks_count,
                memory_mb: s.memory_used / MIB,
                threads: s.threads_used,
            },
        };
        Ok(Some(serde_json::to_string_pretty(&report)?))
    }
}

/// Seconds since `started`; 0 when no start was recorded.
fn elapsed(started: Option<Instant>) -> f64 {
    started.map_or(0.0, |t| t.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_bracket_records_sizes_and_ratio() {
        let mut analytics = Analytics::default();
        analytics.compress_start();
        analytics.compress_end(1000, 250);
        let s = analytics.snapshot();
        assert_eq!(s.uncompressed_size, 1000);
        assert_eq!(s.compressed_size, 250);
        assert_eq!(s.compression_ratio, 0.25);
        assert!(s.compression_time >= 0.0);
    }

    #[test]
    fn test_zero_uncompressed_leaves_ratio() {
        let mut analytics = Analytics::default();
        analytics.compress_end(100, 50);
        analytics.compress_end(0, 10);
        assert_eq!(analytics.snapshot().compression_ratio, 0.5);
        assert_eq!(analytics.snapshot().compression_time, 0.0);
    }

    #[test]
    fn test_decompress_overwrites_uncompressed_size() {
        let mut analytics = Analytics::default();
        analytics.compress_end(1000, 400);
        analytics.decompress_start();
        analytics.decompress_end(999);
        let s = analytics.snapshot();
        assert_eq!(s.uncompressed_size, 999);
        assert_eq!(s.compressed_size, 400);
        assert!(s.decompression_time >= 0.0);
    }

    #[test]
    fn test_abort_discards_pending_start() {
        let mut analytics = Analytics::default();
        analytics.compress_start();
        analytics.decompress_start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        analytics.compress_abort();
        analytics.decompress_abort();
        analytics.compress_end(10, 5);
        analytics.decompress_end(10);
        assert_eq!(analytics.snapshot().compression_time, 0.0);
        assert_eq!(analytics.snapshot().decompression_time, 0.0);
        assert_eq!(analytics.snapshot().compressed_size, 5);
    }

    #[test]
    fn test_disabled_records_nothing() {
        let mut analytics = Analytics::new(false);
        analytics.compress_start();
        analytics.compress_end(10, 5);
        analytics.decompress_end(10);
        analytics.record_resources(4, MIB, 2);
        assert_eq!(analytics.snapshot(), &AnalyticsSnapshot::default());
        assert!(analytics.to_json().unwrap().is_none());
    }

    #[test]
    fn test_enable_resets_and_disable_freezes() {
        let mut analytics = Analytics::default();
        analytics.compress_end(10, 5);
        analytics.disable();
        analytics.compress_end(20, 20);
        assert_eq!(analytics.snapshot().compressed_size, 5);
        analytics.enable();
        assert_eq!(analytics.snapshot(), &AnalyticsSnapshot::default());
    }

    #[test]
    fn test_json_report() {
        let mut analytics = Analytics::default();
        analytics.compress_end(2048, 1024);
        analytics.record_resources(3, 5 * MIB + 17, 4);
        let json = analytics.to_json().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["compression"]["ratio"], 0.5);
        assert_eq!(value["compression"]["memory_mb"], 5);
        assert_eq!(value["compression"]["threads"], 4);
        assert_eq!(value["compression"]["blocks"], 3);
    }

    #[test]
    fn test_reset() {
        let mut analytics = Analytics::default();
        analytics.compress_end(10, 1);
        analytics.reset();
        assert_eq!(analytics.snapshot(), &AnalyticsSnapshot::default());
    }
}
