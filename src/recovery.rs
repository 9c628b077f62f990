//! Salvaging data from corrupted compressed streams
//!
//! Every attempt runs a tolerant decoder (integrity checks ignored,
//! concatenated streams accepted) and keeps whatever it produced. The
//! recovery mode decides how much damage is acceptable.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{Codec, StreamStatus};
use crate::config::{KIB, MIB};
use crate::error::{AdvisorError, CodecError};

/// Ordered by increasing willingness to accept partial or skipped data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecoveryMode {
    None,
    Partial,
    Aggressive,
    Maximum,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub corrupted_blocks: u32,
    pub recovered_blocks: u32,
    pub skipped_blocks: u32,
    pub recovered_bytes: u64,
    /// `recovered_blocks / corrupted_blocks`, 0 before the first attempt.
    pub recovery_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// The decoder reached a clean end of stream.
    Complete,
    /// Output stopped at the configured limit without an error.
    OutputLimited,
    /// Decoding failed partway and the salvaged prefix was accepted.
    Partial,
    /// Nothing acceptable under the requested mode.
    Skipped,
    /// The codec could not start or ran out of memory.
    Failed(CodecError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryAttempt {
    pub status: AttemptStatus,
    pub data: Vec<u8>,
}

impl RecoveryAttempt {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            AttemptStatus::Complete | AttemptStatus::OutputLimited | AttemptStatus::Partial
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecovery {
    /// True when any bytes were written to the output.
    pub success: bool,
    pub recovered_bytes: u64,
    pub chunks_processed: u32,
    pub chunks_recovered: u32,
    pub chunks_skipped: u32,
    /// A failed chunk ended processing before the end of the input.
    pub stopped_early: bool,
}

enum Ending {
    Clean,
    Limited,
    Broken(CodecError),
}

pub struct RecoveryEngine {
    mode: RecoveryMode,
    chunk_size: usize,
    output_limit: usize,
    stats: RecoveryStats,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(RecoveryMode::Partial, 64 * KIB as usize, 64 * MIB as usize)
    }
}

impl RecoveryEngine {
    pub fn new(mode: RecoveryMode, chunk_size: usize, output_limit: usize) -> Self {
        Self {
            mode,
            chunk_size: chunk_size.max(1),
            output_limit: output_limit.max(1),
            stats: RecoveryStats::default(),
        }
    }

    /// Mode used when the caller does not pick one.
    pub fn mode(&self) -> RecoveryMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RecoveryMode) {
        self.mode = mode;
    }

    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RecoveryStats::default();
    }

    /// Decode as much of `corrupted` as possible. Always counts one
    /// corrupted block; counts it recovered or skipped depending on the outcome.
    pub fn attempt(&mut self, codec: &dyn Codec, corrupted: &[u8], mode: RecoveryMode) -> RecoveryAttempt {
        self.stats.corrupted_blocks += 1;

        let mut decoder = match codec.decoder(true) {
            Ok(decoder) => decoder,
            Err(err) => {
                warn!(codec = codec.name(), error = %err, "tolerant decoder unavailable");
                return self.finish(AttemptStatus::Failed(err), Vec::new());
            }
        };

        let mut out = vec![0u8; self.output_limit.min((corrupted.len() * 4).max(4096))];
        let mut pos = 0;
        let mut produced = 0;
        let ending = loop {
            let progress = decoder.feed(&corrupted[pos..], &mut out[produced..], true);
            pos += progress.consumed;
            produced += progress.produced;
            match progress.status {
                StreamStatus::EndOfStream => break Ending::Clean,
                StreamStatus::OutputFull if out.len() >= self.output_limit => break Ending::Limited,
                StreamStatus::OutputFull => {
                    let grown = (out.len() * 2).min(self.output_limit);
                    out.resize(grown, 0);
                }
                StreamStatus::Continue if progress.consumed + progress.produced > 0 => {}
                StreamStatus::Continue | StreamStatus::RecoverableError => {
                    break Ending::Broken(CodecError::Truncated)
                }
                StreamStatus::FatalError(err) => break Ending::Broken(err),
            }
        };
        out.truncate(produced);

        let status = match ending {
            Ending::Clean => AttemptStatus::Complete,
            Ending::Limited => AttemptStatus::OutputLimited,
            Ending::Broken(err) if err.is_resource_exhaustion() => AttemptStatus::Failed(err),
            Ending::Broken(_) if mode >= RecoveryMode::Partial && produced > 0 => AttemptStatus::Partial,
            Ending::Broken(err) => {
                debug!(error = %err, consumed = pos, "nothing salvageable in block");
                AttemptStatus::Skipped
            }
        };
        self.finish(status, out)
    }

    fn finish(&mut self, status: AttemptStatus, data: Vec<u8>) -> RecoveryAttempt {
        let attempt = RecoveryAttempt { status, data };
        if attempt.is_success() {
            self.stats.recovered_blocks += 1;
            self.stats.recovered_bytes += attempt.data.len() as u64;
        } else {
            self.stats.skipped_blocks += 1;
        }
        self.stats.recovery_rate = self.stats.recovered_blocks as f64 / self.stats.corrupted_blocks as f64;
        attempt
    }

    /// Feed `input` through [`attempt`](Self::attempt) in fixed-size chunks,
    /// writing everything salvaged to `output`. Under `Aggressive` and
    /// `Maximum` a failed chunk is skipped; otherwise it stops processing.
    pub fn recover_file(
        &mut self,
        codec: &dyn Codec,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        mode: RecoveryMode,
    ) -> Result<FileRecovery, AdvisorError> {
        let mut reader = File::open(input.as_ref())?;
        let mut writer = BufWriter::new(File::create(output.as_ref())?);
        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut report = FileRecovery::default();

        loop {
            chunk.clear();
            (&mut reader).take(self.chunk_size as u64).read_to_end(&mut chunk)?;
            if chunk.is_empty() {
                break;
            }
            report.chunks_processed += 1;

            let attempt = self.attempt(codec, &chunk, mode);
            if attempt.is_success() {
                writer.write_all(&attempt.data)?;
                report.recovered_bytes += attempt.data.len() as u64;
                report.chunks_recovered += 1;
            } else if mode >= RecoveryMode::Aggressive {
                report.chunks_skipped += 1;
            } else {
                report.stopped_early = true;
                break;
            }
        }
        writer.flush()?;

        report.success = report.recovered_bytes > 0;
        info!(
            input = %input.as_ref().display(),
            recovered_bytes = report.recovered_bytes,
            chunks = report.chunks_processed,
            skipped = report.chunks_skipped,
            "file recovery finished"
        );
        Ok(report)
    }
}
