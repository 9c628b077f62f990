//! End-to-end stream verification and best-effort repair

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{Codec, StreamDecoder, StreamStatus};
use crate::error::{AdvisorError, CodecError};

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    /// The decoder reached a clean end of stream.
    Ok,
    /// Decoding started but stopped partway with an error.
    Corrupted,
    /// The stream could not be opened or the decoder could not run.
    Error,
    /// Nothing to verify (empty input).
    Unknown,
}

/// Verify a stream with a tolerant decoder.
pub fn verify(codec: &dyn Codec, stream: &[u8]) -> IntegrityStatus {
    verify_source(codec, &mut &stream[..], true)
}

/// Verify a stream with integrity checks enforced and no concatenation.
pub fn verify_strict(codec: &dyn Codec, stream: &[u8]) -> IntegrityStatus {
    verify_source(codec, &mut &stream[..], false)
}

pub fn verify_file(codec: &dyn Codec, path: impl AsRef<Path>) -> IntegrityStatus {
    match File::open(path.as_ref()) {
        Ok(mut file) => verify_source(codec, &mut file, true),
        Err(err) => {
            warn!(path = %path.as_ref().display(), error = %err, "cannot open stream for verification");
            IntegrityStatus::Error
        }
    }
}

fn verify_source(codec: &dyn Codec, source: &mut dyn Read, tolerant: bool) -> IntegrityStatus {
    let mut decoder = match codec.decoder(tolerant) {
        Ok(decoder) => decoder,
        Err(_) => return IntegrityStatus::Error,
    };
    let mut feeder = Feeder::new(source);
    let run = drive(decoder.as_mut(), &mut feeder, |_| Ok(()));
    match run {
        Err(_) => IntegrityStatus::Error,
        // a decoder that rejects its first bytes consumed nothing but still saw input
        Ok(_) if feeder.bytes_read == 0 => IntegrityStatus::Unknown,
        Ok(Run { error: None, .. }) => IntegrityStatus::Ok,
        Ok(Run { error: Some(err), .. }) if err.is_resource_exhaustion() => IntegrityStatus::Error,
        Ok(Run {
            error: Some(err),
            total_in,
            ..
        }) => {
            debug!(error = %err, total_in, "stream failed verification");
            IntegrityStatus::Corrupted
        }
    }
}

/// Buffered input that remembers what the decoder swallowed since it last
/// produced output, so a failed run can be retried one byte further on.
struct Feeder<'a> {
    source: &'a mut dyn Read,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
    bytes_read: u64,
    since_output: Vec<u8>,
}

impl<'a> Feeder<'a> {
    fn new(source: &'a mut dyn Read) -> Self {
        Self {
            source,
            buf: vec![0u8; BUF_SIZE],
            start: 0,
            end: 0,
            eof: false,
            bytes_read: 0,
            since_output: Vec::new(),
        }
    }

    fn fill(&mut self) -> std::io::Result<()> {
        if self.start == self.end && !self.eof {
            if self.buf.len() < BUF_SIZE {
                self.buf.resize(BUF_SIZE, 0);
            }
            self.start = 0;
            self.end = self.source.read(&mut self.buf)?;
            self.eof = self.end == 0;
            self.bytes_read += self.end as u64;
        }
        Ok(())
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn consume(&mut self, consumed: usize, produced: usize) {
        if produced > 0 {
            self.since_output.clear();
        } else {
            self.since_output
                .extend_from_slice(&self.buf[self.start..self.start + consumed]);
            if self.since_output.len() > BUF_SIZE {
                let excess = self.since_output.len() - BUF_SIZE;
                self.since_output.drain(..excess);
            }
        }
        self.start += consumed;
    }

    /// Put back everything consumed since the last output except its first
    /// byte. Returns how many bytes were dropped, 0 at end of input.
    fn resync(&mut self) -> std::io::Result<u64> {
        if self.since_output.is_empty() {
            self.fill()?;
            if self.start == self.end {
                return Ok(0);
            }
            self.start += 1;
            return Ok(1);
        }
        let mut restored: Vec<u8> = self.since_output.drain(..).skip(1).collect();
        restored.extend_from_slice(&self.buf[self.start..self.end]);
        self.end = restored.len();
        self.start = 0;
        self.buf = restored;
        // history may hold bytes that were already at end of input
        self.eof = self.eof && self.end == 0;
        Ok(1)
    }
}

struct Run {
    total_in: u64,
    /// `None` when the decoder reached end of stream.
    error: Option<CodecError>,
}

/// Pump the feeder through `decoder` until end of stream or an error,
/// handing every decoded span to `sink`.
fn drive(
    decoder: &mut dyn StreamDecoder,
    feeder: &mut Feeder<'_>,
    mut sink: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> std::io::Result<Run> {
    let mut output = vec![0u8; BUF_SIZE];
    let mut total_in = 0u64;

    loop {
        feeder.fill()?;
        let progress = decoder.feed(feeder.pending(), &mut output, feeder.eof);
        feeder.consume(progress.consumed, progress.produced);
        total_in += progress.consumed as u64;
        sink(&output[..progress.produced])?;

        let stalled = progress.consumed + progress.produced == 0;
        let error = match progress.status {
            StreamStatus::EndOfStream => None,
            StreamStatus::FatalError(err) => Some(err),
            StreamStatus::Continue | StreamStatus::RecoverableError if feeder.eof && stalled => {
                Some(CodecError::Truncated)
            }
            _ => continue,
        };
        return Ok(Run { total_in, error });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub bytes_written: u64,
    /// Decoder restarts after data or format errors.
    pub restarts: u32,
    /// Bytes dropped while looking for a decodable position.
    pub bytes_skipped: u64,
    /// The final decoder run reached a clean end of stream.
    pub complete: bool,
}

/// Decode `input` tolerantly into `output`, restarting the decoder after
/// data or format errors so later intact streams are still extracted.
pub fn repair_file(
    codec: &dyn Codec,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<RepairReport, AdvisorError> {
    let mut source = File::open(input.as_ref())?;
    let mut writer = BufWriter::new(File::create(output.as_ref())?);
    let mut feeder = Feeder::new(&mut source);
    let mut report = RepairReport::default();

    loop {
        let mut decoder = codec.decoder(true)?;
        let run = drive(decoder.as_mut(), &mut feeder, |span| {
            report.bytes_written += span.len() as u64;
            writer.write_all(span)
        })?;

        match run.error {
            None => {
                report.complete = true;
                break;
            }
            Some(err) if err.is_resource_exhaustion() => return Err(err.into()),
            Some(err @ (CodecError::Data | CodecError::Format)) => {
                let dropped = feeder.resync()?;
                if dropped == 0 {
                    break;
                }
                report.bytes_skipped += dropped;
                report.restarts += 1;
                debug!(restarts = report.restarts, error = %err, "restarting decoder");
            }
            Some(_) => break,
        }
    }
    writer.flush()?;

    info!(
        input = %input.as_ref().display(),
        bytes_written = report.bytes_written,
        restarts = report.restarts,
        complete = report.complete,
        "repair finished"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub file: PathBuf,
    pub integrity: IntegrityStatus,
}

impl IntegrityReport {
    pub fn for_file(codec: &dyn Codec, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            file: path.to_path_buf(),
            integrity: verify_file(codec, path),
        }
    }

    pub fn to_json(&self) -> Result<String, AdvisorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FilterChain, IntegrityCheck, Progress, XzCodec};
    use crate::deflate::DeflateCodec;

    /// Refuses any input before consuming a byte of it.
    struct RejectingDecoder;

    impl StreamDecoder for RejectingDecoder {
        fn feed(&mut self, _: &[u8], _: &mut [u8], _: bool) -> Progress {
            Progress {
                consumed: 0,
                produced: 0,
                status: StreamStatus::FatalError(CodecError::Format),
            }
        }
    }

    struct RejectingCodec;

    impl Codec for RejectingCodec {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        fn encode(&self, _: &[u8], _: u32, _: &FilterChain, _: IntegrityCheck) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Options)
        }

        fn decoder(&self, _: bool) -> Result<Box<dyn StreamDecoder>, CodecError> {
            Ok(Box::new(RejectingDecoder))
        }
    }

    fn xz(data: &[u8]) -> Vec<u8> {
        XzCodec
            .encode(data, 6, &FilterChain::default(), IntegrityCheck::Crc64)
            .unwrap()
    }

    #[test]
    fn test_verify_clean_stream() {
        let stream = xz(&b"integrity ".repeat(500));
        assert_eq!(verify(&XzCodec, &stream), IntegrityStatus::Ok);
        assert_eq!(verify_strict(&XzCodec, &stream), IntegrityStatus::Ok);
    }

    #[test]
    fn test_verify_truncated_stream_is_corrupted() {
        let stream = xz(&b"integrity ".repeat(500));
        assert_eq!(verify(&XzCodec, &stream[..stream.len() - 10]), IntegrityStatus::Corrupted);
    }

    #[test]
    fn test_verify_garbage_is_corrupted() {
        assert_eq!(verify(&XzCodec, &[0x13; 64]), IntegrityStatus::Corrupted);
    }

    #[test]
    fn test_verify_empty_is_unknown() {
        assert_eq!(verify(&XzCodec, &[]), IntegrityStatus::Unknown);
        assert_eq!(verify(&RejectingCodec, &[]), IntegrityStatus::Unknown);
    }

    #[test]
    fn test_rejected_header_is_corrupted_not_unknown() {
        assert_eq!(verify(&RejectingCodec, &[0x13; 64]), IntegrityStatus::Corrupted);
        assert_eq!(verify_strict(&RejectingCodec, b"x"), IntegrityStatus::Corrupted);
    }

    #[test]
    fn test_strict_verification_catches_damaged_tail() {
        let mut stream = xz(&b"checksum guarded payload".repeat(10));
        // lands in the block check or the index, both guarded in strict mode
        let pos = stream.len() - 25;
        stream[pos] ^= 0xFF;
        assert_eq!(verify_strict(&XzCodec, &stream), IntegrityStatus::Corrupted);
    }

    #[test]
    fn test_verify_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xz");
        std::fs::write(&good, xz(&vec![7u8; 300_000])).unwrap();
        assert_eq!(verify_file(&XzCodec, &good), IntegrityStatus::Ok);
        assert_eq!(verify_file(&XzCodec, dir.path().join("none.xz")), IntegrityStatus::Error);
    }

    #[test]
    fn test_verify_with_deflate_backend() {
        let stream = DeflateCodec
            .encode(b"zlib stream", 6, &FilterChain::default(), IntegrityCheck::Crc32)
            .unwrap();
        assert_eq!(verify(&DeflateCodec, &stream), IntegrityStatus::Ok);
        assert_eq!(verify(&DeflateCodec, &stream[..stream.len() - 6]), IntegrityStatus::Corrupted);
    }

    #[test]
    fn test_repair_skips_garbage_between_streams() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("damaged.xz");
        let output = dir.path().join("repaired.bin");

        let mut bytes = xz(b"first part|");
        bytes.extend_from_slice(&[0xEE; 37]);
        bytes.extend(xz(b"second part"));
        std::fs::write(&input, &bytes).unwrap();

        let report = repair_file(&XzCodec, &input, &output).unwrap();
        let repaired = std::fs::read(&output).unwrap();
        assert_eq!(repaired, b"first part|second part");
        assert!(report.restarts >= 1);
        assert!(report.bytes_skipped >= 1);
        assert!(report.complete);
        assert_eq!(report.bytes_written, repaired.len() as u64);
    }

    #[test]
    fn test_repair_of_clean_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clean.xz");
        let output = dir.path().join("clean.out");
        std::fs::write(&input, xz(b"nothing wrong here")).unwrap();
        let report = repair_file(&XzCodec, &input, &output).unwrap();
        assert!(report.complete);
        assert_eq!(report.restarts, 0);
        assert_eq!(std::fs::read(&output).unwrap(), b"nothing wrong here");
    }

    #[test]
    fn test_repair_of_pure_garbage_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("noise.bin");
        let output = dir.path().join("noise.out");
        std::fs::write(&input, vec![0xC3u8; 200]).unwrap();
        let report = repair_file(&XzCodec, &input, &output).unwrap();
        assert!(!report.complete);
        assert_eq!(report.bytes_written, 0);
    }

    #[test]
    fn test_integrity_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = IntegrityReport::for_file(&XzCodec, dir.path().join("missing.xz"));
        assert_eq!(report.integrity, IntegrityStatus::Error);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"integrity\": \"error\""));
    }
}
