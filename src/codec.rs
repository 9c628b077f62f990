//! Codec boundary and the xz backend
//!
//! The advisor never compresses anything itself. Everything it measures goes
//! through a [`Codec`]: one-shot encode/decode plus a streaming decoder with
//! explicit input/output cursors.

use serde::{Deserialize, Serialize};
use xz2::stream::{Action, Check, Filters, LzmaOptions, MtStreamBuilder, Status, Stream};

use crate::error::CodecError;
use crate::parallel::ParallelPlan;

pub const MIN_PRESET: u32 = 1;
pub const MAX_PRESET: u32 = 9;
pub const DEFAULT_PRESET: u32 = 6;

/// Integrity check stored in the compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityCheck {
    None,
    Crc32,
    Crc64,
    Sha256,
}

/// One stage of a filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    X86,
    Arm,
    ArmThumb,
    PowerPc,
    Sparc,
    Ia64,
    /// Final entropy coder; `None` keeps the preset's dictionary size.
    Lzma2 { dict_size: Option<u32> },
}

impl Filter {
    pub fn is_branch_converter(&self) -> bool {
        !matches!(self, Filter::Lzma2 { .. })
    }
}

/// Ordered transforms applied before (and including) the final coder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChain(pub Vec<Filter>);

impl Default for FilterChain {
    fn default() -> Self {
        Self::lzma2(None)
    }
}

impl FilterChain {
    pub fn lzma2(dict_size: Option<u32>) -> Self {
        Self(vec![Filter::Lzma2 { dict_size }])
    }

    pub fn with_branch(branch: Filter, dict_size: Option<u32>) -> Self {
        Self(vec![branch, Filter::Lzma2 { dict_size }])
    }

    pub fn filters(&self) -> &[Filter] {
        &self.0
    }

    /// True when the chain is just the final coder at preset defaults.
    pub fn is_plain(&self) -> bool {
        self.0 == [Filter::Lzma2 { dict_size: None }]
    }

    pub fn has_branch_converter(&self) -> bool {
        self.0.iter().any(Filter::is_branch_converter)
    }

    pub fn dict_size(&self) -> Option<u32> {
        self.0.iter().find_map(|f| match f {
            Filter::Lzma2 { dict_size } => *dict_size,
            _ => None,
        })
    }
}

/// Outcome of a single streaming step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Progress was made; feed more input or call again.
    Continue,
    EndOfStream,
    /// The output buffer filled before the input was exhausted.
    OutputFull,
    /// No progress is possible with what was supplied (e.g. truncated input).
    RecoverableError,
    FatalError(CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    pub produced: usize,
    pub status: StreamStatus,
}

pub trait StreamDecoder {
    /// Decode from `input` into `output`. `finish` signals that no input
    /// follows what is passed here.
    fn feed(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> Progress;
}

pub trait Codec {
    fn name(&self) -> &'static str;

    fn encode(
        &self,
        data: &[u8],
        preset: u32,
        filters: &FilterChain,
        check: IntegrityCheck,
    ) -> Result<Vec<u8>, CodecError>;

    /// Encode with the codec's own worker threads. Backends without a
    /// multithreaded mode encode on the calling thread.
    fn encode_parallel(
        &self,
        data: &[u8],
        preset: u32,
        filters: &FilterChain,
        check: IntegrityCheck,
        _plan: &ParallelPlan,
    ) -> Result<Vec<u8>, CodecError> {
        self.encode(data, preset, filters, check)
    }

    /// Start a streaming decoder. Tolerant decoders ignore integrity check
    /// mismatches and accept concatenated streams.
    fn decoder(&self, tolerant: bool) -> Result<Box<dyn StreamDecoder>, CodecError>;

    /// Decode a whole stream, returning everything produced and the final status.
    fn decode(&self, stream: &[u8], tolerant: bool) -> Result<(Vec<u8>, StreamStatus), CodecError> {
        let mut decoder = self.decoder(tolerant)?;
        let mut output = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut pos = 0;
        loop {
            let progress = decoder.feed(&stream[pos..], &mut buf, true);
            pos += progress.consumed;
            output.extend_from_slice(&buf[..progress.produced]);
            match progress.status {
                StreamStatus::OutputFull => continue,
                StreamStatus::Continue if progress.consumed + progress.produced > 0 => continue,
                StreamStatus::Continue => return Ok((output, StreamStatus::RecoverableError)),
                status => return Ok((output, status)),
            }
        }
    }
}

/// xz container backed by liblzma.
#[derive(Debug, Clone, Copy, Default)]
pub struct XzCodec;

impl XzCodec {
    pub fn new() -> Self {
        Self
    }

    fn encoder(preset: u32, filters: &FilterChain, check: Check) -> Result<Stream, CodecError> {
        if filters.is_plain() {
            return Ok(Stream::new_easy_encoder(preset, check)?);
        }
        Ok(Stream::new_stream_encoder(&Self::filter_chain(preset, filters)?, check)?)
    }

    fn mt_encoder(
        preset: u32,
        filters: &FilterChain,
        check: Check,
        plan: &ParallelPlan,
    ) -> Result<Stream, CodecError> {
        let mut builder = MtStreamBuilder::new();
        builder
            .threads(plan.threads)
            .block_size(plan.block_size)
            .timeout_ms(plan.timeout_ms)
            .check(check);
        if filters.is_plain() {
            builder.preset(preset);
        } else {
            builder.filters(Self::filter_chain(preset, filters)?);
        }
        Ok(builder.encoder()?)
    }

    fn filter_chain(preset: u32, filters: &FilterChain) -> Result<Filters, CodecError> {
        let mut chain = Filters::new();
        for filter in filters.filters() {
            match *filter {
                Filter::X86 => chain.x86(),
                Filter::Arm => chain.arm(),
                Filter::ArmThumb => chain.arm_thumb(),
                Filter::PowerPc => chain.powerpc(),
                Filter::Sparc => chain.sparc(),
                Filter::Ia64 => chain.ia64(),
                Filter::Lzma2 { dict_size } => {
                    let mut options = LzmaOptions::new_preset(preset)?;
                    if let Some(size) = dict_size {
                        options.dict_size(size);
                    }
                    chain.lzma2(&options)
                }
            };
        }
        Ok(chain)
    }
}

/// Drive an encoder over the whole input until it reports the end of stream.
fn finish(mut stream: Stream, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut output = Vec::with_capacity(data.len() / 2 + 128);
    loop {
        if output.len() == output.capacity() {
            output.reserve(output.capacity().max(4096));
        }
        let consumed = stream.total_in() as usize;
        if let Status::StreamEnd = stream.process_vec(&data[consumed..], &mut output, Action::Finish)? {
            return Ok(output);
        }
    }
}

fn xz_check(check: IntegrityCheck) -> Check {
    match check {
        IntegrityCheck::None => Check::None,
        IntegrityCheck::Crc32 => Check::Crc32,
        IntegrityCheck::Crc64 => Check::Crc64,
        IntegrityCheck::Sha256 => Check::Sha256,
    }
}

impl Codec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn encode(
        &self,
        data: &[u8],
        preset: u32,
        filters: &FilterChain,
        check: IntegrityCheck,
    ) -> Result<Vec<u8>, CodecError> {
        if preset > MAX_PRESET {
            return Err(CodecError::Options);
        }
        finish(Self::encoder(preset, filters, xz_check(check))?, data)
    }

    fn encode_parallel(
        &self,
        data: &[u8],
        preset: u32,
        filters: &FilterChain,
        check: IntegrityCheck,
        plan: &ParallelPlan,
    ) -> Result<Vec<u8>, CodecError> {
        if !plan.is_parallel() {
            return self.encode(data, preset, filters, check);
        }
        if preset > MAX_PRESET {
            return Err(CodecError::Options);
        }
        finish(Self::mt_encoder(preset, filters, xz_check(check), plan)?, data)
    }

    fn decoder(&self, tolerant: bool) -> Result<Box<dyn StreamDecoder>, CodecError> {
        let flags = if tolerant {
            xz2::stream::CONCATENATED | xz2::stream::IGNORE_CHECK
        } else {
            0
        };
        let stream = Stream::new_stream_decoder(u64::MAX, flags)?;
        Ok(Box::new(XzDecoder { stream }))
    }
}

struct XzDecoder {
    stream: Stream,
}

impl StreamDecoder for XzDecoder {
    fn feed(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> Progress {
        let in_before = self.stream.total_in();
        let out_before = self.stream.total_out();
        let action = if finish { Action::Finish } else { Action::Run };
        let result = self.stream.process(input, output, action);
        let consumed = (self.stream.total_in() - in_before) as usize;
        let produced = (self.stream.total_out() - out_before) as usize;

        let status = match result {
            Ok(Status::StreamEnd) => StreamStatus::EndOfStream,
            Ok(_) if produced == output.len() && !output.is_empty() => StreamStatus::OutputFull,
            // liblzma reports "no progress possible" as a buffer error
            Ok(Status::MemNeeded) => StreamStatus::RecoverableError,
            Ok(_) => StreamStatus::Continue,
            Err(err) => StreamStatus::FatalError(err.into()),
        };
        Progress {
            consumed,
            produced,
            status,
        }
    }
}
