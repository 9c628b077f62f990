//! zlib/deflate backend for the codec boundary
//!
//! Deflate has no branch converters and a fixed window, so only plain
//! chains are accepted and the dictionary size is ignored. The stored
//! adler32 is always verified; tolerant mode only adds acceptance of
//! concatenated members.

use std::io::Write;

use flate2::{Decompress, FlushDecompress};

use crate::codec::{Codec, FilterChain, IntegrityCheck, Progress, StreamDecoder, StreamStatus, MAX_PRESET};
use crate::error::CodecError;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateCodec;

impl DeflateCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for DeflateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encode(
        &self,
        data: &[u8],
        preset: u32,
        filters: &FilterChain,
        _check: IntegrityCheck,
    ) -> Result<Vec<u8>, CodecError> {
        if preset > MAX_PRESET || filters.has_branch_converter() {
            return Err(CodecError::Options);
        }
        let mut encoder = flate2::write::ZlibEncoder::new(
            Vec::with_capacity(data.len() / 2 + 64),
            flate2::Compression::new(preset),
        );
        encoder.write_all(data).map_err(|_| CodecError::Memory)?;
        encoder.finish().map_err(|_| CodecError::Memory)
    }

    fn decoder(&self, tolerant: bool) -> Result<Box<dyn StreamDecoder>, CodecError> {
        Ok(Box::new(ZlibStreamDecoder {
            inner: Decompress::new(true),
            tolerant,
            member_done: false,
        }))
    }
}

struct ZlibStreamDecoder {
    inner: Decompress,
    tolerant: bool,
    member_done: bool,
}

impl StreamDecoder for ZlibStreamDecoder {
    fn feed(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> Progress {
        let mut consumed = 0;
        let mut produced = 0;
        let flush = if finish {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };

        loop {
            if self.member_done {
                if !self.tolerant || consumed == input.len() {
                    return Progress {
                        consumed,
                        produced,
                        status: StreamStatus::EndOfStream,
                    };
                }
                self.inner.reset(true);
                self.member_done = false;
            }

            let in_before = self.inner.total_in();
            let out_before = self.inner.total_out();
            let result = self
                .inner
                .decompress(&input[consumed..], &mut output[produced..], flush);
            consumed += (self.inner.total_in() - in_before) as usize;
            produced += (self.inner.total_out() - out_before) as usize;

            let status = match result {
                Ok(flate2::Status::StreamEnd) => {
                    self.member_done = true;
                    continue;
                }
                Ok(_) if produced == output.len() && !output.is_empty() => StreamStatus::OutputFull,
                Ok(flate2::Status::BufError) => StreamStatus::RecoverableError,
                Ok(flate2::Status::Ok) => StreamStatus::Continue,
                Err(_) => StreamStatus::FatalError(CodecError::Data),
            };
            return Progress {
                consumed,
                produced,
                status,
            };
        }
    }
}
