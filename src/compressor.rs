//! Per-packet compression contexts.
//!
//! A [`Compressor`] codes single packets against a shared [`Dictionary`].
//! In stateful mode it also remembers the previous packet (for positional
//! delta) and adapts a private copy of the LZP table; the encoding and the
//! decoding side must see the same sequence of frames to stay in sync.
//!
//! ## Frame format
//!
//! | Offset | Field | Size |
//! |--------|-------|------|
//! | 0 | flags: bit 0 delta, bit 1 LZP, bit 2 bigram model | 1 |
//! | 1 | original length, u16 LE | 2 |
//! | 3 | tANS bitstream | .. |
//!
//! A frame is either an LZP frame, which filters the raw packet the way the
//! dictionary was trained, or a delta frame, which codes the residual against
//! the previous packet without LZP. Stateful contexts try both and keep the
//! shorter one.
//!
//! `compress` returns 0 when the frame would not be smaller than the packet.
//! The caller then stores the packet raw; no stream state advances.

use std::sync::Arc;

use crate::context::context_spans;
use crate::dictionary::Dictionary;
use crate::error::{PktzError, Result};
use crate::freq::{TABLE_LOG, TABLE_SIZE};
use crate::lzp::LzpTable;
use crate::simd::{Kernels, SimdLevel};
use crate::tans::{BackwardBitReader, BitWriter, TansTable};

/// Largest packet a frame can describe.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

pub const FRAME_HEADER_SIZE: usize = 3;

pub const FRAME_FLAG_DELTA: u8 = 0x01;
pub const FRAME_FLAG_LZP: u8 = 0x02;
pub const FRAME_FLAG_BIGRAM: u8 = 0x04;
const FRAME_FLAGS_KNOWN: u8 = FRAME_FLAG_DELTA | FRAME_FLAG_LZP | FRAME_FLAG_BIGRAM;

/// Which tables code each byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntropyModel {
    /// One table per context bucket.
    Unigram,
    /// One table per context bucket and class of the previous byte.
    #[default]
    Bigram,
}

/// Compressor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Keep state between packets.
    pub stateful: bool,
    /// Allow delta frames against the previous packet (stateful only).
    pub delta: bool,
    /// Use the dictionary's LZP table. Must stay on for dictionaries that
    /// have one, since their tables are fitted to filtered bytes.
    pub lzp: bool,
    pub model: EntropyModel,
    /// Kernel level; `None` picks the best the CPU supports.
    pub simd_level: Option<SimdLevel>,
    /// Decode every frame before returning it and fail on mismatch.
    pub verify_roundtrip: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stateful: true,
            delta: true,
            lzp: true,
            model: EntropyModel::Bigram,
            simd_level: None,
            verify_roundtrip: false,
        }
    }
}

impl Config {
    /// Default configuration without inter-packet state.
    pub fn stateless() -> Self {
        Self {
            stateful: false,
            delta: false,
            ..Self::default()
        }
    }
}

/// The surface packet harnesses drive: one codec per thread.
pub trait PacketCodec {
    /// Compress `input` into `output`. Returns the frame length, or 0 when
    /// the packet should be stored raw.
    fn compress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;

    /// Decode one frame into `output`. Returns the packet length.
    fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;

    /// Forget all inter-packet state.
    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

/// Dictionary-free codec: never compresses, decompression is a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl PacketCodec for Passthrough {
    fn compress(&mut self, input: &[u8], _output: &mut [u8]) -> Result<usize> {
        if input.len() > MAX_PACKET_SIZE {
            return Err(PktzError::PacketTooLarge {
                len: input.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(0)
    }

    fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        if output.len() < input.len() {
            return Err(PktzError::BufferTooSmall {
                needed: input.len(),
                have: output.len(),
            });
        }
        output[..input.len()].copy_from_slice(input);
        Ok(input.len())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Inter-packet state of a stateful context.
#[derive(Debug)]
struct StreamState {
    prev: Vec<u8>,
    /// Rolling copy of the dictionary's LZP table.
    lzp: Option<LzpTable>,
}

impl StreamState {
    fn commit(&mut self, dict: &Dictionary, packet: &[u8]) {
        self.prev.clear();
        self.prev.extend_from_slice(packet);
        if let (Some(overlay), Some(base)) = (self.lzp.as_mut(), dict.lzp()) {
            overlay.learn(base, packet);
        }
    }

    fn reset(&mut self, dict: &Dictionary) {
        self.prev.clear();
        if let (Some(overlay), Some(base)) = (self.lzp.as_mut(), dict.lzp()) {
            overlay.reset_from(base);
        }
    }
}

#[derive(Debug, Default)]
struct Buffers {
    residual: Vec<u8>,
    filtered: Vec<u8>,
}

#[derive(Debug, Default)]
struct Scratch {
    work: Buffers,
    check: Buffers,
    stream: Vec<u8>,
    alt_stream: Vec<u8>,
    decoded: Vec<u8>,
}

/// Everything one frame is coded against.
struct FrameContext<'a> {
    dict: &'a Dictionary,
    kernels: &'a Kernels,
    /// Previous packet; `None` in stateless mode
    prev: Option<&'a [u8]>,
    lzp: Option<&'a LzpTable>,
}

impl<'a> FrameContext<'a> {
    fn new(dict: &'a Dictionary, config: &Config, kernels: &'a Kernels, state: &'a StreamState) -> Self {
        let lzp = match (config.lzp, config.stateful) {
            (false, _) => None,
            (true, true) => state.lzp.as_ref(),
            (true, false) => dict.lzp(),
        };
        Self {
            dict,
            kernels,
            prev: config.stateful.then_some(state.prev.as_slice()),
            lzp,
        }
    }

    fn table(&self, bigram: bool, ctx: usize, prev: u8) -> &'a TansTable {
        if bigram {
            self.dict.bigram_table(ctx, self.dict.class_map().class_of(prev))
        } else {
            self.dict.unigram_table(ctx)
        }
    }
}

/// Resize `buf` to `len` bytes, reporting allocation failure.
fn fit(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    buf.clear();
    buf.try_reserve(len)?;
    buf.resize(len, 0);
    Ok(())
}

/// tANS-code `symbols` into `out`, last symbol first.
fn encode_symbols(ctx: &FrameContext<'_>, bigram: bool, symbols: &[u8], out: &mut Vec<u8>) -> Result<()> {
    out.clear();
    out.try_reserve(symbols.len() * 3 / 2 + 4)?;
    let mut writer = BitWriter::new(out);
    let mut state = TABLE_SIZE as u32;
    for (bucket, range) in context_spans(symbols.len()).rev() {
        for i in range.rev() {
            let prev = if i == 0 { 0 } else { symbols[i - 1] };
            ctx.table(bigram, bucket, prev).encode(&mut state, symbols[i], &mut writer);
        }
    }
    writer.write_bits(state - TABLE_SIZE as u32, TABLE_LOG);
    writer.finish();
    Ok(())
}

/// Apply the transforms `flags` selects to `input` and code the result.
fn encode_body(ctx: &FrameContext<'_>, flags: u8, input: &[u8], bufs: &mut Buffers, out: &mut Vec<u8>) -> Result<()> {
    let len = input.len();
    fit(&mut bufs.residual, len)?;
    match ctx.prev.filter(|_| flags & FRAME_FLAG_DELTA != 0) {
        Some(prev) => ctx.kernels.delta_encode(input, prev, &mut bufs.residual),
        None => bufs.residual.copy_from_slice(input),
    }
    fit(&mut bufs.filtered, len)?;
    match ctx.lzp.filter(|_| flags & FRAME_FLAG_LZP != 0) {
        Some(lzp) => lzp.filter(&bufs.residual, &mut bufs.filtered),
        None => bufs.filtered.copy_from_slice(&bufs.residual),
    }
    encode_symbols(ctx, flags & FRAME_FLAG_BIGRAM != 0, &bufs.filtered, out)
}

/// Inverse of [`encode_symbols`]; fills all of `out`.
fn decode_symbols(ctx: &FrameContext<'_>, bigram: bool, stream: &[u8], out: &mut [u8]) -> Result<()> {
    let mut reader = BackwardBitReader::new(stream)?;
    let mut state = reader.read_bits(TABLE_LOG)? as usize;
    let mut prev = 0u8;
    for (bucket, range) in context_spans(out.len()) {
        for i in range {
            let entry = ctx.table(bigram, bucket, prev).decode_entry(state);
            out[i] = entry.symbol;
            prev = entry.symbol;
            state = usize::from(entry.base) + reader.read_bits(u32::from(entry.nb_bits))? as usize;
        }
    }
    if state != 0 || reader.remaining_bits() != 0 {
        return Err(PktzError::CorruptFrame("bitstream does not end at the initial state"));
    }
    Ok(())
}

/// Decode `frame` into `out` without touching stream state.
fn decode_frame(ctx: &FrameContext<'_>, frame: &[u8], out: &mut [u8], bufs: &mut Buffers) -> Result<usize> {
    if frame.len() < FRAME_HEADER_SIZE {
        return Err(PktzError::CorruptFrame("truncated frame header"));
    }
    let flags = frame[0];
    let len = usize::from(u16::from_le_bytes([frame[1], frame[2]]));
    if flags & !FRAME_FLAGS_KNOWN != 0 {
        return Err(PktzError::CorruptFrame("unknown frame flags"));
    }
    let prev = if flags & FRAME_FLAG_DELTA != 0 {
        Some(
            ctx.prev
                .ok_or(PktzError::ConfigMismatch("delta frame needs a stateful context"))?,
        )
    } else {
        None
    };
    let lzp = if flags & FRAME_FLAG_LZP != 0 {
        Some(
            ctx.lzp
                .ok_or(PktzError::ConfigMismatch("LZP frame needs an LZP-enabled context"))?,
        )
    } else {
        None
    };
    if out.len() < len {
        return Err(PktzError::BufferTooSmall {
            needed: len,
            have: out.len(),
        });
    }

    fit(&mut bufs.filtered, len)?;
    decode_symbols(ctx, flags & FRAME_FLAG_BIGRAM != 0, &frame[FRAME_HEADER_SIZE..], &mut bufs.filtered)?;

    fit(&mut bufs.residual, len)?;
    match lzp {
        Some(lzp) => lzp.unfilter(&bufs.filtered, &mut bufs.residual),
        None => bufs.residual.copy_from_slice(&bufs.filtered),
    }

    let out = &mut out[..len];
    match prev {
        Some(prev) => ctx.kernels.delta_decode(&bufs.residual, prev, out),
        None => out.copy_from_slice(&bufs.residual),
    }
    Ok(len)
}

/// Compression context bound to one dictionary.
///
/// Dropping the context releases its state; the dictionary lives on as long
/// as other contexts hold it.
#[derive(Debug)]
pub struct Compressor {
    dict: Arc<Dictionary>,
    config: Config,
    kernels: Kernels,
    state: StreamState,
    scratch: Scratch,
}

impl Compressor {
    pub fn new(dict: Arc<Dictionary>, config: Config) -> Result<Self> {
        if !config.lzp && dict.has_lzp() {
            return Err(PktzError::ConfigMismatch(
                "dictionary tables are fitted to LZP-filtered bytes",
            ));
        }
        let kernels = Kernels::new(config.simd_level);
        let mut prev = Vec::new();
        if config.stateful {
            prev.try_reserve_exact(MAX_PACKET_SIZE)?;
        }
        let lzp = if config.stateful && config.lzp {
            dict.lzp().cloned()
        } else {
            None
        };
        tracing::debug!(
            model_id = dict.model_id(),
            simd = %kernels.level(),
            stateful = config.stateful,
            "compressor created"
        );
        Ok(Self {
            dict,
            config,
            kernels,
            state: StreamState { prev, lzp },
            scratch: Scratch::default(),
        })
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dict
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Kernel level actually in use.
    pub fn simd_level(&self) -> SimdLevel {
        self.kernels.level()
    }

    /// Compress one packet. Returns the frame length, or 0 to store raw.
    pub fn compress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let len = input.len();
        if len > MAX_PACKET_SIZE {
            return Err(PktzError::PacketTooLarge {
                len,
                max: MAX_PACKET_SIZE,
            });
        }
        let ctx = FrameContext::new(&self.dict, &self.config, &self.kernels, &self.state);
        let scratch = &mut self.scratch;

        let model = match self.config.model {
            EntropyModel::Bigram => FRAME_FLAG_BIGRAM,
            EntropyModel::Unigram => 0,
        };
        let mut flags = model | if ctx.lzp.is_some() { FRAME_FLAG_LZP } else { 0 };
        encode_body(&ctx, flags, input, &mut scratch.work, &mut scratch.stream)?;

        if ctx.prev.is_some_and(|prev| self.config.delta && !prev.is_empty()) {
            let delta_flags = model | FRAME_FLAG_DELTA;
            encode_body(&ctx, delta_flags, input, &mut scratch.check, &mut scratch.alt_stream)?;
            if scratch.alt_stream.len() < scratch.stream.len() {
                std::mem::swap(&mut scratch.stream, &mut scratch.alt_stream);
                flags = delta_flags;
            }
        }

        let frame_len = FRAME_HEADER_SIZE + scratch.stream.len();
        if frame_len >= len {
            tracing::trace!(len, frame_len, "packet incompressible, storing raw");
            return Ok(0);
        }
        if output.len() < frame_len {
            return Err(PktzError::BufferTooSmall {
                needed: frame_len,
                have: output.len(),
            });
        }
        let frame = &mut output[..frame_len];
        frame[0] = flags;
        frame[1..FRAME_HEADER_SIZE].copy_from_slice(&(len as u16).to_le_bytes());
        frame[FRAME_HEADER_SIZE..].copy_from_slice(&scratch.stream);

        if self.config.verify_roundtrip {
            fit(&mut scratch.decoded, len)?;
            let decoded = decode_frame(&ctx, frame, &mut scratch.decoded, &mut scratch.check);
            let mismatch = match decoded {
                Ok(n) if n == len && scratch.decoded[..] == *input => None,
                _ => Some(
                    scratch
                        .decoded
                        .iter()
                        .zip(input)
                        .position(|(a, b)| a != b)
                        .unwrap_or(len),
                ),
            };
            if let Some(offset) = mismatch {
                tracing::error!(
                    len,
                    offset,
                    model_id = self.dict.model_id(),
                    "compressed frame does not decode to its input"
                );
                return Err(PktzError::RoundTripMismatch { offset });
            }
        }

        tracing::trace!(len, frame_len, flags, "packet compressed");
        if self.config.stateful {
            self.state.commit(&self.dict, input);
        }
        Ok(frame_len)
    }

    /// Decode one frame produced by a context with the same configuration.
    pub fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let ctx = FrameContext::new(&self.dict, &self.config, &self.kernels, &self.state);
        let len = decode_frame(&ctx, input, output, &mut self.scratch.work)?;
        tracing::trace!(frame_len = input.len(), len, "packet decompressed");
        if self.config.stateful {
            self.state.commit(&self.dict, &output[..len]);
        }
        Ok(len)
    }

    /// Forget the previous packet and restore the LZP table.
    pub fn reset(&mut self) {
        self.state.reset(&self.dict);
    }
}

impl PacketCodec for Compressor {
    fn compress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        Compressor::compress(self, input, output)
    }

    fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        Compressor::decompress(self, input, output)
    }

    fn reset(&mut self) {
        Compressor::reset(self);
    }

    fn name(&self) -> &'static str {
        "pktz"
    }
}
