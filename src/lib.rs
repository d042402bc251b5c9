//! Small-packet entropy compression with trained dictionaries.
//!
//! pktz compresses individual network packets, typically tens to a few
//! thousand bytes, against a dictionary trained on sample traffic. Each
//! packet is coded on its own, so packets can be dropped or reordered
//! between independent (stateless) contexts.
//!
//! ## Pipeline
//!
//! ```text
//! packet ─► delta vs previous packet ─► LZP filter ─► tANS (context x class tables) ─► frame
//! ```
//!
//! - Positions are grouped into 16 context buckets, each with its own tables
//! - The bigram model also keys tables by a class of the previous byte
//! - Delta and histogram kernels dispatch to SSE4.2, AVX2 or NEON at runtime
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pktz::{Compressor, Config, Dictionary};
//!
//! let samples: Vec<Vec<u8>> = (0..8u8)
//!     .map(|i| (0..256u32).map(|j| if j < 2 { i } else { (j % 16) as u8 }).collect())
//!     .collect();
//! let refs: Vec<&[u8]> = samples.iter().map(Vec::as_slice).collect();
//! let dict = Arc::new(Dictionary::train(&refs, 1)?);
//!
//! let mut enc = Compressor::new(dict.clone(), Config::default())?;
//! let mut dec = Compressor::new(dict, Config::default())?;
//!
//! let mut frame = [0u8; 512];
//! let mut out = [0u8; 512];
//! let n = enc.compress(&samples[3], &mut frame)?;
//! if n > 0 {
//!     let m = dec.decompress(&frame[..n], &mut out)?;
//!     assert_eq!(&out[..m], samples[3].as_slice());
//! }
//! # Ok::<(), pktz::PktzError>(())
//! ```

// Unsafe is confined to the SIMD kernels; see the SAFETY comments in `simd`.

pub mod bigram;
pub mod compressor;
pub mod context;
pub mod crc32;
pub mod dictionary;
pub mod error;
pub mod freq;
pub mod lzp;
pub mod simd;
pub mod tans;

pub use compressor::{
    Compressor, Config, EntropyModel, PacketCodec, Passthrough, FRAME_HEADER_SIZE, MAX_PACKET_SIZE,
};
pub use dictionary::{
    blob_size, BlobLayout, Dictionary, TrainOptions, TrainState, Trainer, FORMAT_VERSION,
    MIN_BLOB_SIZE, MIN_FORMAT_VERSION,
};
pub use error::{ErrorKind, PktzError, Result};
pub use simd::{Kernels, SimdLevel};
