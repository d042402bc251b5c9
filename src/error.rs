//! Error types for dictionary training, blob loading and packet coding.
//!
//! This module provides the [`PktzError`] type which covers every failure the
//! crate can report. Each variant belongs to one [`ErrorKind`], the coarse
//! category callers usually branch on.
//!
//! ## Error Categories
//!
//! | Kind | Errors | Description |
//! |------|--------|-------------|
//! | InvalidArgument | [`InvalidModelId`], [`PacketSizeMismatch`], [`PacketTooLarge`], [`IncompatibleLayout`], [`ConfigMismatch`] | Caller passed something unusable |
//! | OutOfMemory | [`OutOfMemory`] | A scratch or table allocation failed |
//! | DictionaryInvalid | [`BlobTooShort`], [`BadMagic`], [`BlobSizeMismatch`], [`ChecksumMismatch`], [`MalformedBlob`] | Blob is not a usable dictionary |
//! | VersionUnsupported | [`UnsupportedVersion`], [`ContextCountMismatch`] | Blob was written by an incompatible build |
//! | CorruptData | [`CorruptFrame`] | Compressed packet cannot be decoded |
//! | BufferTooSmall | [`BufferTooSmall`] | Output buffer cannot hold the result |
//! | RoundTripMismatch | [`RoundTripMismatch`] | Verification decoded different bytes |
//!
//! ## Example
//!
//! ```rust
//! use pktz::{Dictionary, ErrorKind};
//!
//! match Dictionary::load(&[0u8; 16]) {
//!     Ok(_) => unreachable!(),
//!     Err(e) => assert_eq!(e.kind(), ErrorKind::DictionaryInvalid),
//! }
//! ```
//!
//! [`InvalidModelId`]: PktzError::InvalidModelId
//! [`PacketSizeMismatch`]: PktzError::PacketSizeMismatch
//! [`PacketTooLarge`]: PktzError::PacketTooLarge
//! [`IncompatibleLayout`]: PktzError::IncompatibleLayout
//! [`ConfigMismatch`]: PktzError::ConfigMismatch
//! [`OutOfMemory`]: PktzError::OutOfMemory
//! [`BlobTooShort`]: PktzError::BlobTooShort
//! [`BadMagic`]: PktzError::BadMagic
//! [`BlobSizeMismatch`]: PktzError::BlobSizeMismatch
//! [`ChecksumMismatch`]: PktzError::ChecksumMismatch
//! [`MalformedBlob`]: PktzError::MalformedBlob
//! [`UnsupportedVersion`]: PktzError::UnsupportedVersion
//! [`ContextCountMismatch`]: PktzError::ContextCountMismatch
//! [`CorruptFrame`]: PktzError::CorruptFrame
//! [`BufferTooSmall`]: PktzError::BufferTooSmall
//! [`RoundTripMismatch`]: PktzError::RoundTripMismatch

use std::collections::TryReserveError;
use std::fmt;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    OutOfMemory,
    DictionaryInvalid,
    VersionUnsupported,
    CorruptData,
    BufferTooSmall,
    RoundTripMismatch,
}

/// Error type for pktz operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktzError {
    /// Model id 0 and 255 are reserved.
    InvalidModelId(u8),

    /// Packet sizes do not add up to the concatenated training buffer.
    PacketSizeMismatch {
        /// Sum of the declared packet sizes.
        declared: usize,
        /// Length of the buffer actually supplied.
        actual: usize,
    },

    /// Packet exceeds [`MAX_PACKET_SIZE`](crate::MAX_PACKET_SIZE).
    PacketTooLarge { len: usize, max: usize },

    /// The dictionary cannot be expressed in the requested blob version.
    ///
    /// Legacy layouts store neither a class map nor more than 4 classes.
    IncompatibleLayout { version: u8, classes: usize },

    /// A frame needs stream state or a model this context does not have.
    ConfigMismatch(&'static str),

    /// An allocation during training, loading or serialization failed.
    OutOfMemory,

    /// The blob is shorter than the smallest valid dictionary.
    BlobTooShort { len: usize, min: usize },

    /// The blob does not start with the dictionary magic number.
    BadMagic(u32),

    /// Format version outside the supported inclusive range.
    UnsupportedVersion(u8),

    /// The blob was built with a different number of context buckets.
    ContextCountMismatch { found: u8, expected: u8 },

    /// Size implied by the header (version, flags, LZP table size) does not
    /// match the buffer.
    BlobSizeMismatch { declared: usize, actual: usize },

    /// Trailing CRC32 does not match the blob contents.
    ChecksumMismatch { stored: u32, computed: u32 },

    /// Checksum passed but a field holds a value no writer produces.
    MalformedBlob(&'static str),

    /// A compressed frame is truncated or inconsistent.
    CorruptFrame(&'static str),

    /// The provided output buffer is too small.
    BufferTooSmall {
        /// Number of bytes needed.
        needed: usize,
        /// Number of bytes available.
        have: usize,
    },

    /// Decoding a freshly compressed frame did not reproduce the input.
    RoundTripMismatch { offset: usize },
}

impl PktzError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidModelId(_)
            | Self::PacketSizeMismatch { .. }
            | Self::PacketTooLarge { .. }
            | Self::IncompatibleLayout { .. }
            | Self::ConfigMismatch(_) => ErrorKind::InvalidArgument,
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::BlobTooShort { .. }
            | Self::BadMagic(_)
            | Self::BlobSizeMismatch { .. }
            | Self::ChecksumMismatch { .. }
            | Self::MalformedBlob(_) => ErrorKind::DictionaryInvalid,
            Self::UnsupportedVersion(_) | Self::ContextCountMismatch { .. } => {
                ErrorKind::VersionUnsupported
            }
            Self::CorruptFrame(_) => ErrorKind::CorruptData,
            Self::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            Self::RoundTripMismatch { .. } => ErrorKind::RoundTripMismatch,
        }
    }
}

impl fmt::Display for PktzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidModelId(id) => write!(f, "Invalid model id: {} (0 and 255 are reserved)", id),
            Self::PacketSizeMismatch { declared, actual } => write!(
                f,
                "Packet sizes sum to {} bytes but buffer holds {}",
                declared, actual
            ),
            Self::PacketTooLarge { len, max } => {
                write!(f, "Packet too large: {} bytes (max {})", len, max)
            }
            Self::IncompatibleLayout { version, classes } => write!(
                f,
                "Dictionary with {} bigram classes cannot be written as version {}",
                classes, version
            ),
            Self::ConfigMismatch(msg) => write!(f, "Context configuration mismatch: {}", msg),
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::BlobTooShort { len, min } => {
                write!(f, "Dictionary blob too short: {} bytes (min {})", len, min)
            }
            Self::BadMagic(magic) => write!(f, "Bad dictionary magic: 0x{:08x}", magic),
            Self::UnsupportedVersion(v) => write!(f, "Unsupported dictionary version: {}", v),
            Self::ContextCountMismatch { found, expected } => write!(
                f,
                "Context count mismatch: blob has {}, build expects {}",
                found, expected
            ),
            Self::BlobSizeMismatch { declared, actual } => write!(
                f,
                "Dictionary blob size mismatch: header implies {} bytes, buffer has {}",
                declared, actual
            ),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "Dictionary checksum mismatch: stored 0x{:08x}, computed 0x{:08x}",
                stored, computed
            ),
            Self::MalformedBlob(msg) => write!(f, "Malformed dictionary blob: {}", msg),
            Self::CorruptFrame(msg) => write!(f, "Corrupt frame: {}", msg),
            Self::BufferTooSmall { needed, have } => {
                write!(f, "Buffer too small: need {} bytes, have {}", needed, have)
            }
            Self::RoundTripMismatch { offset } => {
                write!(f, "Round-trip mismatch at byte {}", offset)
            }
        }
    }
}

impl std::error::Error for PktzError {}

impl From<TryReserveError> for PktzError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

pub type Result<T> = std::result::Result<T, PktzError>;

/// Allocate a vector of `len` default values, reporting failure instead of
/// aborting.
pub(crate) fn try_vec<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    try_filled(len, T::default())
}

/// Like [`try_vec`] with an explicit fill value.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, value);
    Ok(v)
}
