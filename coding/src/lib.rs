//! Cache Cauchy Reed-Solomon coding matrices and reconstruct erased shards.
//!
//! The numeric work (Galois-field arithmetic, Cauchy matrix construction and
//! matrix-based reconstruction) sits behind the [Backend] trait. This crate owns
//! everything around it:
//!
//! - [MatrixCache]: a bounded, thread-safe cache of coding matrices keyed by [Parameters].
//! - [marshal]: turns caller-owned shard arrays into backend buffers, synthesizing
//!   placeholders for absent shards.
//! - [Decoder]: looks up the matrix, marshals shards, runs the backend, and copies
//!   recovered data shards back to the caller.
//! - [bridge]: the boundary entry points, which translate [Error] into the host's
//!   exception/boolean conventions.
//!
//! [Galois] is the bundled backend. It implements the Cauchy "original" construction
//! and the matrix decoding technique for 8, 16 and 32-bit words.
//!
//! # Example
//! ```
//! use cauchy_coding::{cache, Decoder, Erasures, Galois, MatrixCache, Parameters, WordSize};
//! use std::num::NonZeroU16;
//!
//! let parameters = Parameters::new(
//!     NonZeroU16::new(4).unwrap(),
//!     NonZeroU16::new(2).unwrap(),
//!     WordSize::W8,
//! );
//! let decoder = Decoder::new(MatrixCache::new(Galois, cache::Config::default()));
//!
//! // Produce coding shards for some data.
//! let original: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 16]).collect();
//! let matrix = decoder.cache().get_or_create(&parameters).unwrap();
//! let mut coding = vec![vec![0u8; 16]; 2];
//! Galois::encode(&parameters, matrix.coefficients(), &original, &mut coding).unwrap();
//!
//! // Lose two data shards and recover them.
//! let mut data: Vec<Option<Vec<u8>>> = original.iter().cloned().map(Some).collect();
//! data[1] = None;
//! data[3] = None;
//! let coding: Vec<Option<Vec<u8>>> = coding.into_iter().map(Some).collect();
//! let erasures = Erasures::new([1, 3]);
//! decoder
//!     .decode(&parameters, false, &erasures, &mut data, &coding, 16)
//!     .unwrap();
//! assert_eq!(data[1].as_deref(), Some(&original[1][..]));
//! assert_eq!(data[3].as_deref(), Some(&original[3][..]));
//! ```

use std::{fmt, num::NonZeroU16};

pub mod bridge;
pub mod cache;
pub use cache::MatrixCache;
mod decoder;
pub use decoder::{Decoder, Erasures};
mod error;
pub use error::{Error, Signal, ALLOCATION_FAILED, LOOKUP_FAILED};
pub mod galois;
pub use galois::Galois;
pub mod marshal;
pub use marshal::Buffer;
#[cfg(test)]
mod mocks;

/// The bit-width of the field elements a coding matrix operates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WordSize {
    /// GF(2^8): one byte per word.
    W8,
    /// GF(2^16): two little-endian bytes per word.
    W16,
    /// GF(2^32): four little-endian bytes per word.
    W32,
}

impl WordSize {
    /// Parse a word size from its width in bits.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::W8),
            16 => Some(Self::W16),
            32 => Some(Self::W32),
            _ => None,
        }
    }

    /// Width of a word in bits.
    pub const fn bits(&self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
        }
    }

    /// Width of a word in bytes.
    pub const fn bytes(&self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
        }
    }
}

/// The dimensions of a code: `k` data shards, `m` coding shards, `w`-bit words.
///
/// Two [Parameters] identify the same coding matrix if and only if they are equal,
/// so the struct is used directly as the [MatrixCache] key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Parameters {
    /// Number of data shards (`k`).
    pub data_shards: NonZeroU16,
    /// Number of coding shards (`m`).
    pub coding_shards: NonZeroU16,
    /// Word size (`w`).
    pub word_size: WordSize,
}

impl Parameters {
    /// Create parameters from already validated parts.
    pub const fn new(
        data_shards: NonZeroU16,
        coding_shards: NonZeroU16,
        word_size: WordSize,
    ) -> Self {
        Self {
            data_shards,
            coding_shards,
            word_size,
        }
    }

    /// Create parameters from the raw integers passed across the boundary.
    pub fn from_raw(k: i32, m: i32, w: i32) -> Result<Self, Error> {
        let invalid = || Error::InvalidParameters { k, m, w };
        let data_shards = u16::try_from(k)
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or_else(invalid)?;
        let coding_shards = u16::try_from(m)
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or_else(invalid)?;
        let word_size = u32::try_from(w)
            .ok()
            .and_then(WordSize::from_bits)
            .ok_or_else(invalid)?;
        Ok(Self::new(data_shards, coding_shards, word_size))
    }

    /// Number of data shards (`k`).
    pub fn k(&self) -> usize {
        usize::from(self.data_shards.get())
    }

    /// Number of coding shards (`m`).
    pub fn m(&self) -> usize {
        usize::from(self.coding_shards.get())
    }

    /// Total number of shards (`k + m`).
    pub fn total_shards(&self) -> usize {
        self.k() + self.m()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "k={} m={} w={}",
            self.data_shards,
            self.coding_shards,
            self.word_size.bits()
        )
    }
}

/// An immutable coding matrix over GF(2^w).
///
/// The matrix has `m` rows and `k` columns, stored row-major: row `i` holds the
/// coefficients that combine the `k` data shards into coding shard `i`.
#[derive(Clone, PartialEq, Eq)]
pub struct CodingMatrix {
    parameters: Parameters,
    coefficients: Box<[u32]>,
}

impl CodingMatrix {
    /// Wrap coefficients produced by a [Backend].
    ///
    /// Returns `None` if the number of coefficients is not `k * m`.
    pub fn new(parameters: Parameters, coefficients: Vec<u32>) -> Option<Self> {
        if coefficients.len() != parameters.k() * parameters.m() {
            return None;
        }
        Some(Self {
            parameters,
            coefficients: coefficients.into_boxed_slice(),
        })
    }

    /// The dimensions this matrix was constructed for.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// All coefficients, row-major.
    pub fn coefficients(&self) -> &[u32] {
        &self.coefficients
    }
}

impl fmt::Debug for CodingMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodingMatrix")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A fixed-function numeric library that constructs coding matrices and
/// reconstructs erased shards.
///
/// Implementations must be deterministic: the same [Parameters] always produce the
/// same coefficients.
pub trait Backend: Send + Sync + 'static {
    /// The failure reported by [Backend::decode].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct the `m * k` coding matrix for `parameters`.
    ///
    /// Returns `None` if no matrix can be constructed.
    fn generate(&self, parameters: &Parameters) -> Option<Vec<u32>>;

    /// Reconstruct the shards listed in `erasures`.
    ///
    /// `data` holds `k` buffers and `coding` holds `m` buffers, each `shard_size`
    /// bytes long. On success, every buffer named in `erasures` holds the
    /// reconstructed content. Buffers must only be written through
    /// [std::borrow::Cow::to_mut], so borrowed shards are never modified in place.
    #[allow(clippy::too_many_arguments)]
    fn decode<'a>(
        &self,
        parameters: &Parameters,
        matrix: &[u32],
        row_k_ones: bool,
        erasures: &Erasures,
        data: &mut [Buffer<'a>],
        coding: &mut [Buffer<'a>],
        shard_size: usize,
    ) -> Result<(), Self::Error>;
}
