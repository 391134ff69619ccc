//! Entry points for the host runtime.
//!
//! The host expects two failure channels: setup failures raise an [Exception], while
//! a failed reconstruction returns `false`. Everything below this module reports
//! failures through [Error]; the translation happens here and nowhere else.

use crate::{
    Backend, CodingMatrix, Decoder, Erasures, Error, Parameters, Signal, WordSize,
    ALLOCATION_FAILED, LOOKUP_FAILED,
};
use std::{fmt, num::NonZeroU16};
use thiserror::Error;
use tracing::warn;

/// An exception raised into the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Exception {
    /// Text the host exception carries.
    pub message: String,
}

impl Exception {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The host-facing surface of a [Decoder].
pub struct Bridge<B: Backend> {
    decoder: Decoder<B>,
}

impl<B: Backend> Bridge<B> {
    /// Wrap `decoder` for the host.
    pub fn new(decoder: Decoder<B>) -> Self {
        Self { decoder }
    }

    /// The decoder behind every entry point.
    pub fn decoder(&self) -> &Decoder<B> {
        &self.decoder
    }

    /// Construct a coding matrix without touching the cache.
    ///
    /// Any failure, including parameters no matrix exists for, raises
    /// [ALLOCATION_FAILED].
    pub fn create_cauchy_matrix(
        &self,
        k: i32,
        m: i32,
        w: i32,
    ) -> Result<CodingMatrix, Exception> {
        Parameters::from_raw(k, m, w)
            .and_then(|parameters| self.decoder.cache().create(&parameters))
            .map_err(|err| {
                warn!(k, m, w, ?err, "matrix construction failed");
                Exception::new(ALLOCATION_FAILED)
            })
    }

    /// Release every cached matrix.
    pub fn clean_up_cauchy_matrix(&self) {
        self.decoder.cleanup();
    }

    /// Reconstruct erased data shards in `data`.
    ///
    /// `erasures` is terminated by the first negative entry. Returns `Ok(false)` if the
    /// reconstruction itself failed (caller buffers are then untouched) and raises if
    /// no matrix could be obtained or the shards are malformed.
    #[allow(clippy::too_many_arguments)]
    pub fn jerasure_decode(
        &self,
        k: i32,
        m: i32,
        w: i32,
        row_k_ones: i32,
        erasures: &[i32],
        data: &mut [Option<Vec<u8>>],
        coding: &[Option<Vec<u8>>],
        size: i32,
    ) -> Result<bool, Exception> {
        let parameters = Parameters::from_raw(k, m, w).map_err(|err| {
            warn!(k, m, w, ?err, "no coding matrix for decode");
            Exception::new(LOOKUP_FAILED)
        })?;
        let shard_size = usize::try_from(size).map_err(|_| Error::InvalidSize(size));
        let result = shard_size.and_then(|shard_size| {
            self.decoder.decode(
                &parameters,
                row_k_ones != 0,
                &Erasures::from_terminated(erasures),
                data,
                coding,
                shard_size,
            )
        });
        match result {
            Ok(()) => Ok(true),
            Err(err) => match err.signal() {
                Signal::ReturnFalse => Ok(false),
                Signal::Raise(message) => Err(Exception::new(message)),
            },
        }
    }

    /// Create a [Codec] over 8-bit words.
    pub fn codec(
        &self,
        data_blocks: i32,
        coding_blocks: i32,
        packet_size: i32,
    ) -> Result<Codec<'_, B>, Error> {
        let invalid = || Error::InvalidParameters {
            k: data_blocks,
            m: coding_blocks,
            w: 8,
        };
        let data_blocks = u16::try_from(data_blocks)
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or_else(invalid)?;
        let coding_blocks = u16::try_from(coding_blocks)
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or_else(invalid)?;
        let packet_size = usize::try_from(packet_size)
            .ok()
            .filter(|&size| size > 0)
            .ok_or(Error::InvalidSize(packet_size))?;
        Ok(Codec {
            decoder: &self.decoder,
            parameters: Parameters::new(data_blocks, coding_blocks, WordSize::W8),
            packet_size,
        })
    }
}

/// A fixed code shape with a fixed packet size.
pub struct Codec<'a, B: Backend> {
    decoder: &'a Decoder<B>,
    parameters: Parameters,
    packet_size: usize,
}

impl<B: Backend> Codec<'_, B> {
    /// Number of data blocks (`k`).
    pub fn data_blocks(&self) -> usize {
        self.parameters.k()
    }

    /// Number of coding blocks (`m`).
    pub fn coding_blocks(&self) -> usize {
        self.parameters.m()
    }

    /// Size of every block in bytes.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// The code dimensions, with `w` fixed at 8.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Reconstruct the erased data blocks in `data`. Every block is `packet_size` bytes.
    pub fn decode(
        &self,
        data: &mut [Option<Vec<u8>>],
        coding: &[Option<Vec<u8>>],
        erasures: &Erasures,
    ) -> Result<(), Error> {
        self.decoder.decode(
            &self.parameters,
            false,
            erasures,
            data,
            coding,
            self.packet_size,
        )
    }
}

impl<B: Backend> Clone for Codec<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Codec<'_, B> {}

impl<B: Backend> PartialEq for Codec<'_, B> {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters && self.packet_size == other.packet_size
    }
}

impl<B: Backend> Eq for Codec<'_, B> {}

impl<B: Backend> fmt::Debug for Codec<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("data_blocks", &self.data_blocks())
            .field("coding_blocks", &self.coding_blocks())
            .field("packet_size", &self.packet_size)
            .finish()
    }
}
