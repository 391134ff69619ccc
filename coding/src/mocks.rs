//! Backends for exercising failure and construction paths in tests.

use crate::{Backend, Buffer, Erasures, Galois, Parameters};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;

/// [Galois], counting every matrix it constructs.
#[derive(Clone, Default)]
pub struct Counting {
    generated: Arc<AtomicUsize>,
}

impl Counting {
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

impl Backend for Counting {
    type Error = <Galois as Backend>::Error;

    fn generate(&self, parameters: &Parameters) -> Option<Vec<u32>> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        Galois.generate(parameters)
    }

    fn decode<'a>(
        &self,
        parameters: &Parameters,
        matrix: &[u32],
        row_k_ones: bool,
        erasures: &Erasures,
        data: &mut [Buffer<'a>],
        coding: &mut [Buffer<'a>],
        shard_size: usize,
    ) -> Result<(), Self::Error> {
        Galois.decode(
            parameters, matrix, row_k_ones, erasures, data, coding, shard_size,
        )
    }
}

#[derive(Error, Debug)]
#[error("status -1")]
pub struct Status;

/// A backend that fails on request.
///
/// A failing decode first scribbles over every buffer it was handed, so tests can
/// check that nothing reaches the caller.
#[derive(Clone, Copy)]
pub struct Failing {
    generate: bool,
    decode: bool,
}

impl Failing {
    /// Fail matrix construction.
    pub fn on_generate() -> Self {
        Self {
            generate: true,
            decode: false,
        }
    }

    /// Construct matrices normally but fail every decode.
    pub fn on_decode() -> Self {
        Self {
            generate: false,
            decode: true,
        }
    }
}

impl Backend for Failing {
    type Error = Status;

    fn generate(&self, parameters: &Parameters) -> Option<Vec<u32>> {
        if self.generate {
            return None;
        }
        Galois.generate(parameters)
    }

    fn decode<'a>(
        &self,
        _parameters: &Parameters,
        _matrix: &[u32],
        _row_k_ones: bool,
        _erasures: &Erasures,
        data: &mut [Buffer<'a>],
        coding: &mut [Buffer<'a>],
        _shard_size: usize,
    ) -> Result<(), Self::Error> {
        if !self.decode {
            return Ok(());
        }
        for buffer in data.iter_mut().chain(coding.iter_mut()) {
            buffer.to_mut().fill(0xFF);
        }
        Err(Status)
    }
}
