//! Cauchy Reed-Solomon over GF(2^w) using the matrix decoding technique.
//!
//! [Galois] is the bundled [Backend]:
//!
//! - [Backend::generate] builds the "original" Cauchy matrix, where row `i` and
//!   column `j` hold `1 / (i ^ (m + j))`. Construction fails if `k + m > 2^w`.
//! - [Backend::decode] picks the first `k` surviving shards, inverts the matching
//!   rows of the generator matrix, and recomputes every erased data shard from the
//!   survivors. Erased coding shards are then re-encoded from the data.
//!
//! When `row_k_ones` is set (the first coding row is all ones) and coding shard `0`
//! survived, the last erased data shard is recovered from that parity row with a
//! plain XOR-sum, and a single data erasure needs no matrix inversion at all.

use crate::{Backend, Buffer, Erasures, Parameters};
use thiserror::Error;

mod field;
use field::{field, Field};

/// Errors reported by the [Galois] backend.
#[derive(Error, Debug)]
pub enum Error {
    #[error("too many erasures: {erased} (maximum {coding_shards})")]
    TooManyErasures { erased: usize, coding_shards: usize },
    #[error("invalid erasure index: {index} (total shards {total})")]
    InvalidErasure { index: usize, total: usize },
    #[error("singular decoding matrix")]
    SingularMatrix,
    #[error("invalid matrix size: expected {expected}, got {actual}")]
    InvalidMatrix { expected: usize, actual: usize },
    #[error("invalid shard count: expected {expected}, got {actual}")]
    InvalidShardCount { expected: usize, actual: usize },
    #[error("invalid shard length at {index}: expected {expected}, got {actual}")]
    InvalidShardLength {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("shard size {shard_size} is not a multiple of {word_bytes} bytes")]
    UnalignedShardSize {
        shard_size: usize,
        word_bytes: usize,
    },
}

/// Cauchy Reed-Solomon over GF(2^8), GF(2^16) and GF(2^32).
#[derive(Clone, Copy, Debug, Default)]
pub struct Galois;

impl Galois {
    /// Compute all `m` coding shards from the `k` data shards.
    pub fn encode<D: AsRef<[u8]>, C: AsMut<[u8]>>(
        parameters: &Parameters,
        matrix: &[u32],
        data: &[D],
        coding: &mut [C],
    ) -> Result<(), Error> {
        let (k, m) = (parameters.k(), parameters.m());
        check_matrix(parameters, matrix)?;
        check_count(data.len(), k)?;
        check_count(coding.len(), m)?;
        let shard_size = data[0].as_ref().len();
        check_alignment(parameters, shard_size)?;
        for (index, shard) in data.iter().enumerate() {
            check_length(index, shard.as_ref().len(), shard_size)?;
        }

        let f = field(parameters.word_size);
        for (row, shard) in coding.iter_mut().enumerate() {
            let dst = shard.as_mut();
            check_length(k + row, dst.len(), shard_size)?;
            let coefficients = &matrix[row * k..(row + 1) * k];
            combine(f, dst, coefficients, data.iter().map(|shard| shard.as_ref()));
        }
        Ok(())
    }
}

impl Backend for Galois {
    type Error = Error;

    fn generate(&self, parameters: &Parameters) -> Option<Vec<u32>> {
        let f = field(parameters.word_size);
        let (k, m) = (parameters.k(), parameters.m());
        if (k + m) as u64 > f.order() {
            return None;
        }

        let mut matrix = Vec::with_capacity(k * m);
        for i in 0..m {
            for j in 0..k {
                matrix.push(f.inverse((i ^ (m + j)) as u32));
            }
        }
        Some(matrix)
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
    ) -> Result<(), Error> {
        let (k, m) = (parameters.k(), parameters.m());
        check_matrix(parameters, matrix)?;
        check_count(data.len(), k)?;
        check_count(coding.len(), m)?;
        check_alignment(parameters, shard_size)?;
        for (index, shard) in data.iter().chain(coding.iter()).enumerate() {
            check_length(index, shard.len(), shard_size)?;
        }
        let erased = erased(parameters, erasures)?;
        let f = field(parameters.word_size);

        // With a usable parity row, the last erased data shard is left for it.
        let parity = row_k_ones && !erased[k];
        let last = if parity {
            erased[..k].iter().rposition(|&e| e)
        } else {
            None
        };

        if (0..k).any(|i| erased[i] && Some(i) != last) {
            let (decoding, ids) = decoding_matrix(f, parameters, matrix, &erased)?;
            for i in (0..k).filter(|&i| erased[i] && Some(i) != last) {
                let coefficients = &decoding[i * k..(i + 1) * k];
                recover(f, data, coding, i, coefficients, ids.iter().copied());
            }
        }

        if let Some(last) = last {
            let ids = (0..k).map(|j| if j == last { k } else { j });
            recover(f, data, coding, last, &matrix[..k], ids);
        }

        for row in (0..m).filter(|&row| erased[k + row]) {
            let coefficients = &matrix[row * k..(row + 1) * k];
            recover(f, data, coding, k + row, coefficients, 0..k);
        }
        Ok(())
    }
}

/// Recompute shard `dest` as the dot product of `coefficients` with the shards `ids`.
///
/// `ids` must not contain `dest`.
fn recover<'a>(
    f: &Field,
    data: &mut [Buffer<'a>],
    coding: &mut [Buffer<'a>],
    dest: usize,
    coefficients: &[u32],
    ids: impl Iterator<Item = usize>,
) {
    let k = data.len();
    let slot = if dest < k {
        &mut data[dest]
    } else {
        &mut coding[dest - k]
    };
    let mut dst = std::mem::take(slot);
    {
        let (data, coding) = (&*data, &*coding);
        let sources = ids.map(|id| source(data, coding, k, id));
        combine(f, dst.to_mut(), coefficients, sources);
    }
    if dest < k {
        data[dest] = dst;
    } else {
        coding[dest - k] = dst;
    }
}

/// Overwrite `dst` with the dot product of `coefficients` and `sources`.
fn combine<'a>(
    f: &Field,
    dst: &mut [u8],
    coefficients: &[u32],
    sources: impl Iterator<Item = &'a [u8]>,
) {
    dst.fill(0);
    for (&coefficient, src) in coefficients.iter().zip(sources) {
        f.mul_add(dst, src, coefficient);
    }
}

/// Resolve a shard id in `[0, k + m)` to its buffer.
fn source<'a>(
    data: &'a [Buffer<'_>],
    coding: &'a [Buffer<'_>],
    k: usize,
    id: usize,
) -> &'a [u8] {
    if id < k {
        &data[id]
    } else {
        &coding[id - k]
    }
}

/// Mark erased shards, rejecting out-of-range ids and more than `m` erasures.
fn erased(parameters: &Parameters, erasures: &Erasures) -> Result<Vec<bool>, Error> {
    let total = parameters.total_shards();
    let mut erased = vec![false; total];
    let mut count = 0;
    for index in erasures.iter() {
        if index >= total {
            return Err(Error::InvalidErasure { index, total });
        }
        if !erased[index] {
            erased[index] = true;
            count += 1;
        }
    }
    if count > parameters.m() {
        return Err(Error::TooManyErasures {
            erased: count,
            coding_shards: parameters.m(),
        });
    }
    Ok(erased)
}

/// Build the inverse of the generator rows for the first `k` surviving shards.
///
/// Returns the `k * k` decoding matrix and the ids of the surviving shards its
/// columns refer to.
fn decoding_matrix(
    f: &Field,
    parameters: &Parameters,
    matrix: &[u32],
    erased: &[bool],
) -> Result<(Vec<u32>, Vec<usize>), Error> {
    let k = parameters.k();
    let ids: Vec<usize> = (0..parameters.total_shards())
        .filter(|&id| !erased[id])
        .take(k)
        .collect();

    let mut rows = vec![0u32; k * k];
    for (i, &id) in ids.iter().enumerate() {
        let row = &mut rows[i * k..(i + 1) * k];
        if id < k {
            row[id] = 1;
        } else {
            row.copy_from_slice(&matrix[(id - k) * k..(id - k + 1) * k]);
        }
    }
    Ok((invert(f, rows, k)?, ids))
}

/// Invert a `n * n` matrix by Gauss-Jordan elimination.
fn invert(f: &Field, mut matrix: Vec<u32>, n: usize) -> Result<Vec<u32>, Error> {
    let mut inverse = vec![0u32; n * n];
    for i in 0..n {
        inverse[i * n + i] = 1;
    }

    for col in 0..n {
        let pivot = (col..n)
            .find(|&row| matrix[row * n + col] != 0)
            .ok_or(Error::SingularMatrix)?;
        if pivot != col {
            for j in 0..n {
                matrix.swap(pivot * n + j, col * n + j);
                inverse.swap(pivot * n + j, col * n + j);
            }
        }

        let scale = f.inverse(matrix[col * n + col]);
        if scale != 1 {
            for j in 0..n {
                matrix[col * n + j] = f.mul(matrix[col * n + j], scale);
                inverse[col * n + j] = f.mul(inverse[col * n + j], scale);
            }
        }

        for row in 0..n {
            let factor = matrix[row * n + col];
            if row == col || factor == 0 {
                continue;
            }
            for j in 0..n {
                matrix[row * n + j] ^= f.mul(factor, matrix[col * n + j]);
                inverse[row * n + j] ^= f.mul(factor, inverse[col * n + j]);
            }
        }
    }
    Ok(inverse)
}

fn check_matrix(parameters: &Parameters, matrix: &[u32]) -> Result<(), Error> {
    let expected = parameters.k() * parameters.m();
    if matrix.len() != expected {
        return Err(Error::InvalidMatrix {
            expected,
            actual: matrix.len(),
        });
    }
    Ok(())
}

fn check_count(actual: usize, expected: usize) -> Result<(), Error> {
    if actual != expected {
        return Err(Error::InvalidShardCount { expected, actual });
    }
    Ok(())
}

fn check_length(index: usize, actual: usize, expected: usize) -> Result<(), Error> {
    if actual != expected {
        return Err(Error::InvalidShardLength {
            index,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_alignment(parameters: &Parameters, shard_size: usize) -> Result<(), Error> {
    let word_bytes = parameters.word_size.bytes();
    if shard_size % word_bytes != 0 {
        return Err(Error::UnalignedShardSize {
            shard_size,
            word_bytes,
        });
    }
    Ok(())
}
