use crate::{marshal, Backend, Error, MatrixCache, Parameters};
use tracing::{debug, warn};

/// Indices of shards to reconstruct.
///
/// Data shards are numbered `0..k` and coding shards `k..k + m`. Indices keep their
/// order of first appearance; duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Erasures(Vec<usize>);

impl Erasures {
    /// Collect erasures from shard indices.
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut erasures = Vec::new();
        for index in indices {
            if !erasures.contains(&index) {
                erasures.push(index);
            }
        }
        Self(erasures)
    }

    /// Parse an erasure list terminated by a negative sentinel (conventionally `-1`).
    ///
    /// Everything from the first negative value on is ignored, as is a list with no
    /// sentinel at all past its end.
    pub fn from_terminated(raw: &[i32]) -> Self {
        Self::new(raw.iter().map_while(|&index| usize::try_from(index).ok()))
    }

    /// All erased indices, in order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Erased indices that refer to data shards (`< k`).
    pub fn data_shards(&self, k: usize) -> impl Iterator<Item = usize> + '_ {
        self.iter().filter(move |&index| index < k)
    }

    /// Whether `index` is erased.
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    /// Number of distinct erased indices.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no index is erased.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<usize> for Erasures {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Reconstructs erased data shards using matrices from a [MatrixCache].
pub struct Decoder<B: Backend> {
    cache: MatrixCache<B>,
}

impl<B: Backend> Decoder<B> {
    /// Create a decoder that owns `cache`.
    pub fn new(cache: MatrixCache<B>) -> Self {
        Self { cache }
    }

    /// The cache matrices are obtained from.
    pub fn cache(&self) -> &MatrixCache<B> {
        &self.cache
    }

    /// Release every cached matrix.
    pub fn cleanup(&self) {
        self.cache.cleanup();
    }

    /// Reconstruct the data shards named in `erasures`, writing them into `data`.
    ///
    /// `data` must hold `k` slots and `coding` `m` slots. A `None` slot is an absent
    /// shard and must be listed in `erasures`; every present shard must be
    /// `shard_size` bytes long. On success, each
    /// erased data slot holds its recovered shard (overwritten in place if present,
    /// filled in if absent). Erased coding shards are reconstructed internally but not
    /// returned.
    ///
    /// On failure, neither `data` nor `coding` is modified.
    pub fn decode(
        &self,
        parameters: &Parameters,
        row_k_ones: bool,
        erasures: &Erasures,
        data: &mut [Option<Vec<u8>>],
        coding: &[Option<Vec<u8>>],
        shard_size: usize,
    ) -> Result<(), Error> {
        let matrix = self.cache.get_or_create(parameters).map_err(|err| {
            warn!(%parameters, ?err, "no coding matrix for decode");
            Error::LookupFailed {
                parameters: *parameters,
                source: Box::new(err),
            }
        })?;

        let k = parameters.k();
        let recovered: Vec<(usize, Vec<u8>)> = {
            let mut native_data = marshal::to_native(data, k, shard_size)?;
            let mut native_coding = marshal::to_native(coding, parameters.m(), shard_size)?;

            // Placeholders only hold data once reconstruction fills them.
            let missing = data
                .iter()
                .chain(coding)
                .enumerate()
                .find_map(|(index, shard)| {
                    (shard.is_none() && !erasures.contains(index)).then_some(index)
                });
            if let Some(index) = missing {
                return Err(Error::MissingShard { index });
            }
            self.cache
                .backend()
                .decode(
                    parameters,
                    matrix.coefficients(),
                    row_k_ones,
                    erasures,
                    &mut native_data,
                    &mut native_coding,
                    shard_size,
                )
                .map_err(|err| {
                    warn!(%parameters, ?erasures, %err, "decode failed");
                    Error::DecodeFailed(Box::new(err))
                })?;
            erasures
                .data_shards(k)
                .map(|index| {
                    let shard = std::mem::take(&mut native_data[index]);
                    (index, shard.into_owned())
                })
                .collect()
        };

        let restored = recovered.len();
        for (index, shard) in recovered {
            match &mut data[index] {
                Some(existing) => existing.copy_from_slice(&shard),
                slot @ None => *slot = Some(shard),
            }
        }
        debug!(%parameters, erased = erasures.len(), restored, "decoded shards");
        Ok(())
    }
}
