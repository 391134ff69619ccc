//! Convert caller-owned shard arrays into [Backend](crate::Backend) buffers.
//!
//! A present shard is borrowed as-is. An absent shard is replaced by a zeroed
//! placeholder of the agreed shard size, owned by the returned vector and released
//! with it. Backends write through [Cow::to_mut], so reconstructing into a borrowed
//! shard copies it first and the caller's memory is only ever changed by an explicit
//! copy-back.

use crate::Error;
use std::borrow::Cow;

/// A shard buffer handed to a [Backend](crate::Backend): borrowed caller memory or
/// an owned placeholder.
pub type Buffer<'a> = Cow<'a, [u8]>;

/// Marshal one shard group (data or coding) of `expected` shards.
pub fn to_native<'a>(
    shards: &'a [Option<Vec<u8>>],
    expected: usize,
    shard_size: usize,
) -> Result<Vec<Buffer<'a>>, Error> {
    if shards.len() != expected {
        return Err(Error::InvalidShardCount {
            expected,
            actual: shards.len(),
        });
    }
    shards
        .iter()
        .enumerate()
        .map(|(index, shard)| match shard {
            Some(shard) if shard.len() != shard_size => Err(Error::InvalidShardSize {
                index,
                expected: shard_size,
                actual: shard.len(),
            }),
            Some(shard) => Ok(Cow::Borrowed(shard.as_slice())),
            None => Ok(Cow::Owned(vec![0u8; shard_size])),
        })
        .collect()
}
