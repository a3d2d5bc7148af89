//! Global immutable scheme parameters and their validation.

use crate::error::Error;
use crate::index;

/// Shared parameters for every entity in the hypertree: hash size,
/// Winternitz chunk width, and the per-tier tree heights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    hashlen: usize,
    otsbits: usize,
    heights: Vec<usize>,
    p: usize,
    total_height: u32,
}

impl Params {
    /// Validates and constructs a parameter set.
    ///
    /// Rejects `hashlen` outside `16..=64`, `otsbits` outside `4..=16`,
    /// `heights` whose length is not in `2..=32` or whose entries are not
    /// in `3..=16`, and any configuration whose worst-case
    /// [`index::keyspace_usage`] would not fit in 64 bits.
    pub fn new(hashlen: usize, otsbits: usize, heights: Vec<usize>) -> Result<Self, Error> {
        if !(16..=64).contains(&hashlen) {
            return Err(Error::ConfigInvalid(format!(
                "hashlen must be in 16..=64, got {}",
                hashlen
            )));
        }
        if !(4..=16).contains(&otsbits) {
            return Err(Error::ConfigInvalid(format!(
                "otsbits must be in 4..=16, got {}",
                otsbits
            )));
        }
        if !(2..=32).contains(&heights.len()) {
            return Err(Error::ConfigInvalid(format!(
                "heights must have between 2 and 32 entries, got {}",
                heights.len()
            )));
        }
        for &h in &heights {
            if !(3..=16).contains(&h) {
                return Err(Error::ConfigInvalid(format!(
                    "each height must be in 3..=16, got {}",
                    h
                )));
            }
        }
        let total_height: u32 = heights.iter().map(|&h| h as u32).sum();
        if total_height >= 64 {
            return Err(Error::ConfigInvalid(format!(
                "sum of heights ({}) would not fit a 64-bit signature index",
                total_height
            )));
        }
        let p = ots_pairs_per_signature(hashlen, otsbits);
        // A full validation pass: confirms the worst-case entropy budget
        // fits within the 64-bit keyspace before anything else is built.
        index::keyspace_usage(hashlen, otsbits, &heights, None)?;
        Ok(Self {
            hashlen,
            otsbits,
            heights,
            p,
            total_height,
        })
    }

    pub fn hashlen(&self) -> usize {
        self.hashlen
    }

    pub fn otsbits(&self) -> usize {
        self.otsbits
    }

    pub fn heights(&self) -> &[usize] {
        &self.heights
    }

    /// Number of OTS private-key up/down chain pairs per signature.
    pub fn p(&self) -> usize {
        self.p
    }

    /// Winternitz chain length `w = 2^otsbits`.
    pub fn w(&self) -> u64 {
        1u64 << self.otsbits
    }

    /// Entropy slots reserved per OTS leaf: `2p` private chunks plus a
    /// nonce slot plus a level-salt bookkeeping slot.
    pub fn stride(&self) -> u64 {
        2 * self.p as u64 + 2
    }

    /// Number of tiers in the hypertree.
    pub fn levels(&self) -> usize {
        self.heights.len()
    }

    /// Total number of signatures this hypertree configuration can issue.
    pub fn max_idx(&self) -> u64 {
        1u64 << self.total_height
    }
}

/// `p = ceil(hashlen*8 / otsbits)`.
pub fn ots_pairs_per_signature(hashlen: usize, otsbits: usize) -> usize {
    ((hashlen * 8 - 1) / otsbits) + 1
}

/// Draws a fresh `hashlen`-byte account seed from the OS's CSPRNG.
/// The wallet layer that actually stores/encrypts this seed is out of
/// scope for this crate — this is only the one narrow interface the
/// core exposes toward that external collaborator.
pub fn generate_seed(hashlen: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut seed = vec![0u8; hashlen];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}
