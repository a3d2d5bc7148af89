//! Pure index arithmetic mapping a global signature index to per-tier
//! local indices and to offsets in the shared 64-bit entropy keyspace.
//! Nothing in this module touches a key or a hash; it only counts.

use crate::error::Error;
use crate::params::ots_pairs_per_signature;

/// Splits a global index into its per-tier local indices.
///
/// `idx = Σ_lvl locals[lvl] · 2^(Σ_{k>lvl} heights[k])`, each `locals[lvl]` in
/// `0..2^heights[lvl]`.
pub fn local_indices(idx: u64, heights: &[usize]) -> Vec<u64> {
    let mut suffix = vec![0u32; heights.len() + 1];
    for (k, &h) in heights.iter().enumerate().rev() {
        suffix[k] = suffix[k + 1] + h as u32;
    }
    let mut locals = Vec::with_capacity(heights.len());
    for (lvl, &h) in heights.iter().enumerate() {
        let shift = suffix[lvl + 1];
        let mask = (1u64 << h) - 1;
        locals.push((idx >> shift) & mask);
    }
    locals
}

/// Entropy a single tier-`lvl` subtree consumes, including every tier
/// beneath it: `1 + 2^h_lvl · (2p+2 + subtree_entropy(lvl+1))`, bottoming
/// out at `1 + 2^h · (2p+2)` for the deepest tier.
///
/// Returned as `u128` so callers can detect a 64-bit overflow before
/// truncating.
pub fn subtree_entropy(lvl: usize, heights: &[usize], p: u64, reserves: Option<&[u64]>) -> u128 {
    if lvl >= heights.len() {
        return 0;
    }
    let h = heights[lvl] as u32;
    let leaves = 1u128 << h;
    let stride = 2 * p as u128 + 2;
    let reserve = reserves
        .and_then(|r| r.get(lvl))
        .map(|&bits| 1u128 << bits)
        .unwrap_or(0);
    1 + leaves * (stride + subtree_entropy(lvl + 1, heights, p, reserves)) + reserve
}

/// Entropy index at which tier-`lvl`'s level key begins, given the local
/// indices chosen for tiers `0..lvl`.
pub fn entropy_offset(
    lvl: usize,
    locals: &[u64],
    heights: &[usize],
    p: u64,
    reserves: Option<&[u64]>,
) -> Result<u64, Error> {
    let mut offset: u128 = 0;
    for k in 0..lvl {
        let h = heights[k] as u32;
        let stride = 2 * p as u128 + 2;
        offset += 1 + (1u128 << h) * stride;
        offset += locals[k] as u128 * subtree_entropy(k + 1, heights, p, reserves);
    }
    if offset > u64::MAX as u128 {
        return Err(Error::EntropyOverflow(format!(
            "entropy offset for tier {} exceeds 64 bits",
            lvl
        )));
    }
    Ok(offset as u64)
}

/// Worst-case total entropy consumption of a hypertree configuration,
/// i.e. `subtree_entropy(0, ...)`. Returns `Error::ConfigInvalid` if it
/// would not fit in 64 bits.
pub fn keyspace_usage(
    hashlen: usize,
    otsbits: usize,
    heights: &[usize],
    reserves: Option<&[u64]>,
) -> Result<u64, Error> {
    let p = ots_pairs_per_signature(hashlen, otsbits) as u64;
    let total = subtree_entropy(0, heights, p, reserves);
    if total > u64::MAX as u128 {
        return Err(Error::ConfigInvalid(format!(
            "worst-case keyspace usage ({}) exceeds 64 bits",
            total
        )));
    }
    Ok(total as u64)
}
