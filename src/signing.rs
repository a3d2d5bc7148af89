//! The stateful multi-level signing key: owns one live
//! [`LevelKey`] per hypertree tier, advances the global signature index
//! across subtree boundaries, and produces full or compressed signatures.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::backup::{Backup, CacheEntry};
use crate::error::Error;
use crate::executor::Executor;
use crate::index;
use crate::level::LevelKey;
use crate::params::Params;

/// A stateful hypertree signing key for one account.
///
/// Single-author: `&mut self` on every signing/advancing operation
/// makes concurrent use a compile-time error, matching the scheme's
/// inherent statefulness — reusing an index is catastrophic.
pub struct SigningKey {
    params: Params,
    seed: Vec<u8>,
    idx: u64,
    locals: Vec<u64>,
    offsets: Vec<u64>,
    levels: Vec<LevelKey>,
    /// `cross_signatures[lvl]` is the signature over tier `lvl`'s root by
    /// tier `lvl - 1`'s selected OTS leaf; always `None` at `lvl == 0`
    /// (the account root has no parent).
    cross_signatures: Vec<Option<Vec<u8>>>,
    /// Cached Merkle bottoms and cross-signatures, keyed by entropy
    /// offset, surviving across index advancement so subtrees already
    /// paid for are never recomputed.
    backup: BTreeMap<u64, CacheEntry>,
}

impl SigningKey {
    /// Builds a fresh signing key at `idx` from `seed` alone, walking
    /// every OTS chain from scratch.
    #[instrument(skip(seed), fields(idx, heights = ?params.heights()))]
    pub fn new(params: Params, seed: Vec<u8>, idx: u64) -> Result<Self, Error> {
        Self::build(params, seed, idx, BTreeMap::new())
    }

    /// Builds a signing key at `idx` from `seed`, re-using the Merkle
    /// bottoms and cross-signatures in `backup` wherever the entropy
    /// offsets still match.
    ///
    /// `strict` additionally rejects `backup.idx < idx` as evidence of
    /// concurrent use from another client of the same seed (single-client
    /// mode); the default (non-strict) mode only guards against the
    /// genuinely adversarial case of `backup.idx > idx` (rollback).
    #[instrument(skip(seed, backup), fields(idx, heights = ?params.heights()))]
    pub fn restore(
        params: Params,
        seed: Vec<u8>,
        idx: u64,
        backup: Backup,
        strict: bool,
    ) -> Result<Self, Error> {
        backup.check_matches(&params, &seed)?;
        if backup.idx > idx {
            tracing::warn!(backup_idx = backup.idx, idx, "rejecting backup rollback");
            return Err(Error::BackupRollback {
                backup_idx: backup.idx,
                current_idx: idx,
            });
        }
        if strict && backup.idx < idx {
            tracing::warn!(backup_idx = backup.idx, idx, "rejecting stale backup in strict mode");
            return Err(Error::BackupRollback {
                backup_idx: backup.idx,
                current_idx: idx,
            });
        }
        let mut cache = BTreeMap::new();
        for (offset_str, entry) in backup.key_cache {
            let offset: u64 = offset_str.parse().map_err(|_| {
                Error::StructuralError(format!("backup key_cache offset {:?} is not a u64", offset_str))
            })?;
            cache.insert(offset, entry);
        }
        Self::build(params, seed, idx, cache)
    }

    fn build(params: Params, seed: Vec<u8>, idx: u64, cache: BTreeMap<u64, CacheEntry>) -> Result<Self, Error> {
        if idx >= params.max_idx() {
            return Err(Error::Exhausted {
                idx,
                max_idx: params.max_idx(),
            });
        }
        let heights = params.heights();
        let l = params.levels();
        let locals = index::local_indices(idx, heights);
        let mut offsets = Vec::with_capacity(l);
        for lvl in 0..l {
            offsets.push(index::entropy_offset(lvl, &locals, heights, params.p() as u64, None)?);
        }

        let mut levels = Vec::with_capacity(l);
        for lvl in 0..l {
            let key = match cache.get(&offsets[lvl]) {
                Some(entry) => {
                    LevelKey::from_merkle_bottom(&params, &seed, offsets[lvl], heights[lvl], entry.merkle_bottom.clone())?
                }
                None => {
                    let mut key = LevelKey::new(&params, &seed, offsets[lvl], heights[lvl])?;
                    key.require()?;
                    key
                }
            };
            levels.push(key);
        }

        let mut cross_signatures: Vec<Option<Vec<u8>>> = vec![None; l];
        for lvl in 1..l {
            if let Some(entry) = cache.get(&offsets[lvl]) {
                cross_signatures[lvl] = entry.signature.clone();
            }
        }
        for lvl in 1..l {
            if cross_signatures[lvl].is_none() {
                let sig = levels[lvl - 1].sign_data(levels[lvl].root()?, locals[lvl - 1])?;
                cross_signatures[lvl] = Some(sig);
            }
        }

        let mut key = Self {
            params,
            seed,
            idx,
            locals,
            offsets,
            levels,
            cross_signatures,
            backup: BTreeMap::new(),
        };
        key.snapshot_all()?;
        Ok(key)
    }

    /// Schedules every tier's leaf pubkey computation on `executor`
    /// (only meaningful immediately after construction, before the
    /// blocking work in `build` has already happened — exposed for
    /// symmetry with [`LevelKey::announce`]; most callers never need it
    /// since `new` already computed everything synchronously).
    pub fn announce(&mut self, executor: &Executor) {
        for level in &mut self.levels {
            level.announce(executor);
        }
    }

    pub fn idx(&self) -> u64 {
        self.idx
    }

    pub fn max_idx(&self) -> u64 {
        self.params.max_idx()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Signs `data`, hashing it through the leaf OTS key's own nonce
    /// ('s `sign_data`). Advances `idx` on success.
    pub fn sign_data(&mut self, data: &[u8], compressed: bool) -> Result<Vec<u8>, Error> {
        self.sign_impl(data, compressed)
    }

    /// Signs an already-computed `digest` of exactly `hashlen` bytes.
    /// Advances `idx` on success.
    pub fn sign_hash(&mut self, digest: &[u8], compressed: bool) -> Result<Vec<u8>, Error> {
        if digest.len() != self.params.hashlen() {
            return Err(Error::StructuralError(format!(
                "digest length {} does not match hashlen {}",
                digest.len(),
                self.params.hashlen()
            )));
        }
        self.sign_impl(digest, compressed)
    }

    #[instrument(skip(self, payload), fields(idx = self.idx, compressed))]
    fn sign_impl(&mut self, payload: &[u8], compressed: bool) -> Result<Vec<u8>, Error> {
        if self.idx >= self.params.max_idx() {
            tracing::warn!(idx = self.idx, max_idx = self.params.max_idx(), "signing key exhausted");
            return Err(Error::Exhausted {
                idx: self.idx,
                max_idx: self.params.max_idx(),
            });
        }
        let l = self.params.levels();
        let mut out = Vec::new();
        for lvl in (0..l).rev() {
            out.extend_from_slice(self.levels[lvl].root()?);
        }
        out.extend_from_slice(&self.idx.to_be_bytes());

        let leaf_lvl = l - 1;
        out.extend(self.levels[leaf_lvl].sign_data(payload, self.locals[leaf_lvl])?);

        for lvl in (1..l).rev() {
            let sig = self.cross_signatures[lvl]
                .as_ref()
                .expect("every non-root tier carries a cross-signature once constructed")
                .clone();
            out.extend(sig);
            if compressed && self.locals[lvl] != 0 {
                break;
            }
        }

        self.advance()?;
        Ok(out)
    }

    /// Advances `idx` by one, rebuilding every tier whose entropy offset
    /// changed (a subtree boundary crossing) and obtaining fresh
    /// cross-signatures top-down for them.
    fn advance(&mut self) -> Result<(), Error> {
        let new_idx = self.idx + 1;
        let heights = self.params.heights();
        let l = self.params.levels();
        let new_locals = index::local_indices(new_idx, heights);
        let mut new_offsets = Vec::with_capacity(l);
        for lvl in 0..l {
            new_offsets.push(index::entropy_offset(
                lvl,
                &new_locals,
                heights,
                self.params.p() as u64,
                None,
            )?);
        }

        let first_changed = (0..l).find(|&lvl| new_offsets[lvl] != self.offsets[lvl]);

        if let Some(start) = first_changed {
            tracing::info!(tier = start, old_offset = self.offsets[start], new_offset = new_offsets[start], "crossing subtree boundary");
            for lvl in start..l {
                self.backup.remove(&self.offsets[lvl]);
                let mut key = LevelKey::new(&self.params, &self.seed, new_offsets[lvl], heights[lvl])?;
                key.require()?;
                self.levels[lvl] = key;
                self.cross_signatures[lvl] = None;
            }
            for lvl in 1..l {
                if self.cross_signatures[lvl].is_none() {
                    let sig = self.levels[lvl - 1].sign_data(self.levels[lvl].root()?, new_locals[lvl - 1])?;
                    self.cross_signatures[lvl] = Some(sig);
                }
            }
        }

        self.idx = new_idx;
        self.locals = new_locals;
        self.offsets = new_offsets;
        self.snapshot_all()?;
        Ok(())
    }

    /// Refreshes `self.backup` so it holds exactly one entry per
    /// currently-live tier, keyed by that tier's entropy offset.
    fn snapshot_all(&mut self) -> Result<(), Error> {
        let mut fresh = BTreeMap::new();
        for lvl in 0..self.params.levels() {
            let entry = CacheEntry {
                merkle_bottom: self.levels[lvl].leaf_pubkeys()?.to_vec(),
                signature: self.cross_signatures[lvl].clone(),
            };
            fresh.insert(self.offsets[lvl], entry);
        }
        self.backup = fresh;
        Ok(())
    }

    /// Serializes this key's current backup state. Does not
    /// consume the key — callers sign and then persist the result.
    pub fn serialize(&self) -> Backup {
        let key_cache = self
            .backup
            .iter()
            .map(|(offset, entry)| (offset.to_string(), entry.clone()))
            .collect();
        Backup {
            hashlen: self.params.hashlen(),
            otsbits: self.params.otsbits(),
            heights: self.params.heights().to_vec(),
            idx: self.idx,
            seedhash: Backup::hash_seed(&self.seed, self.params.hashlen()),
            salt: None,
            key_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::verify_data;

    fn params() -> Params {
        Params::new(24, 6, vec![2, 3, 4]).unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn sign_then_verify_round_trips_at_idx_zero() {
        let mut key = SigningKey::new(params(), vec![21u8; 24], 0).unwrap();
        let sig = key.sign_data(b"hello", false).unwrap();
        let result = verify_data(&sig, b"hello", &params()).unwrap();
        assert!(result.ok);
        assert_eq!(result.idx, 0);
        assert_eq!(key.idx(), 1);
    }

    #[test]
    fn serialize_then_restore_produces_identical_next_signature() {
        let params = params();
        let seed = vec![22u8; 24];
        let mut original = SigningKey::new(params.clone(), seed.clone(), 0).unwrap();
        for i in 0..3 {
            original.sign_data(format!("msg{}", i).as_bytes(), false).unwrap();
        }
        let backup = original.serialize();
        let expected_next = original.sign_data(b"the 4th message", false).unwrap();

        let mut restored = SigningKey::restore(params, seed, 3, backup, true).unwrap();
        let actual_next = restored.sign_data(b"the 4th message", false).unwrap();
        assert_eq!(expected_next, actual_next);
    }

    #[test]
    fn backup_rollback_is_rejected() {
        let params = params();
        let seed = vec![23u8; 24];
        let mut key = SigningKey::new(params.clone(), seed.clone(), 0).unwrap();
        for _ in 0..5 {
            key.sign_data(b"msg", false).unwrap();
        }
        let backup_at_5 = key.serialize();
        let result = SigningKey::restore(params, seed, 0, backup_at_5, true);
        assert!(matches!(result, Err(Error::BackupRollback { .. })));
    }

    #[test]
    fn strict_restore_rejects_stale_backup() {
        let params = params();
        let seed = vec![24u8; 24];
        let fresh_backup = SigningKey::new(params.clone(), seed.clone(), 0).unwrap().serialize();
        let result = SigningKey::restore(params, seed, 5, fresh_backup, true);
        assert!(matches!(result, Err(Error::BackupRollback { .. })));
    }

    #[test]
    fn non_strict_restore_allows_stale_backup() {
        let params = params();
        let seed = vec![25u8; 24];
        let fresh_backup = SigningKey::new(params.clone(), seed.clone(), 0).unwrap().serialize();
        let result = SigningKey::restore(params, seed, 5, fresh_backup, false);
        assert!(result.is_ok());
    }

    #[test]
    fn signing_beyond_max_idx_is_exhausted() {
        let params = params();
        let max_idx = params.max_idx();
        let mut key = SigningKey::new(params, vec![26u8; 24], max_idx - 1).unwrap();
        key.sign_data(b"last one", false).unwrap();
        assert_eq!(key.idx(), max_idx);
        let result = key.sign_data(b"one too many", false);
        assert!(matches!(result, Err(Error::Exhausted { .. })));
    }

    #[test]
    fn crossing_a_subtree_boundary_still_verifies() {
        init_tracing();
        let params = params();
        // heights = [2,3,4] => tier 2 (leaf) has 16 leaves; idx 15->16 crosses
        // tier 2's boundary and, since 16 = 1<<4, also tier 1's.
        let mut key = SigningKey::new(params.clone(), vec![27u8; 24], 15).unwrap();
        let sig15 = key.sign_data(b"boundary", false).unwrap();
        assert!(verify_data(&sig15, b"boundary", &params).unwrap().ok);
        let sig16 = key.sign_data(b"after boundary", false).unwrap();
        assert!(verify_data(&sig16, b"after boundary", &params).unwrap().ok);
    }

    #[test]
    fn compressed_and_uncompressed_both_verify_at_same_idx() {
        let params = params();
        let seed = vec![28u8; 24];
        let mut a = SigningKey::new(params.clone(), seed.clone(), 1).unwrap();
        let mut b = SigningKey::new(params.clone(), seed, 1).unwrap();
        let compressed = a.sign_data(b"msg", true).unwrap();
        let uncompressed = b.sign_data(b"msg", false).unwrap();
        assert!(verify_data(&compressed, b"msg", &params).unwrap().ok);
        assert!(verify_data(&uncompressed, b"msg", &params).unwrap().ok);
    }

    #[test]
    fn distinct_indices_use_disjoint_ots_leaves() {
        let params = params();
        let mut key = SigningKey::new(params.clone(), vec![29u8; 24], 0).unwrap();
        let mut seen_leaf_sigs = Vec::new();
        for i in 0..4 {
            let sig = key.sign_data(format!("m{}", i).as_bytes(), false).unwrap();
            // The leaf level-signature block starts right after the header.
            let header_len = params.levels() * params.hashlen() + 8;
            let leaf_block_len = 2 + params.hashlen() * (3 + params.heights()[2] + 2 * params.p());
            let leaf_block = sig[header_len..header_len + leaf_block_len].to_vec();
            assert!(!seen_leaf_sigs.contains(&leaf_block));
            seen_leaf_sigs.push(leaf_block);
        }
    }

    /// An uncompressed signature's byte length is exactly
    /// `L*hashlen + 8` (root header + idx) plus one level-signature block
    /// per tier from the leaf up to tier 1, each block sized
    /// `2 + hashlen*(3 + tier_height + 2p)` for the tier whose leaf
    /// produced it.
    #[test]
    fn uncompressed_signature_length_matches_formula() {
        let params = params();
        let mut key = SigningKey::new(params.clone(), vec![30u8; 24], 0).unwrap();
        let sig = key.sign_data(b"length check", false).unwrap();

        let l = params.levels();
        let heights = params.heights();
        let block_len =
            |tier_height: usize| 2 + params.hashlen() * (3 + tier_height + 2 * params.p());
        // Leaf level-signature (tier L-1) plus one cross-signature per
        // tier from L-1 down to 1, each signed by its parent (tier-1).
        let mut expected = l * params.hashlen() + 8 + block_len(heights[l - 1]);
        for lvl in (1..l).rev() {
            expected += block_len(heights[lvl - 1]);
        }
        assert_eq!(sig.len(), expected);
    }

    /// Sign three consecutive messages, then tamper the 17th byte
    /// (index 16) of the idx=1 signature specifically — it
    /// must fail verification while the untouched idx=0 and idx=2
    /// signatures keep verifying.
    #[test]
    fn tampering_byte_seventeen_of_the_second_signature_fails_verification() {
        let params = params();
        let seed = vec![31u8; 24];
        let mut key = SigningKey::new(params.clone(), seed, 0).unwrap();

        let sig0 = key.sign_data(b"first", false).unwrap();
        let mut sig1 = key.sign_data(b"second", false).unwrap();
        let sig2 = key.sign_data(b"third", false).unwrap();

        assert!(crate::validator::verify_data(&sig0, b"first", &params).unwrap().ok);
        assert!(crate::validator::verify_data(&sig2, b"third", &params).unwrap().ok);

        sig1[16] ^= 0xFF;
        assert!(!crate::validator::verify_data(&sig1, b"second", &params).unwrap().ok);
    }

    /// Signer A signs 10 messages and hands out a backup.
    /// Signer B, restored from that backup at the same idx, produces
    /// exactly A's 11th signature next. Signer C, restored from a
    /// backup claiming a higher idx than its caller-supplied current
    /// idx, is rejected as a rollback.
    #[test]
    fn restoring_from_anothers_backup_continues_or_rejects_rollback() {
        let params = params();
        let seed = vec![32u8; 24];

        let mut signer_a = SigningKey::new(params.clone(), seed.clone(), 0).unwrap();
        for i in 0..10 {
            signer_a.sign_data(format!("a-msg-{}", i).as_bytes(), false).unwrap();
        }
        let backup = signer_a.serialize();
        assert_eq!(backup.idx, 10);

        let eleventh_from_a = signer_a.sign_data(b"eleventh", false).unwrap();

        let mut signer_b = SigningKey::restore(params.clone(), seed.clone(), 10, backup.clone(), true).unwrap();
        let eleventh_from_b = signer_b.sign_data(b"eleventh", false).unwrap();
        assert_eq!(eleventh_from_a, eleventh_from_b);

        let signer_c = SigningKey::restore(params, seed, 0, backup, true);
        assert!(matches!(signer_c, Err(Error::BackupRollback { backup_idx: 10, current_idx: 0 })));
    }
}
