//! A single tier's Merkle tree of Winternitz one-time signing keys:
//! a `2^height`-leaf tree whose leaves are OTS pubkeys and whose root
//! is the tier's public key.

use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::executor::Executor;
use crate::ots::{OneTimeValidator, OtsKey};
use crate::params::Params;
use crate::primitives::{derive, keyed_hash};

/// Number of entropy slots reserved per leaf: one slot held back ahead
/// of each [`OtsKey`] (keeping a leaf's addressing one entropy index
/// wider than the `1 + 2p` the key itself consumes) plus those `1 + 2p`
/// slots.
fn stride(params: &Params) -> u64 {
    params.stride()
}

/// A tier's Merkle-tree signing key.
pub struct LevelKey {
    hashlen: usize,
    height: usize,
    levelsalt: Vec<u8>,
    leaves: Vec<OtsKey>,
    tree: Option<Vec<Vec<Vec<u8>>>>,
}

impl LevelKey {
    /// Derives `levelsalt` and every leaf's OTS key from `seed` at
    /// entropy anchor `wen3_index`. Pubkeys are not computed here; call
    /// [`Self::announce`]/[`Self::require`] (or `require` alone for a
    /// synchronous build).
    pub fn new(
        params: &Params,
        seed: &[u8],
        wen3_index: u64,
        height: usize,
    ) -> Result<Self, Error> {
        let levelsalt = derive(wen3_index, "levelslt", seed);
        let stride = stride(params);
        let leaf_count = 1u64 << height;

        let mut leaves = Vec::with_capacity(leaf_count as usize);
        for k in 0..leaf_count {
            let ots_start = wen3_index
                .checked_add(1)
                .and_then(|v| v.checked_add(k.checked_mul(stride)?))
                .and_then(|v| v.checked_add(1))
                .ok_or_else(|| {
                    Error::EntropyOverflow(format!(
                        "level key leaf {} at anchor {} overflows u64",
                        k, wen3_index
                    ))
                })?;
            leaves.push(OtsKey::new(params, &levelsalt, seed, ots_start)?);
        }

        Ok(Self {
            hashlen: params.hashlen(),
            height,
            levelsalt,
            leaves,
            tree: None,
        })
    }

    /// Rebuilds a level key from a cached Merkle bottom (leaf pubkeys),
    /// skipping the expensive Winternitz chain walks (
    /// restore path). `leaf_pubkeys` must have `2^height` entries in
    /// leaf order.
    pub fn from_merkle_bottom(
        params: &Params,
        seed: &[u8],
        wen3_index: u64,
        height: usize,
        leaf_pubkeys: Vec<Vec<u8>>,
    ) -> Result<Self, Error> {
        let mut key = Self::new(params, seed, wen3_index, height)?;
        if leaf_pubkeys.len() != key.leaves.len() {
            return Err(Error::StructuralError(format!(
                "backup merkle bottom has {} entries, expected {}",
                leaf_pubkeys.len(),
                key.leaves.len()
            )));
        }
        for (leaf, pubkey) in key.leaves.iter_mut().zip(leaf_pubkeys) {
            leaf.set_pubkey(pubkey);
        }
        key.build_tree()?;
        Ok(key)
    }

    /// Schedules every leaf's pubkey computation on `executor`.
    pub fn announce(&mut self, executor: &Executor) {
        for leaf in &mut self.leaves {
            leaf.announce(executor);
        }
    }

    /// Awaits every leaf (computing synchronously if nothing was
    /// announced) and builds the Merkle tree over their pubkeys.
    pub fn require(&mut self) -> Result<(), Error> {
        for leaf in &mut self.leaves {
            leaf.require();
        }
        self.build_tree()
    }

    /// Non-blocking: true once [`Self::require`] would not block.
    pub fn available(&self) -> bool {
        self.leaves.iter().all(OtsKey::available)
    }

    fn build_tree(&mut self) -> Result<(), Error> {
        let mut level: Vec<Vec<u8>> = self
            .leaves
            .iter_mut()
            .map(|leaf| leaf.pubkey().to_vec())
            .collect();
        let mut tree = vec![level.clone()];
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut concat = pair[0].clone();
                    concat.extend(&pair[1]);
                    keyed_hash(&concat, &self.levelsalt, self.hashlen)
                })
                .collect();
            tree.push(level.clone());
        }
        self.tree = Some(tree);
        Ok(())
    }

    /// This tier's Merkle root (the tier's public key).
    pub fn root(&self) -> Result<&[u8], Error> {
        let tree = self.tree.as_ref().ok_or_else(not_built)?;
        Ok(tree.last().expect("tree always has a root level")[0].as_slice())
    }

    /// The `2^height` leaf pubkeys, for backup serialization.
    pub fn leaf_pubkeys(&self) -> Result<&[Vec<u8>], Error> {
        let tree = self.tree.as_ref().ok_or_else(not_built)?;
        Ok(&tree[0])
    }

    fn copath(&self, local_index: u64) -> Result<Vec<Vec<u8>>, Error> {
        let tree = self.tree.as_ref().ok_or_else(not_built)?;
        let mut path = Vec::with_capacity(self.height);
        for (depth, level) in tree.iter().take(self.height).enumerate() {
            let sibling = (local_index >> depth) ^ 1;
            path.push(level[sibling as usize].clone());
        }
        Ok(path)
    }

    /// Signs `data` with the leaf at `local_index`, producing a
    /// complete level-signature block: `be16(local_index) ||
    /// levelsalt || copath || root || ots_signature`.
    pub fn sign_data(&self, data: &[u8], local_index: u64) -> Result<Vec<u8>, Error> {
        if local_index >= self.leaves.len() as u64 {
            return Err(Error::StructuralError(format!(
                "local index {} out of range for height {}",
                local_index, self.height
            )));
        }
        let copath = self.copath(local_index)?;
        let root = self.root()?.to_vec();
        let ots_sig = self.leaves[local_index as usize].sign_data(data)?;

        let mut out = Vec::new();
        out.extend((local_index as u16).to_be_bytes());
        out.extend(&self.levelsalt);
        for sibling in &copath {
            out.extend(sibling);
        }
        out.extend(&root);
        out.extend(ots_sig);
        Ok(out)
    }
}

fn not_built() -> Error {
    Error::StructuralError("level key pubkey/tree not yet computed: call require() first".into())
}

/// A parsed level-signature block, validated against an
/// expected tier height/hashlen/otsbits.
pub struct LevelSignature {
    hashlen: usize,
    otsbits: usize,
    height: usize,
    pub local_index: u64,
    pub levelsalt: Vec<u8>,
    pub copath: Vec<Vec<u8>>,
    pub root: Vec<u8>,
    pub ots_signature: Vec<u8>,
}

impl LevelSignature {
    /// Parses one level-signature block from the front of `bytes`,
    /// returning it and the remaining bytes.
    pub fn parse<'a>(
        bytes: &'a [u8],
        hashlen: usize,
        otsbits: usize,
        height: usize,
    ) -> Result<(Self, &'a [u8]), Error> {
        let p = crate::params::ots_pairs_per_signature(hashlen, otsbits);
        let ots_len = hashlen + 2 * p * hashlen;
        let needed = 2 + hashlen + height * hashlen + hashlen + ots_len;
        if bytes.len() < needed {
            return Err(Error::StructuralError(format!(
                "level signature block needs {} bytes, got {}",
                needed,
                bytes.len()
            )));
        }
        let mut cursor = 0usize;
        let local_index = u16::from_be_bytes([bytes[0], bytes[1]]) as u64;
        cursor += 2;
        let levelsalt = bytes[cursor..cursor + hashlen].to_vec();
        cursor += hashlen;
        let mut copath = Vec::with_capacity(height);
        for _ in 0..height {
            copath.push(bytes[cursor..cursor + hashlen].to_vec());
            cursor += hashlen;
        }
        let root = bytes[cursor..cursor + hashlen].to_vec();
        cursor += hashlen;
        let ots_signature = bytes[cursor..cursor + ots_len].to_vec();
        cursor += ots_len;

        Ok((
            Self {
                hashlen,
                otsbits,
                height,
                local_index,
                levelsalt,
                copath,
                root,
                ots_signature,
            },
            &bytes[cursor..],
        ))
    }

    /// Recomputes the Merkle root implied by this block's OTS
    /// signature over `data`, walking the embedded co-path. Used both
    /// to self-check the embedded `root` field and, in "merkle mode",
    /// to hand the caller a pubkey it did not already know.
    pub fn reconstruct_root(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let p = crate::params::ots_pairs_per_signature(self.hashlen, self.otsbits);
        let nonce = &self.ots_signature[..self.hashlen];
        let chains = &self.ots_signature[self.hashlen..];
        if chains.len() != 2 * p * self.hashlen {
            return Err(Error::StructuralError(
                "OTS signature portion has the wrong length".into(),
            ));
        }
        let digest = keyed_hash(data, nonce, self.hashlen);

        let validator = OneTimeValidator::from_raw(self.hashlen, self.otsbits, &self.levelsalt, None);
        let mut node = validator.reconstruct_pubkey(&digest, chains)?;

        for (depth, sibling) in self.copath.iter().enumerate() {
            let bit = (self.local_index >> depth) & 1;
            let mut concat = if bit == 0 {
                node.clone()
            } else {
                sibling.clone()
            };
            if bit == 0 {
                concat.extend(sibling);
            } else {
                concat.extend(&node);
            }
            node = keyed_hash(&concat, &self.levelsalt, self.hashlen);
        }
        Ok(node)
    }

    /// Validates this block against an already-known expected root
    /// (the tier's pubkey from the signature header, or the previously
    /// validated child tier's pubkey for a cross-signature).
    pub fn validate(&self, data: &[u8], expected_root: &[u8]) -> Result<bool, Error> {
        let reconstructed = self.reconstruct_root(data)?;
        let self_consistent = bool::from(reconstructed.ct_eq(&self.root));
        let matches_expected = bool::from(self.root.ct_eq(expected_root));
        Ok(self_consistent && matches_expected)
    }
}
