//! One-time Winternitz signing key and its validator.

use subtle::ConstantTimeEq;
use tracing::instrument;

use crate::error::Error;
use crate::executor::{Executor, Handle};
use crate::params::Params;
use crate::primitives::{derive, keyed_hash};

/// Splits a `hashlen`-byte digest into `p` base-`w` digits, most
/// significant first, by treating the digest as a big-endian two's
/// complement integer and sign-extending it to `p * otsbits` bits
/// before slicing.
fn digest_to_chunks(digest: &[u8], p: usize, otsbits: u32) -> Vec<u64> {
    let bitlen = digest.len() * 8;
    let total_bits = p * otsbits as usize;
    let sign_bit = (digest[0] >> 7) & 1;

    let mut bits = Vec::with_capacity(total_bits);
    for _ in 0..total_bits.saturating_sub(bitlen) {
        bits.push(sign_bit);
    }
    for byte in digest {
        for b in (0..8).rev() {
            bits.push((byte >> b) & 1);
        }
    }

    bits.chunks(otsbits as usize)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u64, |acc, &bit| (acc << 1) | bit as u64)
        })
        .collect()
}

/// Applies the keyed hash `n` times to `value`, each round keyed by
/// `levelsalt`.
fn chain(value: &[u8], levelsalt: &[u8], n: u64, hashlen: usize) -> Vec<u8> {
    let mut cur = value.to_vec();
    for _ in 0..n {
        cur = keyed_hash(&cur, levelsalt, hashlen);
    }
    cur
}

fn compute_pubkey(privkey: &[Vec<u8>], levelsalt: &[u8], w: u64, hashlen: usize) -> Vec<u8> {
    let mut chained = Vec::with_capacity(privkey.len() * hashlen);
    for chunk in privkey {
        chained.extend(chain(chunk, levelsalt, w, hashlen));
    }
    keyed_hash(&chained, levelsalt, hashlen)
}

/// A single Winternitz one-time signing key, anchored at an entropy
/// `start_index` within the shared 64-bit keyspace.
pub struct OtsKey {
    hashlen: usize,
    otsbits: u32,
    p: usize,
    w: u64,
    levelsalt: Vec<u8>,
    nonce: Vec<u8>,
    privkey: Vec<Vec<u8>>,
    pubkey: Option<Vec<u8>>,
    handle: Option<Handle<Vec<u8>>>,
}

impl OtsKey {
    /// Derives the nonce and private-key chunks at `start_index`.
    /// `start_index + 1 + 2p` must not exceed `2^64`; the pubkey is not
    /// computed here.
    pub fn new(
        params: &Params,
        levelsalt: &[u8],
        seed: &[u8],
        start_index: u64,
    ) -> Result<Self, Error> {
        let p = params.p();
        let needed = 1 + 2 * p as u64;
        if start_index.checked_add(needed).is_none() {
            return Err(Error::EntropyOverflow(format!(
                "OTS key at start_index {} needs {} more entropy slots than fit in u64",
                start_index, needed
            )));
        }
        let nonce = derive(start_index, "SigNonce", seed);
        let privkey = (0..2 * p)
            .map(|m| derive(start_index + 1 + m as u64, "Signatur", seed))
            .collect();
        Ok(Self {
            hashlen: params.hashlen(),
            otsbits: params.otsbits() as u32,
            p,
            w: params.w(),
            levelsalt: levelsalt.to_vec(),
            nonce,
            privkey,
            pubkey: None,
            handle: None,
        })
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Computes (or returns the cached) public key, blocking.
    pub fn pubkey(&mut self) -> &[u8] {
        if self.pubkey.is_none() {
            if let Some(handle) = self.handle.take() {
                self.pubkey = Some(handle.require());
            } else {
                self.pubkey = Some(compute_pubkey(&self.privkey, &self.levelsalt, self.w, self.hashlen));
            }
        }
        self.pubkey.as_deref().expect("just computed")
    }

    /// Schedules pubkey computation on `executor` instead of computing
    /// it synchronously.
    pub fn announce(&mut self, executor: &Executor) {
        if self.pubkey.is_some() || self.handle.is_some() {
            return;
        }
        let privkey = self.privkey.clone();
        let levelsalt = self.levelsalt.clone();
        let w = self.w;
        let hashlen = self.hashlen;
        self.handle = Some(executor.spawn(move || compute_pubkey(&privkey, &levelsalt, w, hashlen)));
    }

    /// Blocks until an announced computation completes and caches it.
    pub fn require(&mut self) -> &[u8] {
        self.pubkey()
    }

    /// Non-blocking: true if `pubkey()`/`require()` would not block.
    pub fn available(&self) -> bool {
        self.pubkey.is_some() || self.handle.as_ref().is_some_and(Handle::available)
    }

    /// Injects a known pubkey, skipping chain computation entirely.
    /// Restore-only: the caller is trusting a cached
    /// Merkle-bottom value instead of recomputing it from `privkey`.
    pub(crate) fn set_pubkey(&mut self, pubkey: Vec<u8>) {
        self.pubkey = Some(pubkey);
        self.handle = None;
    }

    /// Winternitz-signs a raw `hashlen`-byte digest, consuming this
    /// one-time key. The caller is responsible for never signing twice
    /// with the same key.
    #[instrument(skip_all, fields(p = self.p as u64))]
    pub fn sign_hash(&self, digest: &[u8]) -> Result<Vec<u8>, Error> {
        if digest.len() != self.hashlen {
            return Err(Error::StructuralError(format!(
                "digest length {} does not match hashlen {}",
                digest.len(),
                self.hashlen
            )));
        }
        let chunks = digest_to_chunks(digest, self.p, self.otsbits);
        let mut out = Vec::with_capacity(2 * self.p * self.hashlen);
        for (j, &v) in chunks.iter().enumerate() {
            let up = chain(&self.privkey[2 * j], &self.levelsalt, v + 1, self.hashlen);
            let down = chain(&self.privkey[2 * j + 1], &self.levelsalt, self.w - v, self.hashlen);
            out.extend(up);
            out.extend(down);
        }
        Ok(out)
    }

    /// Hashes `data` under this key's nonce, then Winternitz-signs the
    /// digest. Output is `nonce || sign_hash(digest)`.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let digest = keyed_hash(data, &self.nonce, self.hashlen);
        let mut out = self.nonce.clone();
        out.extend(self.sign_hash(&digest)?);
        Ok(out)
    }
}

/// Validates Winternitz signatures produced by an [`OtsKey`] under a
/// given `levelsalt`, optionally against a known expected pubkey.
pub struct OneTimeValidator {
    hashlen: usize,
    otsbits: u32,
    p: usize,
    w: u64,
    levelsalt: Vec<u8>,
    pubkey: Option<Vec<u8>>,
}

impl OneTimeValidator {
    pub fn new(params: &Params, levelsalt: &[u8], pubkey: Option<Vec<u8>>) -> Self {
        Self {
            hashlen: params.hashlen(),
            otsbits: params.otsbits() as u32,
            p: params.p(),
            w: params.w(),
            levelsalt: levelsalt.to_vec(),
            pubkey,
        }
    }

    /// Builds a validator directly from `hashlen`/`otsbits` without a
    /// full [`Params`] (which also demands a `heights` vector that may
    /// be meaningless to the caller, e.g. when parsing a bare
    /// level-signature block). Used by [`crate::level::LevelSignature`].
    pub fn from_raw(hashlen: usize, otsbits: usize, levelsalt: &[u8], pubkey: Option<Vec<u8>>) -> Self {
        Self {
            hashlen,
            otsbits: otsbits as u32,
            p: crate::params::ots_pairs_per_signature(hashlen, otsbits),
            w: 1u64 << otsbits,
            levelsalt: levelsalt.to_vec(),
            pubkey,
        }
    }

    /// Completes every Winternitz chain to its top and hashes the
    /// result, yielding the pubkey that `sig` would correspond to for
    /// `digest` — this is "merkle mode", used by level validation to
    /// recover a Merkle leaf without a known expected pubkey.
    pub fn reconstruct_pubkey(&self, digest: &[u8], sig: &[u8]) -> Result<Vec<u8>, Error> {
        if digest.len() != self.hashlen {
            return Err(Error::StructuralError(format!(
                "digest length {} does not match hashlen {}",
                digest.len(),
                self.hashlen
            )));
        }
        let expected_len = 2 * self.p * self.hashlen;
        if sig.len() != expected_len {
            return Err(Error::StructuralError(format!(
                "OTS signature length {} does not match expected {}",
                sig.len(),
                expected_len
            )));
        }
        let chunks = digest_to_chunks(digest, self.p, self.otsbits);
        let mut chained = Vec::with_capacity(expected_len);
        for (j, &v) in chunks.iter().enumerate() {
            let up = &sig[2 * j * self.hashlen..(2 * j + 1) * self.hashlen];
            let down = &sig[(2 * j + 1) * self.hashlen..(2 * j + 2) * self.hashlen];
            chained.extend(chain(up, &self.levelsalt, self.w - v - 1, self.hashlen));
            chained.extend(chain(down, &self.levelsalt, v, self.hashlen));
        }
        Ok(keyed_hash(&chained, &self.levelsalt, self.hashlen))
    }

    /// Validates `sig` over `digest` against the configured expected
    /// pubkey. Returns `Err(StructuralError)` if no expected pubkey was
    /// configured — use [`Self::reconstruct_pubkey`] directly in that
    /// case instead.
    pub fn validate_hash(&self, digest: &[u8], sig: &[u8]) -> Result<bool, Error> {
        let reconstructed = self.reconstruct_pubkey(digest, sig)?;
        match &self.pubkey {
            Some(expected) => Ok(bool::from(expected.ct_eq(&reconstructed))),
            None => Err(Error::StructuralError(
                "no expected pubkey configured for validate_hash".to_string(),
            )),
        }
    }
}
