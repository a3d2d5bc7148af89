//! Re-derives an account's root public key from a signature blob:
//! unpack the chain of level pubkeys, validate the leaf OTS signature
//! against the deepest tier, then walk the cross-signature chain
//! upward as far as it was emitted.

use tracing::instrument;

use crate::error::Error;
use crate::index;
use crate::level::LevelSignature;
use crate::params::Params;

/// The outcome of [`verify_data`]/[`verify_hash`].
#[derive(Debug, Clone)]
pub struct VerifyResult {
    /// `true` iff every tier on the authenticated path validated.
    pub ok: bool,
    /// The account root pubkey (tier-0's pubkey), always present — in a
    /// compressed signature this may be "claimed" rather than proven; see
    /// [`Self::authenticated_depth`].
    pub root_pubkey: Vec<u8>,
    /// The signature index this blob was produced at.
    pub idx: u64,
    /// The shallowest tier whose pubkey was cryptographically chained
    /// back to the leaf signature. `0` means the full chain up to the
    /// account root was proven; a larger value means the signature was
    /// compressed and tiers above this one are merely claimed by the
    /// header, not proven by this blob alone.
    pub authenticated_depth: usize,
}

/// Parses `sig` and validates it as a signature over `payload`
/// (the same bytes the signer passed to `sign_data`/`sign_hash`).
///
/// Returns `Err(Error::StructuralError)` for malformed/truncated input —
/// never folded into `VerifyResult::ok`
#[instrument(skip(sig, payload), fields(hashlen = params.hashlen()))]
pub fn verify(sig: &[u8], payload: &[u8], params: &Params) -> Result<VerifyResult, Error> {
    let l = params.levels();
    let h = params.hashlen();
    let heights = params.heights();

    let header_len = l * h + 8;
    if sig.len() < header_len {
        return Err(Error::StructuralError(format!(
            "signature too short for a {}-tier header: need at least {} bytes, got {}",
            l,
            header_len,
            sig.len()
        )));
    }

    // `root_pubkeys[0]` is tier L-1 (deepest); `root_pubkeys[l-1]` is tier 0
    // (the account root)
    let mut root_pubkeys: Vec<&[u8]> = Vec::with_capacity(l);
    let mut cursor = 0usize;
    for _ in 0..l {
        root_pubkeys.push(&sig[cursor..cursor + h]);
        cursor += h;
    }
    let idx = u64::from_be_bytes(sig[cursor..cursor + 8].try_into().expect("8 bytes"));
    cursor += 8;

    if idx >= params.max_idx() {
        return Err(Error::StructuralError(format!(
            "signature index {} is out of range for max_idx {}",
            idx,
            params.max_idx()
        )));
    }
    let locals = index::local_indices(idx, heights);

    // tier_pubkey(lvl): lvl=0 is the account root, lvl=L-1 is the leaf tier.
    let tier_pubkey = |lvl: usize| -> &[u8] { root_pubkeys[l - 1 - lvl] };

    let leaf_lvl = l - 1;
    let (leaf_sig, rest) =
        LevelSignature::parse(&sig[cursor..], h, params.otsbits(), heights[leaf_lvl])?;
    let mut remaining = rest;
    let mut chain_ok = leaf_sig.validate(payload, tier_pubkey(leaf_lvl))?;

    let mut lvl = leaf_lvl;
    while lvl >= 1 {
        if remaining.is_empty() {
            // Compressed signature: legitimate only if the mirror rule
            // says the signer would have stopped exactly here. The
            // signer's stop condition is keyed on the tier it just
            // emitted a cross-signature for (`lvl + 1` here, since `lvl`
            // has already dropped to that tier's parent), not on `lvl`
            // itself.
            if locals[lvl + 1] == 0 {
                return Err(Error::StructuralError(
                    "signature ended before a cross-signature required by the index's local path".into(),
                ));
            }
            break;
        }
        let parent_lvl = lvl - 1;
        let (cross_sig, rest2) =
            LevelSignature::parse(remaining, h, params.otsbits(), heights[parent_lvl])?;
        remaining = rest2;
        let valid = cross_sig.validate(tier_pubkey(lvl), tier_pubkey(parent_lvl))?;
        chain_ok &= valid;
        lvl = parent_lvl;
    }

    if !remaining.is_empty() {
        return Err(Error::StructuralError(
            "trailing bytes after the last cross-signature".into(),
        ));
    }

    let result = VerifyResult {
        ok: chain_ok,
        root_pubkey: tier_pubkey(0).to_vec(),
        idx,
        authenticated_depth: lvl,
    };
    tracing::event!(tracing::Level::DEBUG, idx, ok = result.ok, "verified signature");
    Ok(result)
}

/// Convenience wrapper: validates `sig` as a signature over arbitrary
/// `data` (the leaf tier hashed it through its own nonce).
pub fn verify_data(sig: &[u8], data: &[u8], params: &Params) -> Result<VerifyResult, Error> {
    verify(sig, data, params)
}

/// Convenience wrapper: validates `sig` as a signature over a raw,
/// already-hashed `digest` of exactly `hashlen` bytes.
pub fn verify_hash(sig: &[u8], digest: &[u8], params: &Params) -> Result<VerifyResult, Error> {
    if digest.len() != params.hashlen() {
        return Err(Error::StructuralError(format!(
            "digest length {} does not match hashlen {}",
            digest.len(),
            params.hashlen()
        )));
    }
    verify(sig, digest, params)
}
