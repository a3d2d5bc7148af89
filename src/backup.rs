//! The JSON-shaped backup blob: enough state to resume a
//! [`crate::signing::SigningKey`] without recomputing Merkle bottoms it has
//! already paid for, plus the mismatch/rollback checks applied on restore.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::params::Params;
use crate::primitives::keyed_hash;

/// One tier's cached state: its `2^height` leaf pubkeys (the "Merkle
/// bottom") and, for every tier but the account root, the cross-signature
/// its parent produced over its root pubkey.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    #[serde(with = "hex_vec")]
    pub merkle_bottom: Vec<Vec<u8>>,
    #[serde(with = "hex_opt")]
    pub signature: Option<Vec<u8>>,
}

/// A serializable snapshot of a [`crate::signing::SigningKey`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backup {
    pub hashlen: usize,
    pub otsbits: usize,
    pub heights: Vec<usize>,
    pub idx: u64,
    #[serde(with = "hex_bytes")]
    pub seedhash: Vec<u8>,
    #[serde(with = "hex_opt", default)]
    pub salt: Option<Vec<u8>>,
    /// Entropy offset (decimal string, since JSON object keys are always
    /// strings) -> that tier's cached state.
    pub key_cache: BTreeMap<String, CacheEntry>,
}

impl Backup {
    /// `H(seed, "", hashlen)`, matching the hash the real seed can be
    /// checked against without ever writing the seed itself to the backup.
    pub fn hash_seed(seed: &[u8], hashlen: usize) -> Vec<u8> {
        keyed_hash(seed, b"", hashlen)
    }

    /// Validates this backup's static fields (everything but `idx`)
    /// against the parameters and seed a [`crate::signing::SigningKey`]
    /// is being constructed with. Does not apply the rollback rule —
    /// callers compare `idx` separately, since the rule differs between
    /// single-client and multi-client restore modes.
    pub fn check_matches(&self, params: &Params, seed: &[u8]) -> Result<(), Error> {
        if self.hashlen != params.hashlen() {
            return Err(Error::BackupMismatch(format!(
                "backup hashlen {} != {}",
                self.hashlen,
                params.hashlen()
            )));
        }
        if self.otsbits != params.otsbits() {
            return Err(Error::BackupMismatch(format!(
                "backup otsbits {} != {}",
                self.otsbits,
                params.otsbits()
            )));
        }
        if self.heights != params.heights() {
            return Err(Error::BackupMismatch(format!(
                "backup heights {:?} != {:?}",
                self.heights,
                params.heights()
            )));
        }
        let expected_seedhash = Self::hash_seed(seed, params.hashlen());
        if self.seedhash != expected_seedhash {
            return Err(Error::BackupMismatch(
                "backup seedhash does not match the supplied seed".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self)
            .map_err(|e| Error::StructuralError(format!("failed to serialize backup: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::StructuralError(format!("failed to parse backup: {}", e)))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        opt.map(|s| hex::decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(bottom: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(bottom.len()))?;
        for entry in bottom {
            seq.serialize_element(&hex::encode(entry))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let hexes = Vec::<String>::deserialize(d)?;
        hexes
            .into_iter()
            .map(|s| hex::decode(&s).map_err(serde::de::Error::custom))
            .collect()
    }
}
