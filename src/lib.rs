//! A post-quantum-oriented, hash-based hypertree signing scheme.
//!
//! A single high-entropy seed expands, through one 64-bit entropy
//! index space, into a stack of Merkle-aggregated Winternitz one-time
//! signing tiers (a *hypertree*): each tier signs the Merkle root of the
//! tier beneath it, down to a leaf tier that signs caller data directly.
//! Signatures are self-authenticating — the leaf signature, its Merkle
//! co-path, and the signed chain of tier public keys together re-derive
//! the account's root public key.
//!
//! ```
//! use hypertree_mss::{Params, SigningKey, verify_data};
//!
//! let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
//! let seed = vec![0x42u8; 24];
//! let mut key = SigningKey::new(params.clone(), seed, 0).unwrap();
//!
//! let sig = key.sign_data(b"hello, hypertree", false).unwrap();
//! let result = verify_data(&sig, b"hello, hypertree", &params).unwrap();
//! assert!(result.ok);
//! ```
//!
//! The scheme is inherently stateful: every [`SigningKey`] signature
//! consumes a one-time key and advances `idx`. Reusing an index is
//! catastrophic, so callers own exactly one mutable [`SigningKey`] per
//! account and persist its [`SigningKey::serialize`] backup after every
//! signature.

pub mod backup;
pub mod error;
pub mod executor;
pub mod index;
pub mod level;
pub mod ots;
pub mod params;
pub mod primitives;
pub mod rc;
pub mod signing;
pub mod validator;

pub use backup::Backup;
pub use error::Error;
pub use executor::Executor;
pub use params::Params;
pub use signing::SigningKey;
pub use validator::{verify, verify_data, verify_hash, VerifyResult};
