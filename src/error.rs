//! Error kinds. `VerifyFail` is intentionally absent here: verification
//! failure is a normal `bool` outcome returned by `validate_*`/`verify_*`,
//! never an `Err`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("entropy index would overflow the 64-bit keyspace: {0}")]
    EntropyOverflow(String),

    #[error("signing key exhausted: idx {idx} >= max_idx {max_idx}")]
    Exhausted { idx: u64, max_idx: u64 },

    #[error("backup does not match signing key parameters: {0}")]
    BackupMismatch(String),

    #[error("backup idx {backup_idx} is ahead of signing key idx {current_idx}")]
    BackupRollback { backup_idx: u64, current_idx: u64 },

    #[error("malformed signature or backup data: {0}")]
    StructuralError(String),
}
