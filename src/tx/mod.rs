//! Transaction management.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::StorageBackend;
use crate::Result;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;
}

/// Close a transaction according to the outcome of the work done in it:
/// commit on `Ok`, roll back on `Err`.
///
/// The work's error is returned unchanged. A rollback failure is logged and
/// does not mask it.
pub async fn finish<B, T>(backend: &B, tx: B::Tx, outcome: Result<T>) -> Result<T>
where
    B: StorageBackend,
{
    match outcome {
        Ok(value) => {
            backend.commit_tx(tx).await?;
            Ok(value)
        }
        Err(err) => {
            let id = tx.id();
            if let Err(rollback_err) = backend.rollback_tx(tx).await {
                warn!(tx = id.0, error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
