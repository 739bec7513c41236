//! Row locks for the in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common::{PaymentId, SizeVariantId, TxId};
use tokio::sync::OwnedMutexGuard;

use crate::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RowKey {
    SizeVariant(SizeVariantId),
    Transaction(TxId),
    Payment(PaymentId),
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowKey::SizeVariant(id) => write!(f, "size_variants/{id}"),
            RowKey::Transaction(id) => write!(f, "transactions/{id}"),
            RowKey::Payment(id) => write!(f, "payments/{id}"),
        }
    }
}

type Registry = Arc<Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per row, created on first use and removed once the last
/// holder releases it with nobody waiting.
#[derive(Debug, Default)]
pub(crate) struct RowLocks {
    rows: Registry,
}

/// Exclusive hold on one row. Dropping it releases the row.
#[derive(Debug)]
pub(crate) struct RowGuard {
    key: RowKey,
    cell: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    rows: Registry,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        // The registry and this guard hold the only references: no waiters.
        if Arc::strong_count(&self.cell) == 2 {
            rows.remove(&self.key);
        }
    }
}

impl RowLocks {
    /// Waits up to `timeout` for an exclusive lock on `key`.
    pub(crate) async fn acquire(&self, key: &RowKey, timeout: Duration) -> Result<RowGuard> {
        let cell = {
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            rows.entry(key.clone()).or_default().clone()
        };

        let waited = tokio::time::timeout(timeout, cell.clone().lock_owned()).await;
        // Built before matching so a timed-out wait also prunes an idle entry.
        let mut held = RowGuard {
            key: key.clone(),
            cell,
            guard: None,
            rows: self.rows.clone(),
        };
        match waited {
            Ok(owned) => {
                held.guard = Some(owned);
                Ok(held)
            }
            Err(_) => {
                tracing::debug!(%key, ?timeout, "row lock wait timed out");
                Err(StoreError::Conflict {
                    reason: format!("lock wait timeout on {key}"),
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
