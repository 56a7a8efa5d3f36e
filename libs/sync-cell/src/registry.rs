use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-clinic mutex registry gating sync and the booking path's
/// cache-invalidation-heavy operations against each other: only one
/// sync per clinic runs at a time, and a booking does not wait on it —
/// callers that can't acquire within `wait` treat the clinic as busy.
#[derive(Clone, Default)]
pub struct ClinicLockRegistry {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ClinicLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, clinic_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(clinic_id).or_default().clone()
    }

    /// Attempts to acquire the clinic's lock within `wait`. Returns `None`
    /// if another sync (or cache-invalidation-heavy booking path) still
    /// holds it — the caller's contract is to skip, not queue.
    pub async fn try_acquire(
        &self,
        clinic_id: Uuid,
        wait: Duration,
    ) -> Option<OwnedMutexGuard<()>> {
        let lock = self.lock_for(clinic_id).await;
        tokio::time::timeout(wait, lock.lock_owned()).await.ok()
    }
}
