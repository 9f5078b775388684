//! Shared handle that rejects overlapping mutations.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::warn;

use super::GridTopologyStore;
use crate::error::{GridError, GridResult};
use crate::types::{CellSet, GridUpdate, GridUpdateBatch, MergeResult, SaveInfo};

/// `GridTopologyStore` behind `Arc<Mutex<_>>`.
///
/// Every call try-locks: a call made while another is in flight fails with
/// [`GridError::Busy`] instead of waiting.
#[derive(Clone)]
pub struct SharedGridStore {
  inner: Arc<Mutex<GridTopologyStore>>,
}

impl SharedGridStore {
  pub fn new(store: GridTopologyStore) -> Self {
    Self {
      inner: Arc::new(Mutex::new(store)),
    }
  }

  fn try_guard(&self) -> GridResult<MutexGuard<'_, GridTopologyStore>> {
    match self.inner.try_lock() {
      Ok(guard) => Ok(guard),
      Err(TryLockError::WouldBlock) => Err(GridError::Busy),
      Err(TryLockError::Poisoned(poisoned)) => {
        warn!("grid store lock poisoned by a panicking caller; continuing");
        Ok(poisoned.into_inner())
      }
    }
  }

  /// Run `f` with exclusive access, or fail with `Busy`.
  pub fn with_mut<R>(&self, f: impl FnOnce(&mut GridTopologyStore) -> GridResult<R>) -> GridResult<R> {
    let mut guard = self.try_guard()?;
    f(&mut guard)
  }

  /// Run a read-only `f`, or fail with `Busy` while a mutation runs.
  pub fn with<R>(&self, f: impl FnOnce(&GridTopologyStore) -> R) -> GridResult<R> {
    let guard = self.try_guard()?;
    Ok(f(&guard))
  }

  pub fn is_busy(&self) -> bool {
    matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
  }

  pub fn init(&self) -> GridResult<GridUpdateBatch> {
    self.with_mut(|store| store.init())
  }

  pub fn subdivide_cells(&self, targets: &CellSet) -> GridResult<GridUpdateBatch> {
    self.with_mut(|store| store.subdivide_cells(targets))
  }

  pub fn merge_cells(&self, storage_ids: &[u32]) -> GridResult<MergeResult> {
    self.with_mut(|store| store.merge_cells(storage_ids))
  }

  pub fn delete_cells(&self, storage_ids: &[u32]) -> GridResult<()> {
    self.with_mut(|store| store.delete_cells(storage_ids))
  }

  pub fn delete_cells_locally(&self, storage_ids: &[u32]) -> GridResult<Vec<GridUpdate>> {
    self.with_mut(|store| store.delete_cells_locally(storage_ids))
  }

  pub fn recover_cells(&self, storage_ids: &[u32]) -> GridResult<()> {
    self.with_mut(|store| store.recover_cells(storage_ids))
  }

  pub fn add_cells(&self, cells: &CellSet) -> GridResult<GridUpdateBatch> {
    self.with_mut(|store| store.add_cells(cells))
  }

  pub fn save(&self) -> GridResult<SaveInfo> {
    self.with_mut(|store| store.save())
  }

  pub fn next_storage_id(&self) -> GridResult<u32> {
    self.with(|store| store.next_storage_id())
  }
}
