//! In-process topology service.
//!
//! Keeps the authoritative active / deleted sets in memory and applies the
//! same rules the remote service does. Responses pass through the binary
//! codec so callers see exactly what would come off the wire.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::TopologyService;
use crate::config::PatchMeta;
use crate::error::{GridError, GridResult};
use crate::grid::{codec, LevelHierarchy, SubdivideRule};
use crate::types::{CellKey, CellSet, SaveInfo};

/// Service calls, used to inject failures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ServiceOp {
  Meta,
  ActivateInfo,
  DeletedInfo,
  Subdivide,
  Merge,
  Delete,
  Recover,
  Pick,
  Save,
}

impl ServiceOp {
  pub fn name(self) -> &'static str {
    match self {
      ServiceOp::Meta => "meta",
      ServiceOp::ActivateInfo => "activate_info",
      ServiceOp::DeletedInfo => "deleted_info",
      ServiceOp::Subdivide => "subdivide",
      ServiceOp::Merge => "merge",
      ServiceOp::Delete => "delete",
      ServiceOp::Recover => "recover",
      ServiceOp::Pick => "pick",
      ServiceOp::Save => "save",
    }
  }
}

#[derive(Debug, Default)]
struct ServiceState {
  active: BTreeSet<CellKey>,
  deleted: BTreeSet<CellKey>,
  features: HashMap<String, CellSet>,
  failing: Option<ServiceOp>,
  saves: usize,
}

/// Reference topology service backed by in-memory sets.
#[derive(Debug)]
pub struct MemoryTopologyService {
  meta: PatchMeta,
  levels: LevelHierarchy,
  state: Mutex<ServiceState>,
}

impl MemoryTopologyService {
  /// Service whose only active cell is the level-0 root.
  pub fn new(meta: PatchMeta) -> Self {
    let levels = LevelHierarchy::new(
      meta
        .subdivide_rules
        .iter()
        .copied()
        .map(SubdivideRule::from)
        .collect(),
    );
    let mut state = ServiceState::default();
    state.active.insert(CellKey::new(0, 0));
    Self {
      meta,
      levels,
      state: Mutex::new(state),
    }
  }

  /// Service whose active set is every cell of `level`.
  pub fn with_full_level(meta: PatchMeta, level: u8) -> GridResult<Self> {
    let service = Self::new(meta);
    let info = service.levels.info(level)?;
    {
      let mut state = service.lock(ServiceOp::ActivateInfo)?;
      state.active.clear();
      let count = info.cell_count() as u32;
      state
        .active
        .extend((0..count).map(|global_id| CellKey::new(level, global_id)));
    }
    Ok(service)
  }

  pub fn levels(&self) -> &LevelHierarchy {
    &self.levels
  }

  /// Selection returned by `pick(feature_dir)`.
  pub fn register_feature(&self, feature_dir: &str, cells: CellSet) -> GridResult<()> {
    let mut state = self.lock(ServiceOp::Pick)?;
    state.features.insert(feature_dir.to_string(), cells);
    Ok(())
  }

  /// Make every call of `op` fail until cleared with `None`.
  pub fn fail_on(&self, op: Option<ServiceOp>) {
    if let Ok(mut state) = self.state.lock() {
      state.failing = op;
    }
  }

  pub fn active_count(&self) -> usize {
    self.state.lock().map_or(0, |state| state.active.len())
  }

  pub fn is_active(&self, key: CellKey) -> bool {
    self
      .state
      .lock()
      .is_ok_and(|state| state.active.contains(&key))
  }

  pub fn is_deleted(&self, key: CellKey) -> bool {
    self
      .state
      .lock()
      .is_ok_and(|state| state.deleted.contains(&key))
  }

  pub fn save_count(&self) -> usize {
    self.state.lock().map_or(0, |state| state.saves)
  }

  fn lock(&self, op: ServiceOp) -> GridResult<MutexGuard<'_, ServiceState>> {
    let state = self
      .state
      .lock()
      .map_err(|_| GridError::transport(op.name(), "service state poisoned"))?;
    if state.failing == Some(op) {
      return Err(GridError::transport(op.name(), "injected failure"));
    }
    Ok(state)
  }
}

/// Round-trip through the wire format.
fn over_wire(cells: &CellSet) -> GridResult<CellSet> {
  codec::decode(&codec::encode(cells)?)
}

impl TopologyService for MemoryTopologyService {
  fn meta(&self) -> GridResult<PatchMeta> {
    let _state = self.lock(ServiceOp::Meta)?;
    Ok(self.meta.clone())
  }

  fn activate_info(&self) -> GridResult<CellSet> {
    let state = self.lock(ServiceOp::ActivateInfo)?;
    over_wire(&CellSet::from_keys(state.active.iter().copied()))
  }

  fn deleted_info(&self) -> GridResult<CellSet> {
    let state = self.lock(ServiceOp::DeletedInfo)?;
    over_wire(&CellSet::from_keys(state.deleted.iter().copied()))
  }

  fn subdivide(&self, targets: &CellSet) -> GridResult<CellSet> {
    let mut state = self.lock(ServiceOp::Subdivide)?;
    let mut children = CellSet::default();
    for key in targets.keys() {
      if !state.active.contains(&key) {
        warn!(cell = %key.uuid(), "subdivide target is not active");
        continue;
      }
      let child_ids = self.levels.children_global_ids(key.level, key.global_id)?;
      if child_ids.is_empty() {
        warn!(cell = %key.uuid(), "subdivide target is at the finest level");
        continue;
      }
      state.active.remove(&key);
      for global_id in child_ids {
        let child = CellKey::new(key.level + 1, global_id);
        state.active.insert(child);
        children.push(child);
      }
    }
    debug!(targets = targets.len(), children = children.len(), "memory service subdivide");
    over_wire(&children)
  }

  fn merge(&self, targets: &CellSet) -> GridResult<CellSet> {
    let mut state = self.lock(ServiceOp::Merge)?;
    let mut parents = CellSet::default();
    let mut seen = BTreeSet::new();
    for key in targets.keys() {
      let Some(parent_id) = self.levels.parent_global_id(key.level, key.global_id)? else {
        continue;
      };
      let parent = CellKey::new(key.level - 1, parent_id);
      if !seen.insert(parent) {
        continue;
      }
      for global_id in self.levels.children_global_ids(parent.level, parent.global_id)? {
        let child = CellKey::new(key.level, global_id);
        state.active.remove(&child);
        state.deleted.remove(&child);
      }
      state.active.insert(parent);
      parents.push(parent);
    }
    debug!(targets = targets.len(), parents = parents.len(), "memory service merge");
    over_wire(&parents)
  }

  fn delete(&self, targets: &CellSet) -> GridResult<()> {
    let mut state = self.lock(ServiceOp::Delete)?;
    for key in targets.keys() {
      if state.active.remove(&key) {
        state.deleted.insert(key);
      }
    }
    Ok(())
  }

  fn recover(&self, targets: &CellSet) -> GridResult<()> {
    let mut state = self.lock(ServiceOp::Recover)?;
    for key in targets.keys() {
      if state.deleted.remove(&key) {
        state.active.insert(key);
      }
    }
    Ok(())
  }

  fn pick(&self, feature_dir: &str) -> GridResult<CellSet> {
    let state = self.lock(ServiceOp::Pick)?;
    match state.features.get(feature_dir) {
      Some(cells) => over_wire(cells),
      None => Ok(CellSet::default()),
    }
  }

  fn save(&self) -> GridResult<SaveInfo> {
    let mut state = self.lock(ServiceOp::Save)?;
    state.saves += 1;
    Ok(SaveInfo {
      success: true,
      message: format!(
        "Saved {} active and {} deleted cells",
        state.active.len(),
        state.deleted.len()
      ),
    })
  }
}
