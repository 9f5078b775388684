//! GridTopologyStore - dense, gap-free storage of the active cells.
//!
//! Every active cell owns a `storage_id` in `[0, next_storage_id)`. The
//! parallel arrays (`levels`, `global_ids`, `deleted`, `attributes`) are only
//! addressed by slot, and the key index maps `(level, global_id)` back to the
//! slot. Two invariants hold after every public call:
//!
//! - no gaps: every slot below `next_storage_id` is a live cell
//! - the key index is a bijection between live keys and their slots
//!
//! Remote operations go through a [`TopologyService`]; on any service error
//! the store is left untouched.
//!
//! # Usage
//!
//! ```ignore
//! let mut store = GridTopologyStore::new(&context, &registry, service, &StoreConfig::default())?;
//! let batch = store.init()?;
//! renderer.upload(batch);
//!
//! let children = store.subdivide_cells(&store.cells_for(&[0])?)?;
//! let updates = store.delete_cells_locally(&[0])?;
//! ```

mod shared;

pub use shared::SharedGridStore;

use std::collections::HashSet;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, warn};
use web_time::Instant;

use crate::config::{GridContext, StoreConfig};
use crate::constants::{DELETED_FLAG, UNDELETED_FLAG};
use crate::error::{GridError, GridResult};
use crate::grid::{GridKeyHashTable, LevelHierarchy};
use crate::metrics::{StoreMetrics, StoreOp};
use crate::projection::ProjectionRegistry;
use crate::render::{CellVertices, RenderContext};
use crate::transport::TopologyService;
use crate::types::{
  is_deleted, CellAttribute, CellInfo, CellKey, CellSet, GridUpdate, GridUpdateBatch, MergeResult,
  RenderInfo, SaveInfo,
};

pub struct GridTopologyStore {
  service: Box<dyn TopologyService>,
  render: Arc<RenderContext>,

  levels: Vec<u8>,
  global_ids: Vec<u32>,
  deleted: Vec<u8>,
  attributes: Vec<CellAttribute>,
  next_storage_id: u32,

  index: GridKeyHashTable,
  max_cell_count: usize,
  metrics: StoreMetrics,
}

impl GridTopologyStore {
  /// Store for `context`, resolving its CRS in `registry`.
  pub fn new(
    context: &GridContext,
    registry: &ProjectionRegistry,
    service: impl TopologyService + 'static,
    config: &StoreConfig,
  ) -> GridResult<Self> {
    context.validate()?;
    let render = Arc::new(RenderContext::new(context, registry)?);
    Self::with_render_context(render, service, config)
  }

  pub fn with_render_context(
    render: Arc<RenderContext>,
    service: impl TopologyService + 'static,
    config: &StoreConfig,
  ) -> GridResult<Self> {
    config.validate()?;
    Ok(Self {
      service: Box::new(service),
      render,
      levels: Vec::new(),
      global_ids: Vec::new(),
      deleted: Vec::new(),
      attributes: Vec::new(),
      next_storage_id: 0,
      index: GridKeyHashTable::new(config.max_cell_count),
      max_cell_count: config.max_cell_count,
      metrics: StoreMetrics::new(),
    })
  }

  // ===========================================================================
  // Accessors
  // ===========================================================================

  /// Number of live cells; also the next slot to be filled.
  pub fn next_storage_id(&self) -> u32 {
    self.next_storage_id
  }

  pub fn len(&self) -> usize {
    self.next_storage_id as usize
  }

  pub fn is_empty(&self) -> bool {
    self.next_storage_id == 0
  }

  pub fn max_cell_count(&self) -> usize {
    self.max_cell_count
  }

  pub fn render_context(&self) -> &Arc<RenderContext> {
    &self.render
  }

  pub fn level_hierarchy(&self) -> &LevelHierarchy {
    self.render.levels()
  }

  pub fn metrics(&self) -> &StoreMetrics {
    &self.metrics
  }

  pub fn service(&self) -> &dyn TopologyService {
    self.service.as_ref()
  }

  /// Key stored at `storage_id`, `None` past the live range.
  pub fn cell_info(&self, storage_id: u32) -> Option<CellKey> {
    (storage_id < self.next_storage_id).then(|| {
      let slot = storage_id as usize;
      CellKey::new(self.levels[slot], self.global_ids[slot])
    })
  }

  /// Slot currently holding `key`.
  pub fn storage_id_of(&self, key: CellKey) -> Option<u32> {
    self.index.get(key.level, key.global_id)
  }

  pub fn is_cell_deleted(&self, storage_id: u32) -> GridResult<bool> {
    self.check_slot(storage_id)?;
    Ok(is_deleted(self.deleted[storage_id as usize]))
  }

  /// Full description of one slot.
  pub fn check_cell(&self, storage_id: u32) -> GridResult<CellInfo> {
    self.check_slot(storage_id)?;
    let slot = storage_id as usize;
    let (level, global_id) = (self.levels[slot], self.global_ids[slot]);
    Ok(CellInfo {
      storage_id,
      level,
      global_id,
      local_id: self.grid_local_id(level, global_id)?,
      deleted: is_deleted(self.deleted[slot]),
    })
  }

  /// Keys at the given slots, in order.
  pub fn cells_for(&self, storage_ids: &[u32]) -> GridResult<CellSet> {
    let mut cells = CellSet::with_capacity(storage_ids.len());
    for &storage_id in storage_ids {
      self.check_slot(storage_id)?;
      let slot = storage_id as usize;
      cells.push(CellKey::new(self.levels[slot], self.global_ids[slot]));
    }
    Ok(cells)
  }

  /// Every live cell in slot order, with deleted flags.
  pub fn live_cells(&self) -> CellSet {
    CellSet {
      levels: self.levels.clone(),
      global_ids: self.global_ids.clone(),
      deleted: Some(self.deleted.clone()),
    }
  }

  /// Render info for every live cell, in slot order.
  pub fn render_info(&mut self) -> GridResult<RenderInfo> {
    let started = Instant::now();
    let info = self.render.render_info(&self.live_cells())?;
    self.record(StoreOp::Render, started);
    Ok(info)
  }

  // ===========================================================================
  // Geometry helpers
  // ===========================================================================

  pub fn compute_render_vertices(&self, level: u8, global_id: u32) -> GridResult<CellVertices> {
    self.render.compute_render_vertices(level, global_id)
  }

  pub fn grid_local_id(&self, level: u8, global_id: u32) -> GridResult<u32> {
    self.level_hierarchy().grid_local_id(level, global_id)
  }

  pub fn parent_global_id(&self, level: u8, global_id: u32) -> GridResult<Option<u32>> {
    self.level_hierarchy().parent_global_id(level, global_id)
  }

  pub fn children_global_ids(&self, level: u8, global_id: u32) -> GridResult<SmallVec<[u32; 16]>> {
    self.level_hierarchy().children_global_ids(level, global_id)
  }

  // ===========================================================================
  // Attributes
  // ===========================================================================

  pub fn set_cell_attribute(&mut self, storage_id: u32, attribute: CellAttribute) -> GridResult<()> {
    self.check_slot(storage_id)?;
    self.attributes[storage_id as usize] = attribute;
    Ok(())
  }

  pub fn cell_attribute(&self, storage_id: u32) -> GridResult<CellAttribute> {
    self.check_slot(storage_id)?;
    Ok(self.attributes[storage_id as usize])
  }

  // ===========================================================================
  // Remote operations
  // ===========================================================================

  /// Load the service's active cells followed by its deleted cells.
  ///
  /// Replaces any current content; slots start at 0.
  #[tracing::instrument(skip_all, name = "store::init")]
  pub fn init(&mut self) -> GridResult<GridUpdateBatch> {
    let started = Instant::now();
    let active = self.service.activate_info()?;
    let mut deleted = self.service.deleted_info()?;
    deleted.fill_deleted(DELETED_FLAG);
    active.validate()?;
    deleted.validate()?;
    let cells = distinct_cells(&active.concat(deleted), |_| false)?;

    if cells.len() > self.max_cell_count {
      return Err(GridError::CapacityExceeded {
        requested: cells.len(),
        capacity: self.max_cell_count,
      });
    }
    let render = self.render.render_info(&cells)?;

    self.clear();
    let batch = self.append_rendered(render)?;
    debug!(cells = batch.len(), "store initialized");
    self.record(StoreOp::Init, started);
    Ok(batch)
  }

  /// Subdivide `targets` and append the children the service returns.
  ///
  /// Parents stay in place; callers remove them with
  /// [`delete_cells_locally`](Self::delete_cells_locally).
  #[tracing::instrument(skip_all, name = "store::subdivide_cells", fields(targets = targets.len()))]
  pub fn subdivide_cells(&mut self, targets: &CellSet) -> GridResult<GridUpdateBatch> {
    let started = Instant::now();
    self.check_cells(targets)?;
    let mut children = self.service.subdivide(targets)?;
    children.fill_deleted(UNDELETED_FLAG);
    let batch = self.append_cells(&children)?;
    debug!(
      children = batch.len(),
      from_storage_id = batch.from_storage_id,
      "cells subdivided"
    );
    self.record(StoreOp::Subdivide, started);
    Ok(batch)
  }

  /// Merge the cells at `storage_ids` into their parents.
  ///
  /// Nothing local changes: the result lists the child slots to delete and
  /// the parents to append, in that order (see [`apply_merge`](Self::apply_merge)).
  #[tracing::instrument(skip_all, name = "store::merge_cells", fields(targets = storage_ids.len()))]
  pub fn merge_cells(&mut self, storage_ids: &[u32]) -> GridResult<MergeResult> {
    let started = Instant::now();
    let targets = self.cells_for(storage_ids)?;
    let mut parents = self.service.merge(&targets)?;
    parents.fill_deleted(UNDELETED_FLAG);

    let mut child_storage_ids = Vec::new();
    for parent in parents.keys() {
      for child_id in self.children_global_ids(parent.level, parent.global_id)? {
        if let Some(storage_id) = self.index.get(parent.level + 1, child_id) {
          child_storage_ids.push(storage_id);
        }
      }
    }

    let parents = self.render.render_info(&parents)?;
    debug!(
      parents = parents.len(),
      children = child_storage_ids.len(),
      "cells merged"
    );
    self.record(StoreOp::Merge, started);
    Ok(MergeResult {
      child_storage_ids,
      parents,
    })
  }

  /// Remove merged children locally, then append their parents.
  pub fn apply_merge(&mut self, result: MergeResult) -> GridResult<(Vec<GridUpdate>, GridUpdateBatch)> {
    let capacity_after =
      self.len().saturating_sub(dedup_count(&result.child_storage_ids)) + result.parents.len();
    if capacity_after > self.max_cell_count {
      return Err(GridError::CapacityExceeded {
        requested: capacity_after,
        capacity: self.max_cell_count,
      });
    }
    let updates = self.delete_cells_locally(&result.child_storage_ids)?;
    let batch = self.add_cells(&result.parents.cells())?;
    Ok((updates, batch))
  }

  /// Mark the cells at `storage_ids` deleted once the service confirms.
  ///
  /// Slots keep their cells so deleted cells can still be picked and
  /// recovered.
  #[tracing::instrument(skip_all, name = "store::delete_cells", fields(targets = storage_ids.len()))]
  pub fn delete_cells(&mut self, storage_ids: &[u32]) -> GridResult<()> {
    let started = Instant::now();
    let targets = self.cells_for(storage_ids)?;
    self.service.delete(&targets)?;
    for &storage_id in storage_ids {
      self.deleted[storage_id as usize] = DELETED_FLAG;
    }
    self.metrics.record_marked_deleted(storage_ids.len());
    debug!(cells = storage_ids.len(), "cells marked deleted");
    self.record(StoreOp::Delete, started);
    Ok(())
  }

  /// Reactivate the cells at `storage_ids` once the service confirms.
  #[tracing::instrument(skip_all, name = "store::recover_cells", fields(targets = storage_ids.len()))]
  pub fn recover_cells(&mut self, storage_ids: &[u32]) -> GridResult<()> {
    let started = Instant::now();
    let targets = self.cells_for(storage_ids)?;
    self.service.recover(&targets)?;
    for &storage_id in storage_ids {
      self.deleted[storage_id as usize] = UNDELETED_FLAG;
    }
    debug!(cells = storage_ids.len(), "cells recovered");
    self.record(StoreOp::Recover, started);
    Ok(())
  }

  /// Recover cells by key. Tracked keys get their flag cleared; keys no
  /// longer tracked are appended.
  #[tracing::instrument(skip_all, name = "store::recover_cells_by_key", fields(targets = targets.len()))]
  pub fn recover_cells_by_key(&mut self, targets: &CellSet) -> GridResult<GridUpdateBatch> {
    let started = Instant::now();
    self.check_cells(targets)?;
    self.service.recover(targets)?;

    let mut untracked = CellSet::default();
    untracked.fill_deleted(UNDELETED_FLAG);
    for key in targets.keys() {
      match self.index.get(key.level, key.global_id) {
        Some(storage_id) => self.deleted[storage_id as usize] = UNDELETED_FLAG,
        None => untracked.push(key),
      }
    }
    let batch = self.append_cells(&untracked)?;
    self.record(StoreOp::Recover, started);
    Ok(batch)
  }

  /// Slots of the cells a feature selects; keys not tracked here stay `None`.
  #[tracing::instrument(skip_all, name = "store::cells_by_feature")]
  pub fn cells_by_feature(&mut self, feature_dir: &str) -> GridResult<Vec<Option<u32>>> {
    let started = Instant::now();
    let picked = self.service.pick(feature_dir)?;
    let storage_ids: Vec<Option<u32>> = picked
      .keys()
      .map(|key| self.index.get(key.level, key.global_id))
      .collect();
    let misses = storage_ids.iter().filter(|id| id.is_none()).count();
    if misses > 0 {
      warn!(feature_dir, misses, "picked cells not tracked by the store");
    }
    self.record(StoreOp::Pick, started);
    Ok(storage_ids)
  }

  pub fn save(&mut self) -> GridResult<SaveInfo> {
    let info = self.service.save()?;
    debug!(success = info.success, detail = %info.message, "topology saved");
    Ok(info)
  }

  // ===========================================================================
  // Local operations
  // ===========================================================================

  /// Append externally supplied cells (e.g. merged parents).
  ///
  /// Keys already tracked, and repeats within `cells`, are skipped.
  pub fn add_cells(&mut self, cells: &CellSet) -> GridResult<GridUpdateBatch> {
    self.append_cells(cells)
  }

  /// Remove the cells at `storage_ids` and compact the arrays.
  ///
  /// Each hole below the new end is filled with a live cell taken from the
  /// tail. The returned updates must be applied in order.
  #[tracing::instrument(skip_all, name = "store::delete_cells_locally", fields(targets = storage_ids.len()))]
  pub fn delete_cells_locally(&mut self, storage_ids: &[u32]) -> GridResult<Vec<GridUpdate>> {
    for &storage_id in storage_ids {
      self.check_slot(storage_id)?;
    }
    let mut removable = storage_ids.to_vec();
    removable.sort_unstable();
    removable.dedup();
    if removable.is_empty() {
      return Ok(Vec::new());
    }

    let new_end = self.next_storage_id - removable.len() as u32;
    let holes: Vec<u32> = removable
      .iter()
      .copied()
      .take_while(|&id| id < new_end)
      .collect();
    let replacements: Vec<u32> = (new_end..self.next_storage_id)
      .rev()
      .filter(|id| removable.binary_search(id).is_err())
      .collect();
    debug_assert_eq!(holes.len(), replacements.len());

    // Geometry first so a failure leaves the store untouched.
    let geometry: Vec<CellVertices> = replacements
      .iter()
      .map(|&src| {
        let slot = src as usize;
        self.render.compute_render_vertices(self.levels[slot], self.global_ids[slot])
      })
      .collect::<GridResult<_>>()?;

    for &id in &removable {
      let slot = id as usize;
      self.index.delete(self.levels[slot], self.global_ids[slot]);
    }

    let mut updates = Vec::with_capacity(holes.len());
    for ((&hole, &src), (vertices, vertices_low)) in holes.iter().zip(&replacements).zip(geometry) {
      self.move_slot(src, hole)?;
      let slot = hole as usize;
      updates.push(GridUpdate {
        storage_id: hole,
        level: self.levels[slot],
        vertices,
        vertices_low,
        deleted: self.deleted[slot],
      });
    }

    self.truncate(new_end);
    self.metrics.record_removed(removable.len(), updates.len());
    debug!(
      removed = removable.len(),
      relocated = updates.len(),
      next_storage_id = self.next_storage_id,
      "cells deleted locally"
    );
    Ok(updates)
  }

  /// Swap-remove one cell: the last cell moves into its slot.
  ///
  /// Returns `None` when the removed cell was already the last one.
  pub fn delete_cell_locally(&mut self, storage_id: u32) -> GridResult<Option<GridUpdate>> {
    self.check_slot(storage_id)?;
    let last = self.next_storage_id - 1;
    let geometry = if storage_id == last {
      None
    } else {
      let slot = last as usize;
      Some(self.render.compute_render_vertices(self.levels[slot], self.global_ids[slot])?)
    };

    let slot = storage_id as usize;
    self.index.delete(self.levels[slot], self.global_ids[slot]);

    let update = match geometry {
      None => None,
      Some((vertices, vertices_low)) => {
        self.move_slot(last, storage_id)?;
        Some(GridUpdate {
          storage_id,
          level: self.levels[slot],
          vertices,
          vertices_low,
          deleted: self.deleted[slot],
        })
      }
    };

    self.truncate(last);
    self.metrics.record_removed(1, update.is_some() as usize);
    Ok(update)
  }

  // ===========================================================================
  // Internals
  // ===========================================================================

  fn check_slot(&self, storage_id: u32) -> GridResult<()> {
    if storage_id >= self.next_storage_id {
      return Err(GridError::InvalidStorageId {
        storage_id,
        len: self.next_storage_id,
      });
    }
    Ok(())
  }

  fn clear(&mut self) {
    self.levels.clear();
    self.global_ids.clear();
    self.deleted.clear();
    self.attributes.clear();
    self.index.clear();
    self.next_storage_id = 0;
  }

  fn truncate(&mut self, len: u32) {
    let n = len as usize;
    self.levels.truncate(n);
    self.global_ids.truncate(n);
    self.deleted.truncate(n);
    self.attributes.truncate(n);
    self.next_storage_id = len;
  }

  /// Reject sets with ragged columns or keys outside the hierarchy.
  fn check_cells(&self, cells: &CellSet) -> GridResult<()> {
    cells.validate()?;
    let levels = self.level_hierarchy();
    for key in cells.keys() {
      levels.cell_info(key.level, key.global_id)?;
    }
    Ok(())
  }

  /// Copy slot `src` over slot `dst` and re-point the index at `dst`.
  fn move_slot(&mut self, src: u32, dst: u32) -> GridResult<()> {
    let (s, d) = (src as usize, dst as usize);
    self.levels[d] = self.levels[s];
    self.global_ids[d] = self.global_ids[s];
    self.deleted[d] = self.deleted[s];
    self.attributes[d] = self.attributes[s];
    self.index.update(dst, self.levels[d], self.global_ids[d])
  }

  /// Append cells not yet tracked, computing their geometry first.
  fn append_cells(&mut self, cells: &CellSet) -> GridResult<GridUpdateBatch> {
    self.check_cells(cells)?;
    let fresh = distinct_cells(cells, |key| self.index.contains(key.level, key.global_id))?;
    let skipped = cells.len() - fresh.len();
    if skipped > 0 {
      warn!(skipped, "cells already tracked were not appended");
    }

    let requested = self.len() + fresh.len();
    if requested > self.max_cell_count {
      return Err(GridError::CapacityExceeded {
        requested,
        capacity: self.max_cell_count,
      });
    }
    let render = self.render.render_info(&fresh)?;
    self.append_rendered(render)
  }

  /// Push already rendered, untracked cells at the end of the arrays.
  fn append_rendered(&mut self, render: RenderInfo) -> GridResult<GridUpdateBatch> {
    let from_storage_id = self.next_storage_id;
    for i in 0..render.len() {
      let storage_id = self.next_storage_id;
      let (level, global_id) = (render.levels[i], render.global_ids[i]);
      self.index.update(storage_id, level, global_id)?;
      self.levels.push(level);
      self.global_ids.push(global_id);
      self.deleted.push(render.deleted[i]);
      self.attributes.push(CellAttribute::default());
      self.next_storage_id += 1;
    }
    self.metrics.record_added(render.len());

    Ok(GridUpdateBatch {
      from_storage_id,
      levels: render.levels,
      vertices: render.vertices,
      vertices_low: render.vertices_low,
      deleted: render.deleted,
    })
  }

  fn record(&mut self, op: StoreOp, started: Instant) {
    self
      .metrics
      .record_timing(op, started.elapsed().as_micros() as u64);
  }
}

fn dedup_count(ids: &[u32]) -> usize {
  ids.iter().collect::<HashSet<_>>().len()
}

/// First occurrence of every key not rejected by `skip`, keeping its flag.
fn distinct_cells(cells: &CellSet, skip: impl Fn(CellKey) -> bool) -> GridResult<CellSet> {
  cells.validate()?;
  let mut seen = HashSet::with_capacity(cells.len());
  let mut distinct = CellSet::with_capacity(cells.len());
  let mut flags = Vec::with_capacity(cells.len());
  for i in 0..cells.len() {
    let key = cells.key(i);
    if skip(key) || !seen.insert(key) {
      continue;
    }
    distinct.push(key);
    flags.push(cells.deleted_flag(i));
  }
  distinct.deleted = Some(flags);
  Ok(distinct)
}
