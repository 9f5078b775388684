//! Core value types shared by the store, codec, transport and worker.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CELL_HEIGHT, DEFAULT_CELL_KIND, DELETED_FLAG, UNDELETED_FLAG};
use crate::error::{GridError, GridResult};

/// Identity of a cell: its level and row-major index within that level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
  pub level: u8,
  pub global_id: u32,
}

impl CellKey {
  pub fn new(level: u8, global_id: u32) -> Self {
    Self { level, global_id }
  }

  /// `"level-globalId"`, the textual key used by the service and the UI.
  pub fn uuid(&self) -> String {
    format!("{}-{}", self.level, self.global_id)
  }
}

/// Column-oriented set of cells, the unit exchanged with the service and
/// the worker.
///
/// `deleted`, when present, holds one flag per cell. It never travels over
/// the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSet {
  pub levels: Vec<u8>,
  pub global_ids: Vec<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deleted: Option<Vec<u8>>,
}

impl CellSet {
  pub fn new(levels: Vec<u8>, global_ids: Vec<u32>) -> GridResult<Self> {
    if levels.len() != global_ids.len() {
      return Err(GridError::MismatchedCellSet {
        levels: levels.len(),
        global_ids: global_ids.len(),
      });
    }
    Ok(Self {
      levels,
      global_ids,
      deleted: None,
    })
  }

  /// Check that the columns (and flags, when carried) have one entry per
  /// cell.
  pub fn validate(&self) -> GridResult<()> {
    let flags_match = self
      .deleted
      .as_ref()
      .map_or(true, |flags| flags.len() == self.levels.len());
    if self.levels.len() != self.global_ids.len() || !flags_match {
      return Err(GridError::MismatchedCellSet {
        levels: self.levels.len(),
        global_ids: self.global_ids.len(),
      });
    }
    Ok(())
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      levels: Vec::with_capacity(capacity),
      global_ids: Vec::with_capacity(capacity),
      deleted: None,
    }
  }

  pub fn from_keys<I: IntoIterator<Item = CellKey>>(keys: I) -> Self {
    let mut set = Self::default();
    for key in keys {
      set.push(key);
    }
    set
  }

  pub fn push(&mut self, key: CellKey) {
    self.levels.push(key.level);
    self.global_ids.push(key.global_id);
    if let Some(deleted) = self.deleted.as_mut() {
      deleted.push(UNDELETED_FLAG);
    }
  }

  pub fn len(&self) -> usize {
    self.levels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.levels.is_empty()
  }

  pub fn key(&self, index: usize) -> CellKey {
    CellKey::new(self.levels[index], self.global_ids[index])
  }

  pub fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
    self
      .levels
      .iter()
      .zip(self.global_ids.iter())
      .map(|(&level, &global_id)| CellKey::new(level, global_id))
  }

  /// Deleted flag for `index` (undeleted when no flags are carried).
  pub fn deleted_flag(&self, index: usize) -> u8 {
    self
      .deleted
      .as_ref()
      .map_or(UNDELETED_FLAG, |flags| flags[index])
  }

  /// Attach a flag array with every cell set to `flag`.
  pub fn fill_deleted(&mut self, flag: u8) {
    self.deleted = Some(vec![flag; self.len()]);
  }

  /// Append `other` after `self`, carrying flags when either side has them.
  pub fn concat(mut self, other: CellSet) -> Self {
    let self_flags = self
      .deleted
      .take()
      .unwrap_or_else(|| vec![UNDELETED_FLAG; self.len()]);
    let other_flags = other
      .deleted
      .clone()
      .unwrap_or_else(|| vec![UNDELETED_FLAG; other.len()]);
    self.levels.extend_from_slice(&other.levels);
    self.global_ids.extend_from_slice(&other.global_ids);
    let mut flags = self_flags;
    flags.extend(other_flags);
    self.deleted = Some(flags);
    self
  }
}

/// Per-cell editable attributes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellAttribute {
  pub height: f64,
  pub kind: u8,
}

impl Default for CellAttribute {
  fn default() -> Self {
    Self {
      height: DEFAULT_CELL_HEIGHT,
      kind: DEFAULT_CELL_KIND,
    }
  }
}

/// Cells plus their render vertices, as produced for the renderer.
///
/// `vertices` / `vertices_low` hold 8 floats per cell (TL, TR, BL, BR corners,
/// each `x, y`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderInfo {
  pub levels: Vec<u8>,
  pub global_ids: Vec<u32>,
  pub vertices: Vec<f32>,
  pub vertices_low: Vec<f32>,
  pub deleted: Vec<u8>,
}

impl RenderInfo {
  pub fn len(&self) -> usize {
    self.levels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.levels.is_empty()
  }

  pub fn cells(&self) -> CellSet {
    CellSet {
      levels: self.levels.clone(),
      global_ids: self.global_ids.clone(),
      deleted: Some(self.deleted.clone()),
    }
  }
}

/// Contiguous block of cells appended at `from_storage_id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridUpdateBatch {
  pub from_storage_id: u32,
  pub levels: Vec<u8>,
  pub vertices: Vec<f32>,
  pub vertices_low: Vec<f32>,
  pub deleted: Vec<u8>,
}

impl GridUpdateBatch {
  pub fn empty(from_storage_id: u32) -> Self {
    Self {
      from_storage_id,
      ..Self::default()
    }
  }

  pub fn len(&self) -> usize {
    self.levels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.levels.is_empty()
  }
}

/// In-place overwrite of one slot's render geometry after compaction.
///
/// Records must be applied in the order they were emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct GridUpdate {
  pub storage_id: u32,
  pub level: u8,
  pub vertices: [f32; 8],
  pub vertices_low: [f32; 8],
  pub deleted: u8,
}

/// Snapshot of one slot for inspection panels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellInfo {
  pub storage_id: u32,
  pub level: u8,
  pub global_id: u32,
  pub local_id: u32,
  pub deleted: bool,
}

/// Outcome of a merge: the parents to append and the children they replace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeResult {
  pub child_storage_ids: Vec<u32>,
  pub parents: RenderInfo,
}

/// Response of the service's save endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveInfo {
  pub success: bool,
  pub message: String,
}

/// Render vertices split per corner, for consumers that upload each corner
/// as its own attribute stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredRenderVertices {
  pub tl: Vec<f32>,
  pub tr: Vec<f32>,
  pub bl: Vec<f32>,
  pub br: Vec<f32>,
  pub tl_low: Vec<f32>,
  pub tr_low: Vec<f32>,
  pub bl_low: Vec<f32>,
  pub br_low: Vec<f32>,
}

impl StructuredRenderVertices {
  pub fn with_capacity(cells: usize) -> Self {
    let pairs = cells * 2;
    Self {
      tl: Vec::with_capacity(pairs),
      tr: Vec::with_capacity(pairs),
      bl: Vec::with_capacity(pairs),
      br: Vec::with_capacity(pairs),
      tl_low: Vec::with_capacity(pairs),
      tr_low: Vec::with_capacity(pairs),
      bl_low: Vec::with_capacity(pairs),
      br_low: Vec::with_capacity(pairs),
    }
  }

  /// Append one cell's interleaved `[tl, tr, bl, br]` vertices.
  pub fn push(&mut self, vertices: &[f32; 8], vertices_low: &[f32; 8]) {
    self.tl.extend_from_slice(&vertices[0..2]);
    self.tr.extend_from_slice(&vertices[2..4]);
    self.bl.extend_from_slice(&vertices[4..6]);
    self.br.extend_from_slice(&vertices[6..8]);
    self.tl_low.extend_from_slice(&vertices_low[0..2]);
    self.tr_low.extend_from_slice(&vertices_low[2..4]);
    self.bl_low.extend_from_slice(&vertices_low[4..6]);
    self.br_low.extend_from_slice(&vertices_low[6..8]);
  }

  pub fn len(&self) -> usize {
    self.tl.len() / 2
  }

  pub fn is_empty(&self) -> bool {
    self.tl.is_empty()
  }
}

/// True when `flag` marks a deleted cell.
#[inline]
pub fn is_deleted(flag: u8) -> bool {
  flag == DELETED_FLAG
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
