//! Level hierarchy: per-level grid dimensions and id math between levels.
//!
//! Level 0 is a single cell covering the patch. Rule `n` splits each level-`n`
//! cell into `x * y` level-`n + 1` cells, so a patch with `k` rules has
//! `k + 1` levels and the finest level cannot be subdivided.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{GridError, GridResult};

/// Split ratio applied to one level: `x` columns by `y` rows per parent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct SubdivideRule {
  pub x: u32,
  pub y: u32,
}

impl SubdivideRule {
  pub fn new(x: u32, y: u32) -> Self {
    Self { x, y }
  }

  /// Children produced per parent cell.
  pub fn cells_per_parent(&self) -> u32 {
    self.x * self.y
  }
}

impl From<[u32; 2]> for SubdivideRule {
  fn from([x, y]: [u32; 2]) -> Self {
    Self { x, y }
  }
}

impl From<SubdivideRule> for [u32; 2] {
  fn from(rule: SubdivideRule) -> Self {
    [rule.x, rule.y]
  }
}

/// Dimensions of the implicit grid at one level.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct LevelInfo {
  pub width: u32,
  pub height: u32,
}

impl LevelInfo {
  pub const ROOT: LevelInfo = LevelInfo {
    width: 1,
    height: 1,
  };

  pub fn cell_count(&self) -> u64 {
    self.width as u64 * self.height as u64
  }

  /// `(u, v)` column and row of a global id at this level.
  #[inline]
  pub fn coords(&self, global_id: u32) -> (u32, u32) {
    (global_id % self.width, global_id / self.width)
  }
}

/// `level[0] = 1x1`, `level[n] = level[n - 1] * rule[n - 1]`.
pub fn derive_level_infos(rules: &[SubdivideRule]) -> Vec<LevelInfo> {
  let mut infos = Vec::with_capacity(rules.len() + 1);
  infos.push(LevelInfo::ROOT);
  for rule in rules {
    let prev = infos[infos.len() - 1];
    infos.push(LevelInfo {
      width: prev.width * rule.x,
      height: prev.height * rule.y,
    });
  }
  infos
}

/// Rules together with the level dimensions they produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelHierarchy {
  rules: Vec<SubdivideRule>,
  infos: Vec<LevelInfo>,
}

impl LevelHierarchy {
  pub fn new(rules: Vec<SubdivideRule>) -> Self {
    let infos = derive_level_infos(&rules);
    Self { rules, infos }
  }

  pub fn rules(&self) -> &[SubdivideRule] {
    &self.rules
  }

  pub fn infos(&self) -> &[LevelInfo] {
    &self.infos
  }

  pub fn level_count(&self) -> usize {
    self.infos.len()
  }

  /// Level dimensions, or `InvalidLevel` past the finest level.
  pub fn info(&self, level: u8) -> GridResult<LevelInfo> {
    self
      .infos
      .get(level as usize)
      .copied()
      .ok_or(GridError::InvalidLevel {
        level,
        levels: self.infos.len(),
      })
  }

  /// Level dimensions for a cell, or `InvalidGlobalId` when `global_id`
  /// falls outside `width * height`.
  pub fn cell_info(&self, level: u8, global_id: u32) -> GridResult<LevelInfo> {
    let info = self.info(level)?;
    let cells = info.cell_count();
    if u64::from(global_id) >= cells {
      return Err(GridError::InvalidGlobalId {
        level,
        global_id,
        cells,
      });
    }
    Ok(info)
  }

  /// Index of a cell inside its parent's block, row-major in the rule that
  /// produced its level. Level 0 cells have local id 0.
  pub fn grid_local_id(&self, level: u8, global_id: u32) -> GridResult<u32> {
    let info = self.cell_info(level, global_id)?;
    if level == 0 {
      return Ok(0);
    }
    let rule = self.rules[level as usize - 1];
    let (u, v) = info.coords(global_id);
    Ok((v % rule.y) * rule.x + (u % rule.x))
  }

  /// Global id of the parent cell one level up. `None` at level 0.
  pub fn parent_global_id(&self, level: u8, global_id: u32) -> GridResult<Option<u32>> {
    let info = self.cell_info(level, global_id)?;
    if level == 0 {
      return Ok(None);
    }
    let rule = self.rules[level as usize - 1];
    let parent_width = self.infos[level as usize - 1].width;
    let (u, v) = info.coords(global_id);
    Ok(Some((v / rule.y) * parent_width + u / rule.x))
  }

  /// Global ids of every child one level down, row-major. Empty at the
  /// finest level.
  pub fn children_global_ids(&self, level: u8, global_id: u32) -> GridResult<SmallVec<[u32; 16]>> {
    let info = self.cell_info(level, global_id)?;
    let mut children = SmallVec::new();
    let Some(rule) = self.rules.get(level as usize).copied() else {
      return Ok(children);
    };

    let (u, v) = info.coords(global_id);
    let child_width = info.width * rule.x;
    for sub_v in 0..rule.y {
      for sub_u in 0..rule.x {
        children.push((v * rule.y + sub_v) * child_width + u * rule.x + sub_u);
      }
    }
    Ok(children)
  }
}
