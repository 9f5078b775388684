//! Patch and store configuration.
//!
//! `GridContext` describes one patch (source CRS, extent, subdivide rules)
//! and is built either from the service's `/meta` JSON (`PatchMeta`) or from
//! a TOML file. `StoreConfig` sizes the dense storage and the worker pool.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_CELL_COUNT;
use crate::error::{GridError, GridResult};
use crate::grid::{LevelHierarchy, SubdivideRule};
use crate::math::BoundingBox2D;
use crate::projection::normalize_epsg;

/// Patch metadata as served by `GET /meta`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchMeta {
  pub name: String,
  pub epsg: u32,
  pub subdivide_rules: Vec<[u32; 2]>,
  pub bounds: [f64; 4],
}

impl PatchMeta {
  pub fn from_json(bytes: &[u8]) -> GridResult<Self> {
    Ok(serde_json::from_slice(bytes)?)
  }

  /// Validated grid context for this patch.
  pub fn to_context(&self) -> GridResult<GridContext> {
    let context = GridContext {
      src_epsg: normalize_epsg(&self.epsg.to_string()),
      bounds: self.bounds,
      rules: self
        .subdivide_rules
        .iter()
        .copied()
        .map(SubdivideRule::from)
        .collect(),
    };
    context.validate()?;
    Ok(context)
  }
}

/// Everything needed to turn `(level, global_id)` into geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridContext {
  /// Source CRS, e.g. `"EPSG:2326"`.
  pub src_epsg: String,
  /// `[minx, miny, maxx, maxy]` in the source CRS.
  pub bounds: [f64; 4],
  /// Split ratio per level, coarsest first.
  pub rules: Vec<SubdivideRule>,
}

impl GridContext {
  pub fn new(src_epsg: &str, bounds: [f64; 4], rules: Vec<SubdivideRule>) -> GridResult<Self> {
    let context = Self {
      src_epsg: normalize_epsg(src_epsg),
      bounds,
      rules,
    };
    context.validate()?;
    Ok(context)
  }

  /// Reject empty or too-deep rule lists, zero ratios and degenerate
  /// bounds.
  pub fn validate(&self) -> GridResult<()> {
    if self.rules.is_empty() {
      return Err(GridError::Config("at least one subdivide rule is required".into()));
    }
    // Levels are addressed by u8.
    if self.rules.len() > u8::MAX as usize {
      return Err(GridError::Config(format!(
        "{} subdivide rules; at most {} levels below the root are supported",
        self.rules.len(),
        u8::MAX
      )));
    }
    if let Some((level, rule)) = self
      .rules
      .iter()
      .enumerate()
      .find(|(_, rule)| rule.x == 0 || rule.y == 0)
    {
      return Err(GridError::Config(format!(
        "subdivide rule {} is [{}, {}]; ratios must be positive",
        level, rule.x, rule.y
      )));
    }
    let [min_x, min_y, max_x, max_y] = self.bounds;
    if !self.bounds.iter().all(|v| v.is_finite()) || min_x >= max_x || min_y >= max_y {
      return Err(GridError::Config(format!(
        "bounds {:?} must be finite with min < max",
        self.bounds
      )));
    }
    // Every level must stay addressable by a u32 global id.
    let (mut width, mut height) = (1u64, 1u64);
    for (level, rule) in self.rules.iter().enumerate() {
      width = width.saturating_mul(rule.x as u64);
      height = height.saturating_mul(rule.y as u64);
      let cells = width.saturating_mul(height);
      if cells > u32::MAX as u64 {
        return Err(GridError::Config(format!(
          "level {} has {} cells, more than a u32 global id can address",
          level + 1,
          cells
        )));
      }
    }
    Ok(())
  }

  pub fn bbox(&self) -> BoundingBox2D {
    BoundingBox2D::from_array(self.bounds)
  }

  pub fn levels(&self) -> LevelHierarchy {
    LevelHierarchy::new(self.rules.clone())
  }

  pub fn from_toml_str(content: &str) -> GridResult<Self> {
    let context: GridContext = toml::from_str(content)?;
    context.validate()?;
    Ok(GridContext {
      src_epsg: normalize_epsg(&context.src_epsg),
      ..context
    })
  }

  pub fn load(path: &Path) -> GridResult<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }
}

/// Store sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Dense array capacity; also sizes the key index.
  pub max_cell_count: usize,
  /// Worker pool size. `0` uses rayon's global pool.
  pub worker_threads: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      max_cell_count: DEFAULT_MAX_CELL_COUNT,
      worker_threads: 0,
    }
  }
}

impl StoreConfig {
  pub fn with_max_cell_count(max_cell_count: usize) -> Self {
    Self {
      max_cell_count,
      ..Self::default()
    }
  }

  pub fn validate(&self) -> GridResult<()> {
    if self.max_cell_count == 0 {
      return Err(GridError::Config("max_cell_count must be positive".into()));
    }
    if self.max_cell_count >= u32::MAX as usize {
      return Err(GridError::Config(format!(
        "max_cell_count {} does not fit a u32 storage id",
        self.max_cell_count
      )));
    }
    Ok(())
  }
}
