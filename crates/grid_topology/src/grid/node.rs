//! GridNode - geometric view of one cell, derived on demand.
//!
//! A node is built from `(level, global_id)` and the level dimensions. Its
//! extents are exact fractions of the patch, so sibling boundaries compare
//! equal no matter how deep the hierarchy goes.

use std::collections::HashSet;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::level::LevelInfo;
use crate::error::GridResult;
use crate::math::{lerp, mercator, BoundingBox2D, Fraction};
use crate::projection::Projection;
use crate::types::CellKey;

/// Side of a cell, used to index `edges` and `neighbours`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeCode {
  North = 0,
  West = 1,
  South = 2,
  East = 3,
}

impl EdgeCode {
  pub const ALL: [EdgeCode; 4] = [
    EdgeCode::North,
    EdgeCode::West,
    EdgeCode::South,
    EdgeCode::East,
  ];

  #[inline]
  pub fn index(self) -> usize {
    self as usize
  }

  pub fn opposite(self) -> EdgeCode {
    match self {
      EdgeCode::North => EdgeCode::South,
      EdgeCode::West => EdgeCode::East,
      EdgeCode::South => EdgeCode::North,
      EdgeCode::East => EdgeCode::West,
    }
  }
}

/// Fractional extents of a node, in `[num, den]` pairs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExtents {
  pub x_min_percent: [u64; 2],
  pub y_min_percent: [u64; 2],
  pub x_max_percent: [u64; 2],
  pub y_max_percent: [u64; 2],
}

/// One cell with its fractional extents and adjacency.
#[derive(Clone, Debug)]
pub struct GridNode {
  pub level: u8,
  pub global_id: u32,
  pub storage_id: u32,

  pub x_min: Fraction,
  pub x_max: Fraction,
  pub y_min: Fraction,
  pub y_max: Fraction,

  /// Edge indices per side.
  pub edges: [HashSet<u32>; 4],
  /// Neighbour storage ids per side.
  pub neighbours: [HashSet<u32>; 4],
}

impl GridNode {
  /// Node covering the whole patch.
  pub fn root(storage_id: u32) -> Self {
    Self {
      level: 0,
      global_id: 0,
      storage_id,
      x_min: Fraction::ZERO,
      x_max: Fraction::ONE,
      y_min: Fraction::ZERO,
      y_max: Fraction::ONE,
      edges: Default::default(),
      neighbours: Default::default(),
    }
  }

  /// Node for `global_id` within a level of the given dimensions.
  pub fn new(level: u8, global_id: u32, storage_id: u32, info: LevelInfo) -> Self {
    let (u, v) = info.coords(global_id);
    let (u, v) = (u as u64, v as u64);
    let (width, height) = (info.width as u64, info.height as u64);
    Self {
      level,
      global_id,
      storage_id,
      x_min: Fraction::simplify(u, width),
      x_max: Fraction::simplify(u + 1, width),
      y_min: Fraction::simplify(v, height),
      y_max: Fraction::simplify(v + 1, height),
      edges: Default::default(),
      neighbours: Default::default(),
    }
  }

  pub fn key(&self) -> CellKey {
    CellKey::new(self.level, self.global_id)
  }

  /// `"level-globalId"`.
  pub fn uuid(&self) -> String {
    self.key().uuid()
  }

  pub fn same_cell(&self, other: &GridNode) -> bool {
    self.level == other.level && self.global_id == other.global_id
  }

  pub fn reset_edges(&mut self) {
    for edge in &mut self.edges {
      edge.clear();
    }
  }

  pub fn add_edge(&mut self, edge_index: u32, code: EdgeCode) {
    self.edges[code.index()].insert(edge_index);
  }

  pub fn add_neighbour(&mut self, storage_id: u32, code: EdgeCode) {
    self.neighbours[code.index()].insert(storage_id);
  }

  /// All edge indices, north, west, south, then east.
  pub fn edge_keys(&self) -> Vec<u32> {
    EdgeCode::ALL
      .iter()
      .flat_map(|code| self.edges[code.index()].iter().copied())
      .collect()
  }

  pub fn extents(&self) -> NodeExtents {
    NodeExtents {
      x_min_percent: self.x_min.as_pair(),
      y_min_percent: self.y_min.as_pair(),
      x_max_percent: self.x_max.as_pair(),
      y_max_percent: self.y_max.as_pair(),
    }
  }

  /// Extents in source coordinates: `(min, max)` corners.
  pub fn source_rect(&self, bbox: &BoundingBox2D) -> (DVec2, DVec2) {
    let min = DVec2::new(
      lerp(bbox.x_min(), bbox.x_max(), self.x_min.to_f64()),
      lerp(bbox.y_min(), bbox.y_max(), self.y_min.to_f64()),
    );
    let max = DVec2::new(
      lerp(bbox.x_min(), bbox.x_max(), self.x_max.to_f64()),
      lerp(bbox.y_min(), bbox.y_max(), self.y_max.to_f64()),
    );
    (min, max)
  }

  /// Whether a source-coordinate point falls inside the node (edges
  /// inclusive).
  pub fn within(&self, bbox: &BoundingBox2D, x: f64, y: f64) -> bool {
    let (min, max) = self.source_rect(bbox);
    !(x < min.x || y < min.y || x > max.x || y > max.y)
  }

  /// Corners TL, TR, BL, BR in normalized Mercator coordinates.
  pub fn vertices(&self, projection: &Projection, bbox: &BoundingBox2D) -> GridResult<[DVec2; 4]> {
    let (min, max) = self.source_rect(bbox);
    let corners = [
      DVec2::new(min.x, max.y),
      DVec2::new(max.x, max.y),
      DVec2::new(min.x, min.y),
      DVec2::new(max.x, min.y),
    ];
    let mut out = [DVec2::ZERO; 4];
    for (slot, corner) in out.iter_mut().zip(corners) {
      *slot = mercator::from_lon_lat(projection.forward(corner)?);
    }
    Ok(out)
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
