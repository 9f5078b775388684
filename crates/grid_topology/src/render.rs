//! Render vertices: cell corners in center-relative double-float Mercator.
//!
//! Each cell yields 8 high floats and 8 low floats, corners TL, TR, BL, BR,
//! each as `(x, y)`. Both parts are relative to the patch center, subtracted
//! part-wise so the shader can rebuild `(high + low)` without cancellation.

use rayon::prelude::*;

use crate::config::GridContext;
use crate::error::GridResult;
use crate::grid::{GridNode, LevelHierarchy};
use crate::math::{mercator, BoundingBox2D, DoubleF32};
use crate::projection::{Projection, ProjectionRegistry};
use crate::types::{CellKey, CellSet, RenderInfo, StructuredRenderVertices};

/// High and low vertex floats for one cell.
pub type CellVertices = ([f32; 8], [f32; 8]);

/// Read-only state needed to place cells on the map.
///
/// Cheap to share across threads behind an `Arc`.
#[derive(Clone, Debug)]
pub struct RenderContext {
  bbox: BoundingBox2D,
  projection: Projection,
  levels: LevelHierarchy,
  center_x: DoubleF32,
  center_y: DoubleF32,
}

impl RenderContext {
  /// Resolve the patch CRS in `registry` and precompute the center.
  pub fn new(context: &GridContext, registry: &ProjectionRegistry) -> GridResult<Self> {
    let projection = registry.get(&context.src_epsg)?;
    Self::with_projection(context, projection)
  }

  pub fn with_projection(context: &GridContext, projection: Projection) -> GridResult<Self> {
    let bbox = context.bbox();
    let center = mercator::from_lon_lat(projection.forward(bbox.center())?);
    Ok(Self {
      bbox,
      projection,
      levels: context.levels(),
      center_x: DoubleF32::encode(center.x),
      center_y: DoubleF32::encode(center.y),
    })
  }

  pub fn levels(&self) -> &LevelHierarchy {
    &self.levels
  }

  pub fn bbox(&self) -> &BoundingBox2D {
    &self.bbox
  }

  pub fn projection(&self) -> &Projection {
    &self.projection
  }

  /// Patch center as `[x_high, x_low, y_high, y_low]`.
  pub fn center(&self) -> [f32; 4] {
    [
      self.center_x.high,
      self.center_x.low,
      self.center_y.high,
      self.center_y.low,
    ]
  }

  /// Geometric node for a cell.
  pub fn node(&self, level: u8, global_id: u32, storage_id: u32) -> GridResult<GridNode> {
    let info = self.levels.cell_info(level, global_id)?;
    Ok(GridNode::new(level, global_id, storage_id, info))
  }

  /// Vertices for one cell. Deterministic: identical inputs give
  /// bit-identical output.
  pub fn compute_render_vertices(&self, level: u8, global_id: u32) -> GridResult<CellVertices> {
    let node = self.node(level, global_id, 0)?;
    let corners = node.vertices(&self.projection, &self.bbox)?;

    let mut vertices = [0.0f32; 8];
    let mut vertices_low = [0.0f32; 8];
    for (i, corner) in corners.iter().enumerate() {
      let x = DoubleF32::encode(corner.x).relative_to(self.center_x);
      let y = DoubleF32::encode(corner.y).relative_to(self.center_y);
      vertices[i * 2] = x.high;
      vertices[i * 2 + 1] = y.high;
      vertices_low[i * 2] = x.low;
      vertices_low[i * 2 + 1] = y.low;
    }
    Ok((vertices, vertices_low))
  }

  /// Vertices for many cells, in parallel, concatenated in input order.
  pub fn compute_batch<I>(&self, keys: I) -> GridResult<(Vec<f32>, Vec<f32>)>
  where
    I: IntoParallelIterator<Item = CellKey>,
    I::Iter: IndexedParallelIterator,
  {
    let per_cell: Vec<CellVertices> = keys
      .into_par_iter()
      .map(|key| self.compute_render_vertices(key.level, key.global_id))
      .collect::<GridResult<_>>()?;

    let mut vertices = Vec::with_capacity(per_cell.len() * 8);
    let mut vertices_low = Vec::with_capacity(per_cell.len() * 8);
    for (high, low) in &per_cell {
      vertices.extend_from_slice(high);
      vertices_low.extend_from_slice(low);
    }
    Ok((vertices, vertices_low))
  }

  /// Render info for a cell set, keeping its deleted flags.
  pub fn render_info(&self, cells: &CellSet) -> GridResult<RenderInfo> {
    cells.validate()?;
    let keys: Vec<CellKey> = cells.keys().collect();
    let (vertices, vertices_low) = self.compute_batch(keys)?;
    Ok(RenderInfo {
      levels: cells.levels.clone(),
      global_ids: cells.global_ids.clone(),
      vertices,
      vertices_low,
      deleted: (0..cells.len()).map(|i| cells.deleted_flag(i)).collect(),
    })
  }

  /// Per-corner vertex streams for a cell set.
  pub fn structured_vertices(&self, cells: &CellSet) -> GridResult<StructuredRenderVertices> {
    cells.validate()?;
    let per_cell: Vec<CellVertices> = (0..cells.len())
      .into_par_iter()
      .map(|i| {
        let key = cells.key(i);
        self.compute_render_vertices(key.level, key.global_id)
      })
      .collect::<GridResult<_>>()?;

    let mut structured = StructuredRenderVertices::with_capacity(per_cell.len());
    for (high, low) in &per_cell {
      structured.push(high, low);
    }
    Ok(structured)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::GridError;
  use crate::grid::SubdivideRule;

  fn context() -> GridContext {
    GridContext::new(
      "EPSG:4326",
      [113.8, 22.1, 114.5, 22.6],
      vec![SubdivideRule::new(2, 2), SubdivideRule::new(2, 2)],
    )
    .unwrap()
  }

  fn render() -> RenderContext {
    RenderContext::new(&context(), &ProjectionRegistry::new()).unwrap()
  }

  #[test]
  fn test_vertices_are_bit_identical_across_calls() {
    let render = render();
    let a = render.compute_render_vertices(2, 5).unwrap();
    let b = render.compute_render_vertices(2, 5).unwrap();
    for i in 0..8 {
      assert_eq!(a.0[i].to_bits(), b.0[i].to_bits());
      assert_eq!(a.1[i].to_bits(), b.1[i].to_bits());
    }
  }

  /// The root cell is symmetric around the patch center in x.
  #[test]
  fn test_root_corners_straddle_center() {
    let (vertices, _) = render().compute_render_vertices(0, 0).unwrap();
    let (tl_x, tr_x) = (vertices[0], vertices[2]);
    assert!(tl_x < 0.0 && tr_x > 0.0);
    assert!((tl_x + tr_x).abs() < 1e-6);
    // North edge has smaller Mercator y than south.
    assert!(vertices[1] < vertices[5]);
  }

  /// High plus low reconstructs the Mercator coordinate relative to center
  /// closer than high alone.
  #[test]
  fn test_low_part_recovers_precision() {
    let render = render();
    let (vertices, vertices_low) = render.compute_render_vertices(2, 15).unwrap();
    let node = render.node(2, 15, 0).unwrap();
    let corners = node.vertices(render.projection(), render.bbox()).unwrap();
    let center = render.center();
    let exact = corners[3].x - (center[0] as f64 + center[1] as f64);
    let recombined = vertices[6] as f64 + vertices_low[6] as f64;
    assert!((recombined - exact).abs() <= (vertices[6] as f64 - exact).abs());
    assert!((recombined - exact).abs() < 1e-12);
  }

  #[test]
  fn test_batch_matches_single() {
    let render = render();
    let keys = vec![CellKey::new(1, 0), CellKey::new(2, 7)];
    let (vertices, vertices_low) = render.compute_batch(keys).unwrap();
    let (single, single_low) = render.compute_render_vertices(2, 7).unwrap();
    assert_eq!(&vertices[8..16], &single);
    assert_eq!(&vertices_low[8..16], &single_low);
  }

  #[test]
  fn test_invalid_level_propagates() {
    assert!(render().compute_render_vertices(9, 0).is_err());
  }

  #[test]
  fn test_global_id_outside_level_is_rejected() {
    assert!(matches!(
      render().compute_render_vertices(2, 16),
      Err(GridError::InvalidGlobalId {
        level: 2,
        global_id: 16,
        cells: 16
      })
    ));
    let mut cells = CellSet::from_keys([CellKey::new(1, 0), CellKey::new(1, 1)]);
    cells.levels.pop();
    assert!(matches!(
      render().render_info(&cells),
      Err(GridError::MismatchedCellSet { .. })
    ));
  }

  #[test]
  fn test_unknown_projection() {
    let mut ctx = context();
    ctx.src_epsg = "EPSG:99999".into();
    assert!(RenderContext::new(&ctx, &ProjectionRegistry::new()).is_err());
  }

  /// A 2 km HK1980 grid patch around the grid's false origin lands on the
  /// projection origin in lon/lat.
  #[cfg(feature = "proj")]
  #[test]
  fn test_hk1980_patch_center() {
    let (east, north) = (836_694.05, 819_069.8);
    let ctx = GridContext::new(
      "EPSG:2326",
      [east - 1000.0, north - 1000.0, east + 1000.0, north + 1000.0],
      vec![SubdivideRule::new(2, 2)],
    )
    .unwrap();
    let render = RenderContext::new(&ctx, &ProjectionRegistry::new()).unwrap();

    let expected = mercator::from_lon_lat(glam::DVec2::new(114.178_556, 22.312_133));
    let center = render.center();
    let x = center[0] as f64 + center[1] as f64;
    let y = center[2] as f64 + center[3] as f64;
    assert!((x - expected.x).abs() < 5e-5, "x {} vs {}", x, expected.x);
    assert!((y - expected.y).abs() < 5e-5, "y {} vs {}", y, expected.y);

    // Root corners sit about a kilometer either side of the center.
    let (vertices, _) = render.compute_render_vertices(0, 0).unwrap();
    assert!(vertices[0] < 0.0 && vertices[2] > 0.0);
    assert!(vertices[2] - vertices[0] < 1e-4);
  }

  #[test]
  fn test_structured_matches_interleaved() {
    let render = render();
    let cells = CellSet::from_keys([CellKey::new(2, 0), CellKey::new(2, 1)]);
    let structured = render.structured_vertices(&cells).unwrap();
    let (vertices, _) = render.compute_render_vertices(2, 1).unwrap();
    assert_eq!(structured.len(), 2);
    assert_eq!(&structured.br[2..4], &vertices[6..8]);
  }
}
