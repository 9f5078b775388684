//! Grid worker: service calls and vertex generation off the calling thread.
//!
//! Requests form a closed enum dispatched with a `match`. The worker holds
//! the read-only [`RenderContext`] and the service behind `Arc`s; requests
//! carry copies of the id arrays.
//!
//! # Flow
//!
//! ```text
//! Caller                          Async (rayon)
//! ┌──────────────┐
//! │ start(req)   │─────────────▶ dispatch(req)
//! └──────────────┘                 ├─ service call
//!                                  └─ render vertices
//! ┌──────────────┐                       │
//! │ poll_results │◀──────────────────────┘
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut worker = GridWorker::new(&context, &registry, service, &StoreConfig::default())?;
//! worker.start(GridRequest::SubdivideGrids(targets));
//!
//! // later
//! if let Some(response) = worker.poll_results() {
//!     let GridResponse::Subdivided(children) = response? else { unreachable!() };
//! }
//! ```

use std::sync::Arc;

use crossbeam_channel::{self as channel, Receiver, TryRecvError};
use tracing::debug;

use crate::config::{GridContext, StoreConfig};
use crate::constants::{DELETED_FLAG, UNDELETED_FLAG};
use crate::error::{GridError, GridResult};
use crate::projection::ProjectionRegistry;
use crate::render::RenderContext;
use crate::transport::TopologyService;
use crate::types::{CellSet, RenderInfo, StructuredRenderVertices};

/// Work the worker knows how to do.
#[derive(Clone, Debug)]
pub enum GridRequest {
  /// Active then deleted cells with their vertices.
  GetGridInfo,
  SubdivideGrids(CellSet),
  MergeGrids(CellSet),
  RemoveGrids(CellSet),
  RecoverGrids(CellSet),
  GetMultiGridRenderVertices(CellSet),
  /// Cells selected by a feature file path.
  GetGridInfoByFeature(String),
}

impl GridRequest {
  pub fn name(&self) -> &'static str {
    match self {
      GridRequest::GetGridInfo => "get_grid_info",
      GridRequest::SubdivideGrids(_) => "subdivide_grids",
      GridRequest::MergeGrids(_) => "merge_grids",
      GridRequest::RemoveGrids(_) => "remove_grids",
      GridRequest::RecoverGrids(_) => "recover_grids",
      GridRequest::GetMultiGridRenderVertices(_) => "get_multi_grid_render_vertices",
      GridRequest::GetGridInfoByFeature(_) => "get_grid_info_by_feature",
    }
  }
}

/// One response per request variant.
#[derive(Clone, Debug, PartialEq)]
pub enum GridResponse {
  GridInfo(RenderInfo),
  Subdivided(RenderInfo),
  Merged(RenderInfo),
  Removed,
  Recovered,
  RenderVertices(StructuredRenderVertices),
  FeatureCells(CellSet),
}

/// Non-blocking worker running one request at a time.
pub struct GridWorker {
  render: Arc<RenderContext>,
  service: Arc<dyn TopologyService + Sync>,
  pool: Option<Arc<rayon::ThreadPool>>,
  receiver: Option<Receiver<GridResult<GridResponse>>>,
}

impl GridWorker {
  /// Bind the worker to a patch.
  pub fn new(
    context: &GridContext,
    registry: &ProjectionRegistry,
    service: Arc<dyn TopologyService + Sync>,
    config: &StoreConfig,
  ) -> GridResult<Self> {
    let render = Arc::new(RenderContext::new(context, registry)?);
    Self::with_render_context(render, service, config)
  }

  pub fn with_render_context(
    render: Arc<RenderContext>,
    service: Arc<dyn TopologyService + Sync>,
    config: &StoreConfig,
  ) -> GridResult<Self> {
    let pool = if config.worker_threads > 0 {
      let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .thread_name(|i| format!("grid-worker-{}", i))
        .build()
        .map_err(|e| GridError::Config(format!("worker pool: {}", e)))?;
      Some(Arc::new(pool))
    } else {
      None
    };
    Ok(Self {
      render,
      service,
      pool,
      receiver: None,
    })
  }

  pub fn render_context(&self) -> &Arc<RenderContext> {
    &self.render
  }

  pub fn is_busy(&self) -> bool {
    self.receiver.is_some()
  }

  /// Start `request` in the background.
  ///
  /// Returns `false` without starting if a request is already running.
  pub fn start(&mut self, request: GridRequest) -> bool {
    if self.is_busy() {
      return false;
    }

    let (sender, receiver) = channel::bounded(1);
    self.receiver = Some(receiver);

    let render = Arc::clone(&self.render);
    let service = Arc::clone(&self.service);
    let job = move || {
      let result = dispatch(&render, service.as_ref(), request);
      // Receiver dropped = cancelled
      let _ = sender.send(result);
    };
    match &self.pool {
      Some(pool) => pool.spawn(job),
      None => rayon::spawn(job),
    }
    true
  }

  /// Result of the running request, if it has finished.
  pub fn poll_results(&mut self) -> Option<GridResult<GridResponse>> {
    let receiver = self.receiver.as_ref()?;
    match receiver.try_recv() {
      Ok(result) => {
        self.receiver = None;
        Some(result)
      }
      Err(TryRecvError::Empty) => None,
      Err(TryRecvError::Disconnected) => {
        self.receiver = None;
        Some(Err(GridError::transport("worker", "worker dropped the request")))
      }
    }
  }

  /// Block until the running request finishes.
  pub fn wait(&mut self) -> Option<GridResult<GridResponse>> {
    let receiver = self.receiver.take()?;
    Some(
      receiver
        .recv()
        .unwrap_or_else(|e| Err(GridError::transport("worker", e))),
    )
  }

  /// Start `request` and wait for it.
  pub fn run(&mut self, request: GridRequest) -> GridResult<GridResponse> {
    if !self.start(request) {
      return Err(GridError::Busy);
    }
    self
      .wait()
      .unwrap_or_else(|| Err(GridError::transport("worker", "no request running")))
  }

  /// Forget the running request; its result is discarded.
  pub fn cancel(&mut self) {
    self.receiver = None;
  }
}

/// Execute one request (called on a worker thread).
#[tracing::instrument(skip_all, name = "worker::dispatch", fields(request = request.name()))]
fn dispatch(
  render: &RenderContext,
  service: &(dyn TopologyService + Sync),
  request: GridRequest,
) -> GridResult<GridResponse> {
  let response = match request {
    GridRequest::GetGridInfo => {
      let active = service.activate_info()?;
      let mut deleted = service.deleted_info()?;
      deleted.fill_deleted(DELETED_FLAG);
      GridResponse::GridInfo(render.render_info(&active.concat(deleted))?)
    }
    GridRequest::SubdivideGrids(targets) => {
      let mut children = service.subdivide(&targets)?;
      children.fill_deleted(UNDELETED_FLAG);
      GridResponse::Subdivided(render.render_info(&children)?)
    }
    GridRequest::MergeGrids(targets) => {
      let mut parents = service.merge(&targets)?;
      parents.fill_deleted(UNDELETED_FLAG);
      GridResponse::Merged(render.render_info(&parents)?)
    }
    GridRequest::RemoveGrids(targets) => {
      service.delete(&targets)?;
      GridResponse::Removed
    }
    GridRequest::RecoverGrids(targets) => {
      service.recover(&targets)?;
      GridResponse::Recovered
    }
    GridRequest::GetMultiGridRenderVertices(cells) => {
      GridResponse::RenderVertices(render.structured_vertices(&cells)?)
    }
    GridRequest::GetGridInfoByFeature(feature_dir) => GridResponse::FeatureCells(service.pick(&feature_dir)?),
  };
  debug!("worker request complete");
  Ok(response)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::PatchMeta;
  use crate::transport::{MemoryTopologyService, ServiceOp};
  use crate::types::CellKey;

  fn meta() -> PatchMeta {
    PatchMeta {
      name: "worker".into(),
      epsg: 3857,
      subdivide_rules: vec![[3, 2], [2, 2]],
      bounds: [12_600_000.0, 2_550_000.0, 12_750_000.0, 2_650_000.0],
    }
  }

  fn worker_with(service: Arc<MemoryTopologyService>, threads: usize) -> GridWorker {
    let context = meta().to_context().unwrap();
    let config = StoreConfig {
      worker_threads: threads,
      ..StoreConfig::with_max_cell_count(1024)
    };
    GridWorker::new(&context, &ProjectionRegistry::new(), service, &config).unwrap()
  }

  #[test]
  fn test_subdivide_on_worker() {
    let service = Arc::new(MemoryTopologyService::new(meta()));
    let mut worker = worker_with(Arc::clone(&service), 2);

    let response = worker
      .run(GridRequest::SubdivideGrids(CellSet::from_keys([CellKey::new(0, 0)])))
      .unwrap();
    let GridResponse::Subdivided(children) = response else {
      panic!("unexpected response {response:?}");
    };
    assert_eq!(children.len(), 6);
    assert_eq!(children.vertices.len(), 6 * 8);
    assert_eq!(children.deleted, vec![0; 6]);
    assert!(!worker.is_busy());
  }

  #[test]
  fn test_grid_info_flags_deleted_last() {
    let service = Arc::new(MemoryTopologyService::with_full_level(meta(), 1).unwrap());
    service
      .delete(&CellSet::from_keys([CellKey::new(1, 0)]))
      .unwrap();
    let mut worker = worker_with(service, 0);

    let GridResponse::GridInfo(info) = worker.run(GridRequest::GetGridInfo).unwrap() else {
      panic!("expected grid info");
    };
    assert_eq!(info.len(), 6);
    assert_eq!(info.deleted, vec![0, 0, 0, 0, 0, 1]);
    assert_eq!(info.global_ids[5], 0);
  }

  #[test]
  fn test_render_vertices_match_context() {
    let service = Arc::new(MemoryTopologyService::new(meta()));
    let mut worker = worker_with(service, 0);
    let cells = CellSet::from_keys([CellKey::new(1, 4)]);
    let GridResponse::RenderVertices(structured) = worker
      .run(GridRequest::GetMultiGridRenderVertices(cells))
      .unwrap()
    else {
      panic!("expected render vertices");
    };
    let (vertices, _) = worker.render_context().compute_render_vertices(1, 4).unwrap();
    assert_eq!(&structured.tl[..], &vertices[0..2]);
  }

  #[test]
  fn test_failure_is_returned() {
    let service = Arc::new(MemoryTopologyService::new(meta()));
    service.fail_on(Some(ServiceOp::Recover));
    let mut worker = worker_with(service, 0);
    let result = worker.run(GridRequest::RecoverGrids(CellSet::default()));
    assert!(matches!(result, Err(GridError::Transport { .. })));
  }

  #[test]
  fn test_start_while_busy_is_rejected() {
    let service = Arc::new(MemoryTopologyService::new(meta()));
    let mut worker = worker_with(service, 1);
    assert!(worker.start(GridRequest::GetGridInfo));
    assert!(!worker.start(GridRequest::GetGridInfo));
    assert!(worker.wait().unwrap().is_ok());

    worker.start(GridRequest::GetGridInfoByFeature("none".into()));
    worker.cancel();
    assert!(!worker.is_busy());
    assert!(worker.poll_results().is_none());
  }
}
