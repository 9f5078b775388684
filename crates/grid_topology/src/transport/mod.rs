//! Topology service seam.
//!
//! The store never talks to the network directly; it calls a
//! [`TopologyService`]. Two implementations ship with the crate:
//!
//! - [`MemoryTopologyService`]: in-process reference service, used by tests,
//!   benches and the CLI's `--offline` mode
//! - [`HttpTopologyService`] (feature `http`): blocking client for the remote
//!   service's binary routes
//!
//! Cell sets cross the seam as [`CellSet`]; the HTTP client encodes them with
//! [`crate::grid::codec`].

pub mod memory;
#[cfg(feature = "http")]
pub mod http;

pub use memory::{MemoryTopologyService, ServiceOp};
#[cfg(feature = "http")]
pub use http::HttpTopologyService;

use crate::config::PatchMeta;
use crate::error::GridResult;
use crate::types::{CellSet, SaveInfo};

/// Remote authority over which cells are active.
///
/// Every call either succeeds completely or returns an error; the store
/// performs no local mutation on error.
pub trait TopologyService: Send {
  /// Patch metadata (`GET /meta`).
  fn meta(&self) -> GridResult<PatchMeta>;

  /// Currently active cells (`GET /activate-info`).
  fn activate_info(&self) -> GridResult<CellSet>;

  /// Cells marked deleted (`GET /deleted-info`).
  fn deleted_info(&self) -> GridResult<CellSet>;

  /// Subdivide `targets`; returns the children now active (`POST /subdivide`).
  fn subdivide(&self, targets: &CellSet) -> GridResult<CellSet>;

  /// Merge `targets` into their parents; returns the parents now active
  /// (`POST /merge`).
  fn merge(&self, targets: &CellSet) -> GridResult<CellSet>;

  /// Mark `targets` deleted (`POST /delete`).
  fn delete(&self, targets: &CellSet) -> GridResult<()>;

  /// Reactivate deleted `targets` (`POST /recover`).
  fn recover(&self, targets: &CellSet) -> GridResult<()>;

  /// Cells selected by a feature file (`GET /pick?feature_dir=`).
  fn pick(&self, feature_dir: &str) -> GridResult<CellSet>;

  /// Persist the current topology (`GET /save`).
  fn save(&self) -> GridResult<SaveInfo>;
}

impl<T: TopologyService + Sync + ?Sized> TopologyService for std::sync::Arc<T> {
  fn meta(&self) -> GridResult<PatchMeta> {
    (**self).meta()
  }

  fn activate_info(&self) -> GridResult<CellSet> {
    (**self).activate_info()
  }

  fn deleted_info(&self) -> GridResult<CellSet> {
    (**self).deleted_info()
  }

  fn subdivide(&self, targets: &CellSet) -> GridResult<CellSet> {
    (**self).subdivide(targets)
  }

  fn merge(&self, targets: &CellSet) -> GridResult<CellSet> {
    (**self).merge(targets)
  }

  fn delete(&self, targets: &CellSet) -> GridResult<()> {
    (**self).delete(targets)
  }

  fn recover(&self, targets: &CellSet) -> GridResult<()> {
    (**self).recover(targets)
  }

  fn pick(&self, feature_dir: &str) -> GridResult<CellSet> {
    (**self).pick(feature_dir)
  }

  fn save(&self) -> GridResult<SaveInfo> {
    (**self).save()
  }
}
