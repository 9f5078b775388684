//! grid_topology - Multi-resolution grid topology engine
//!
//! This crate keeps the client-side view of a hierarchical rectangular grid
//! laid over a geographic patch. Cells live in dense, compactable storage
//! indexed by `(level, global_id)`; a remote topology service decides which
//! cells are active, and the store mirrors its answers locally together with
//! the double-precision render vertices of every cell.
//!
//! # Features
//!
//! - **Level hierarchy**: per-level dimensions from subdivide rules, with
//!   local / parent / children id math
//! - **Key index**: open-addressing `(level, global_id) -> storage_id` table
//!   with backward-shift deletion
//! - **Wire codec**: the binary cell-set layout shared with the service
//! - **Render vertices**: exact fractional cell extents projected to Mercator
//!   and split into high / low `f32` parts relative to the patch center
//! - **Compaction**: local deletes keep storage ids dense by relocating tail
//!   cells into holes and reporting every move
//! - **Worker**: service calls and vertex batches off the calling thread
//!
//! # Example
//!
//! ```ignore
//! use grid_topology::{GridTopologyStore, MemoryTopologyService, ProjectionRegistry, StoreConfig};
//!
//! let context = meta.to_context()?;
//! let service = MemoryTopologyService::new(meta);
//! let config = StoreConfig::default();
//! let mut store = GridTopologyStore::new(&context, &ProjectionRegistry::new(), service, &config)?;
//!
//! let root = store.init()?;
//! let targets = store.cells_for(&[0])?;
//! let children = store.subdivide_cells(&targets)?;
//! let moved = store.delete_cells_locally(&[0])?;
//!
//! println!("{} cells, {} relocated", store.len(), moved.len());
//! ```

pub mod constants;
pub mod error;
pub mod math;
pub mod projection;
pub mod types;

pub use error::{GridError, GridResult};
#[cfg(feature = "proj")]
pub use projection::Proj4Transform;
pub use projection::{CoordinateTransform, Projection, ProjectionRegistry};
pub use types::{
  CellAttribute, CellInfo, CellKey, CellSet, GridUpdate, GridUpdateBatch, MergeResult, RenderInfo,
  SaveInfo, StructuredRenderVertices,
};

// Level math, cell geometry, key index and codec
pub mod grid;
pub use grid::{GridKeyHashTable, GridNode, LevelHierarchy, LevelInfo, SubdivideRule};

// Patch metadata and store configuration
pub mod config;
pub use config::{GridContext, PatchMeta, StoreConfig};

// Render vertex generation
pub mod render;
pub use render::{CellVertices, RenderContext};

// Service seam (memory + HTTP)
pub mod transport;
pub use transport::{MemoryTopologyService, TopologyService};
#[cfg(feature = "http")]
pub use transport::HttpTopologyService;

// Dense cell storage
pub mod store;
pub use store::{GridTopologyStore, SharedGridStore};

// Background requests
pub mod worker;
pub use worker::{GridRequest, GridResponse, GridWorker};

// Store statistics
pub mod metrics;
pub use metrics::{StoreMetrics, StoreOp};
