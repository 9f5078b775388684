//! Grid structure: level hierarchy, cell geometry, key index and wire codec.
//!
//! - [`level`]: per-level dimensions and local / parent / children id math
//! - [`node`]: `GridNode` - fractional extents, edges and vertex projection
//! - [`key_table`]: `GridKeyHashTable` - `(level, global_id) -> storage_id`
//! - [`codec`]: binary cell-set encoding shared with the service

pub mod codec;
pub mod key_table;
pub mod level;
pub mod node;

pub use key_table::GridKeyHashTable;
pub use level::{derive_level_infos, LevelHierarchy, LevelInfo, SubdivideRule};
pub use node::{EdgeCode, GridNode, NodeExtents};
