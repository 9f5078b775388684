//! Error types for the grid topology engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type GridResult<T> = Result<T, GridError>;

#[derive(Error, Debug)]
pub enum GridError {
  /// The remote service or a worker could not complete the request.
  #[error("{operation} failed: {message}")]
  Transport {
    operation: &'static str,
    message: String,
  },

  /// A binary cell set whose byte length disagrees with its embedded count.
  #[error("Malformed grid payload: expected {expected} bytes, got {actual}")]
  MalformedPayload { expected: usize, actual: usize },

  /// Dense storage or the key index cannot take more cells.
  #[error("Cell capacity exceeded: requested {requested}, capacity {capacity}")]
  CapacityExceeded { requested: usize, capacity: usize },

  #[error("Invalid storage id {storage_id} (live cells: {len})")]
  InvalidStorageId { storage_id: u32, len: u32 },

  #[error("Invalid level {level} (levels: {levels})")]
  InvalidLevel { level: u8, levels: usize },

  /// A global id outside its level's `width * height` grid.
  #[error("Invalid global id {global_id} at level {level} (cells: {cells})")]
  InvalidGlobalId { level: u8, global_id: u32, cells: u64 },

  #[error("Mismatched cell set: {levels} levels, {global_ids} global ids")]
  MismatchedCellSet { levels: usize, global_ids: usize },

  /// Another mutating call is already running against the same store.
  #[error("Grid store is busy with another mutation")]
  Busy,

  #[error("Unknown projection: {0}")]
  UnknownProjection(String),

  /// A source coordinate could not be transformed to lon/lat.
  #[error("Reprojection failed: {0}")]
  Reprojection(String),

  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("TOML error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl GridError {
  /// Wrap any displayable failure as a transport error for `operation`.
  pub fn transport(operation: &'static str, cause: impl std::fmt::Display) -> Self {
    GridError::Transport {
      operation,
      message: cause.to_string(),
    }
  }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for GridError {
  fn from(e: reqwest::Error) -> Self {
    GridError::transport("http", e)
  }
}
