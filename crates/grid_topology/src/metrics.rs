//! Store statistics: operation timings and cell counters.
//!
//! Feature-gated and runtime-toggled so recording costs nothing when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use grid_topology::metrics::{StoreMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics (on by default)
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let metrics = store.metrics();
//! println!("avg subdivide: {:.1}us", metrics.avg_timing_us(StoreOp::Subdivide));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Samples kept per operation.
pub const TIMING_SAMPLES: usize = 128;

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Last [`TIMING_SAMPLES`] durations of one operation, in microseconds,
/// with a running total for the average.
#[derive(Debug, Clone, Default)]
pub struct TimingWindow {
  samples: VecDeque<u64>,
  total: u64,
}

impl TimingWindow {
  pub fn record(&mut self, timing_us: u64) {
    if self.samples.len() == TIMING_SAMPLES {
      if let Some(oldest) = self.samples.pop_front() {
        self.total -= oldest;
      }
    }
    self.samples.push_back(timing_us);
    self.total += timing_us;
  }

  pub fn clear(&mut self) {
    self.samples.clear();
    self.total = 0;
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// Mean of the kept samples; 0 before the first one.
  pub fn average(&self) -> f64 {
    if self.samples.is_empty() {
      return 0.0;
    }
    self.total as f64 / self.samples.len() as f64
  }
}

/// Store operations with their own timing window.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StoreOp {
  Init,
  Subdivide,
  Merge,
  Delete,
  Recover,
  Pick,
  Render,
}

impl StoreOp {
  pub const COUNT: usize = 7;

  pub const ALL: [StoreOp; Self::COUNT] = [
    StoreOp::Init,
    StoreOp::Subdivide,
    StoreOp::Merge,
    StoreOp::Delete,
    StoreOp::Recover,
    StoreOp::Pick,
    StoreOp::Render,
  ];

  pub fn name(self) -> &'static str {
    match self {
      StoreOp::Init => "init",
      StoreOp::Subdivide => "subdivide",
      StoreOp::Merge => "merge",
      StoreOp::Delete => "delete",
      StoreOp::Recover => "recover",
      StoreOp::Pick => "pick",
      StoreOp::Render => "render",
    }
  }
}

/// Counters and timings for one store.
#[derive(Debug, Clone, Default)]
pub struct StoreMetrics {
  /// Recent operation times, indexed by `StoreOp`.
  pub timings: [TimingWindow; StoreOp::COUNT],
  /// Last recorded time per operation in microseconds.
  pub last_us: [u64; StoreOp::COUNT],

  /// Cells appended by init, subdivide, add and recover.
  pub cells_added: u64,
  /// Cells removed by local deletion.
  pub cells_removed: u64,
  /// Slots rewritten by compaction.
  pub slots_relocated: u64,
  /// Cells flagged deleted after service confirmation.
  pub cells_marked_deleted: u64,
}

impl StoreMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reset timings. Counters are cumulative and survive.
  pub fn reset_timings(&mut self) {
    for window in &mut self.timings {
      window.clear();
    }
    self.last_us = [0; StoreOp::COUNT];
  }

  pub fn record_timing(&mut self, op: StoreOp, timing_us: u64) {
    if is_enabled() {
      self.timings[op as usize].record(timing_us);
      self.last_us[op as usize] = timing_us;
    }
  }

  pub fn record_added(&mut self, count: usize) {
    if is_enabled() {
      self.cells_added += count as u64;
    }
  }

  pub fn record_removed(&mut self, removed: usize, relocated: usize) {
    if is_enabled() {
      self.cells_removed += removed as u64;
      self.slots_relocated += relocated as u64;
    }
  }

  pub fn record_marked_deleted(&mut self, count: usize) {
    if is_enabled() {
      self.cells_marked_deleted += count as u64;
    }
  }

  pub fn avg_timing_us(&self, op: StoreOp) -> f64 {
    self.timings[op as usize].average()
  }

  pub fn last_timing_us(&self, op: StoreOp) -> u64 {
    self.last_us[op as usize]
  }
}
