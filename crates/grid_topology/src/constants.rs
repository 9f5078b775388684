//! Engine-wide constants.
//!
//! Values the wire format, the key index and the dense storage all have to
//! agree on live here.

/// Marker stored in the key index for an unoccupied slot.
pub const EMPTY_SLOT: u32 = u32::MAX;

/// Smallest key index the store will allocate (slots, not cells).
pub const MIN_TABLE_SIZE: usize = 8192;

/// FNV-1a 32-bit offset basis.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// Default dense storage capacity (a fully subdivided 4096 x 4096 patch).
pub const DEFAULT_MAX_CELL_COUNT: usize = 4096 * 4096;

/// Per-slot deleted flag values.
pub const DELETED_FLAG: u8 = 1;
pub const UNDELETED_FLAG: u8 = 0;

/// Default attribute values for a freshly activated cell.
pub const DEFAULT_CELL_HEIGHT: f64 = -9999.0;
pub const DEFAULT_CELL_KIND: u8 = 0;

/// Size in bytes of the cell-count prefix of a binary cell set.
pub const CODEC_HEADER_BYTES: usize = 4;

/// Floats per cell in a render vertex buffer: 4 corners x (x, y).
pub const VERTEX_FLOATS_PER_CELL: usize = 8;

/// Zero padding needed after `count` level bytes so the global ids start
/// 4-byte aligned.
#[inline]
pub const fn level_padding(count: usize) -> usize {
  (4 - count % 4) % 4
}

/// Table size for `expected_cells`: next power of two of
/// `max(MIN_TABLE_SIZE, 2 * expected_cells)`.
#[inline]
pub fn table_size_for(expected_cells: usize) -> usize {
  MIN_TABLE_SIZE
    .max(expected_cells.saturating_mul(2))
    .next_power_of_two()
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
