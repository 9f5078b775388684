//! Binary cell-set codec shared with the topology service.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [u32 count][count x u8 level][0..3 zero bytes][count x u32 global id]
//! ```
//!
//! The padding aligns the global-id block to 4 bytes. Deleted flags are
//! in-memory only and never encoded.

use crate::constants::{level_padding, CODEC_HEADER_BYTES};
use crate::error::{GridError, GridResult};
use crate::types::CellSet;

/// Exact byte length of an encoded set of `count` cells.
#[inline]
pub const fn encoded_len(count: usize) -> usize {
  CODEC_HEADER_BYTES + count + level_padding(count) + count * 4
}

/// Encode parallel level / global-id columns of equal length.
pub fn encode_parts(levels: &[u8], global_ids: &[u32]) -> GridResult<Vec<u8>> {
  if levels.len() != global_ids.len() {
    return Err(GridError::MismatchedCellSet {
      levels: levels.len(),
      global_ids: global_ids.len(),
    });
  }
  let count = levels.len();
  let mut buffer = Vec::with_capacity(encoded_len(count));
  buffer.extend_from_slice(&(count as u32).to_le_bytes());
  buffer.extend_from_slice(levels);
  buffer.resize(buffer.len() + level_padding(count), 0);
  for global_id in global_ids {
    buffer.extend_from_slice(&global_id.to_le_bytes());
  }
  Ok(buffer)
}

pub fn encode(cells: &CellSet) -> GridResult<Vec<u8>> {
  encode_parts(&cells.levels, &cells.global_ids)
}

/// Decode a cell set.
///
/// Buffers shorter than the count prefix decode to an empty set; any other
/// length that disagrees with the embedded count is `MalformedPayload`.
pub fn decode(bytes: &[u8]) -> GridResult<CellSet> {
  if bytes.len() < CODEC_HEADER_BYTES {
    return Ok(CellSet::default());
  }

  let mut prefix = [0u8; CODEC_HEADER_BYTES];
  prefix.copy_from_slice(&bytes[..CODEC_HEADER_BYTES]);
  let count = u32::from_le_bytes(prefix) as usize;

  let expected = encoded_len(count);
  if bytes.len() != expected {
    return Err(GridError::MalformedPayload {
      expected,
      actual: bytes.len(),
    });
  }

  let levels_end = CODEC_HEADER_BYTES + count;
  let levels = bytes[CODEC_HEADER_BYTES..levels_end].to_vec();
  let ids_start = levels_end + level_padding(count);
  let global_ids = bytes[ids_start..]
    .chunks_exact(4)
    .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    .collect();

  Ok(CellSet {
    levels,
    global_ids,
    deleted: None,
  })
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
