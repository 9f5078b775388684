use super::*;
use crate::types::CellKey;

fn sample(count: usize) -> CellSet {
  CellSet::from_keys(
    (0..count).map(|i| CellKey::new((i % 7) as u8, (i as u32).wrapping_mul(2_654_435_761))),
  )
}

/// Round trip for the sizes that exercise every padding remainder.
#[test]
fn test_round_trip_counts() {
  for count in [0usize, 1, 2, 3, 4, 5, 17, 4096] {
    let cells = sample(count);
    let bytes = encode(&cells).unwrap();
    assert_eq!(bytes.len(), encoded_len(count), "length for N={count}");
    assert_eq!(decode(&bytes).unwrap(), cells, "round trip for N={count}");
  }
}

/// Byte-level layout for three cells: count, levels, one pad byte, ids.
#[test]
fn test_layout_is_bit_exact() {
  let cells = CellSet::new(vec![1, 2, 3], vec![1, 0x0102_0304, u32::MAX]).unwrap();
  let bytes = encode(&cells).unwrap();
  assert_eq!(
    bytes,
    vec![
      3, 0, 0, 0, // count
      1, 2, 3, // levels
      0, // padding
      1, 0, 0, 0, //
      4, 3, 2, 1, //
      255, 255, 255, 255,
    ]
  );
}

#[test]
fn test_aligned_count_has_no_padding() {
  let bytes = encode(&sample(4)).unwrap();
  assert_eq!(bytes.len(), 4 + 4 + 16);
}

#[test]
fn test_short_buffer_decodes_empty() {
  for len in 0..4 {
    let decoded = decode(&vec![0xAB; len]).unwrap();
    assert!(decoded.is_empty());
  }
}

#[test]
fn test_truncated_payload_is_malformed() {
  let mut bytes = encode(&sample(5)).unwrap();
  bytes.pop();
  assert!(matches!(
    decode(&bytes),
    Err(GridError::MalformedPayload {
      expected: 32,
      actual: 31
    })
  ));
}

/// A count prefix far larger than the buffer is rejected, not trusted.
#[test]
fn test_oversized_count_is_malformed() {
  let mut bytes = encode(&sample(1)).unwrap();
  bytes[..4].copy_from_slice(&1_000_000u32.to_le_bytes());
  assert!(matches!(
    decode(&bytes),
    Err(GridError::MalformedPayload { actual: 12, .. })
  ));
}

#[test]
fn test_trailing_bytes_are_malformed() {
  let mut bytes = encode(&sample(2)).unwrap();
  bytes.extend_from_slice(&[0, 0, 0, 0]);
  assert!(decode(&bytes).is_err());
}

#[test]
fn test_deleted_flags_not_encoded() {
  let mut cells = sample(3);
  cells.fill_deleted(1);
  let decoded = decode(&encode(&cells).unwrap()).unwrap();
  assert_eq!(decoded.deleted, None);
  assert_eq!(decoded.global_ids, cells.global_ids);
}

#[test]
fn test_mismatched_columns_are_rejected() {
  assert!(matches!(
    encode_parts(&[1, 2, 3], &[7, 8]),
    Err(GridError::MismatchedCellSet {
      levels: 3,
      global_ids: 2
    })
  ));

  let mut cells = sample(2);
  cells.global_ids.pop();
  assert!(encode(&cells).is_err());
}
