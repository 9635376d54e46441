use flat_fs::{FreeMap, FsError};

#[test]
fn hands_out_lowest_block_first() {
  let mut map = FreeMap::new(10, 130);
  assert_eq!(map.len(), 130);
  assert_eq!(map.free_blocks(), 130);
  assert_eq!(map.find_free(), Some(10));
  map.mark_used(10).unwrap();
  assert_eq!(map.find_free(), Some(11));
  map.mark_used(11).unwrap();
  map.mark_free(10).unwrap();
  assert_eq!(map.find_free(), Some(10));
}

#[test]
fn spans_word_boundaries() {
  let mut map = FreeMap::new(0, 130);
  for block in 0..130u32 {
    assert_eq!(map.find_free(), Some(block));
    map.mark_used(block).unwrap();
  }
  assert_eq!(map.find_free(), None);
  assert_eq!(map.free_blocks(), 0);

  map.mark_free(64).unwrap();
  map.mark_free(129).unwrap();
  assert_eq!(map.find_free(), Some(64));
  map.mark_used(64).unwrap();
  assert_eq!(map.find_free(), Some(129));
}

#[test]
fn rejects_blocks_outside_the_region() {
  let mut map = FreeMap::new(8, 16);
  assert_eq!(map.mark_used(7), Err(FsError::BlockIndexOutOfRange(7)));
  assert_eq!(map.mark_used(24), Err(FsError::BlockIndexOutOfRange(24)));
  assert_eq!(map.mark_free(0), Err(FsError::BlockIndexOutOfRange(0)));
  assert!(!map.is_used(7));
  assert!(!map.is_used(24));
  assert_eq!(map.free_blocks(), 16);
}

#[test]
fn tracks_usage_counts() {
  let mut map = FreeMap::new(4, 60);
  for block in [4u32, 5, 20, 63] {
    map.mark_used(block).unwrap();
  }
  assert_eq!(map.free_blocks(), 56);
  assert!(map.is_used(20));
  assert!(!map.is_used(21));

  map.mark_free(20).unwrap();
  assert_eq!(map.free_blocks(), 57);
  assert!(!map.is_used(20));

  // marking an already used block again keeps the count stable
  map.mark_used(5).unwrap();
  assert_eq!(map.free_blocks(), 57);
}
