//! On-disk layout: superblock, inode records and the geometry math
//! that ties them together. Every field crosses the device boundary
//! through explicit little-endian codecs, never through memory casts.

use crate::{DataBlock, BLOCK_SZ};
use core::fmt::{Debug, Formatter, Result as FmtResult};

const FS_MAGIC: u32 = 0xf0f0_3410;
pub const INODE_DIRECT_COUNT: usize = 5;
/// A pointer block is one block of u32 block numbers.
pub const PTRS_PER_INDIRECT: usize = BLOCK_SZ / 4;
pub const INODE_SIZE: usize = 32;
pub const INODES_PER_BLOCK: usize = BLOCK_SZ / INODE_SIZE;
pub const MAX_FILE_BLOCKS: usize = INODE_DIRECT_COUNT + PTRS_PER_INDIRECT;
/// Hard ceiling on a single file, set by the pointer geometry.
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SZ;

/// Read the u32 at slot `idx` (4-byte slots, little endian).
pub fn get_u32(data: &DataBlock, idx: usize) -> u32 {
  let base = idx * 4;
  u32::from_le_bytes([data[base], data[base + 1], data[base + 2], data[base + 3]])
}

/// Write the u32 at slot `idx` (4-byte slots, little endian).
pub fn put_u32(data: &mut DataBlock, idx: usize, value: u32) {
  let base = idx * 4;
  data[base..base + 4].copy_from_slice(&value.to_le_bytes());
}

/// Block 0 of every volume. Identifies the device as formatted and
/// records the geometry the volume was formatted with.
pub struct SuperBlock {
  magic: u32,
  pub total_blocks: u32,
  pub inode_blocks: u32,
  pub total_inodes: u32,
}

impl Debug for SuperBlock {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("SuperBlock")
      .field("total_blocks", &self.total_blocks)
      .field("inode_blocks", &self.inode_blocks)
      .field("total_inodes", &self.total_inodes)
      .finish()
  }
}

impl SuperBlock {
  pub fn new(geo: &Geometry) -> Self {
    Self {
      magic: FS_MAGIC,
      total_blocks: geo.total_blocks as u32,
      inode_blocks: geo.inode_blocks as u32,
      total_inodes: geo.total_inodes as u32,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.magic == FS_MAGIC
  }

  pub fn decode(data: &DataBlock) -> Self {
    Self {
      magic: get_u32(data, 0),
      total_blocks: get_u32(data, 1),
      inode_blocks: get_u32(data, 2),
      total_inodes: get_u32(data, 3),
    }
  }

  pub fn encode(&self, data: &mut DataBlock) {
    put_u32(data, 0, self.magic);
    put_u32(data, 1, self.total_blocks);
    put_u32(data, 2, self.inode_blocks);
    put_u32(data, 3, self.total_inodes);
  }
}

/// One 32-byte slot of the inode table. `valid` is 1 when the slot
/// holds a live file, `size` counts bytes, and the pointers name data
/// blocks by absolute block number (0 means unused).
#[derive(Clone, Copy)]
pub struct DiskInode {
  pub valid: u32,
  pub size: u32,
  pub direct: [u32; INODE_DIRECT_COUNT],
  pub indirect: u32,
}

impl DiskInode {
  pub const fn empty() -> Self {
    Self {
      valid: 0,
      size: 0,
      direct: [0; INODE_DIRECT_COUNT],
      indirect: 0,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.valid != 0
  }

  /// Data blocks the current size spans, not counting the pointer block.
  pub fn data_blocks(&self) -> usize {
    Self::blocks_for_size(self.size as usize)
  }

  pub fn blocks_for_size(size: usize) -> usize {
    (size + BLOCK_SZ - 1) / BLOCK_SZ
  }

  /// Data blocks plus the indirect pointer block once the file needs one.
  pub fn total_blocks(size: usize) -> usize {
    let data = Self::blocks_for_size(size);
    if data > INODE_DIRECT_COUNT {
      data + 1
    } else {
      data
    }
  }

  /// Decode the inode stored at `slot` of an inode-table block.
  pub fn decode_slot(data: &DataBlock, slot: usize) -> Self {
    let base = slot * (INODE_SIZE / 4);
    let mut direct = [0u32; INODE_DIRECT_COUNT];
    for (i, ptr) in direct.iter_mut().enumerate() {
      *ptr = get_u32(data, base + 2 + i);
    }
    Self {
      valid: get_u32(data, base),
      size: get_u32(data, base + 1),
      direct,
      indirect: get_u32(data, base + 7),
    }
  }

  /// Encode this inode into `slot` of an inode-table block.
  pub fn encode_slot(&self, data: &mut DataBlock, slot: usize) {
    let base = slot * (INODE_SIZE / 4);
    put_u32(data, base, self.valid);
    put_u32(data, base + 1, self.size);
    for (i, ptr) in self.direct.iter().enumerate() {
      put_u32(data, base + 2 + i, *ptr);
    }
    put_u32(data, base + 7, self.indirect);
  }
}

/// Where everything lives on a given device. Computed once at format
/// time, recovered from the superblock at mount time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Geometry {
  pub total_blocks: usize,
  pub inode_blocks: usize,
  pub total_inodes: usize,
  /// First block of the data region.
  pub data_start: usize,
  pub data_blocks: usize,
}

impl Geometry {
  /// Geometry for a fresh volume: ten percent of the device (rounded
  /// up) becomes the inode table.
  pub fn for_device(total_blocks: usize) -> Self {
    let inode_blocks = 1 + total_blocks / 10;
    Self::with_inode_blocks(total_blocks, inode_blocks)
  }

  pub fn from_super(sb: &SuperBlock) -> Self {
    Self::with_inode_blocks(sb.total_blocks as usize, sb.inode_blocks as usize)
  }

  fn with_inode_blocks(total_blocks: usize, inode_blocks: usize) -> Self {
    let data_start = 1 + inode_blocks;
    Self {
      total_blocks,
      inode_blocks,
      total_inodes: inode_blocks * INODES_PER_BLOCK,
      data_start,
      data_blocks: total_blocks.saturating_sub(data_start),
    }
  }

  /// Bytes the data region can hold in total.
  pub fn data_bytes(&self) -> usize {
    self.data_blocks * BLOCK_SZ
  }

  /// Whether `block` is a legal data-block number on this volume.
  pub fn in_data_region(&self, block: u32) -> bool {
    (block as usize) >= self.data_start && (block as usize) < self.total_blocks
  }
}

/// Locate inode `inumber` in the table: (block id, slot within block).
pub fn inode_pos(inumber: u32) -> (usize, usize) {
  let i = inumber as usize;
  (1 + i / INODES_PER_BLOCK, i % INODES_PER_BLOCK)
}
