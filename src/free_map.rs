//! In-memory free-space tracking for the data region. The map is not
//! persisted: mount rebuilds it by walking the inode table, so it can
//! never disagree with the inodes for longer than one mount.

use crate::error::{FsError, Result};
use alloc::vec;
use alloc::vec::Vec;
use log::error;

/// One bit per data block, 1 meaning in use. Blocks are addressed by
/// their absolute number on the device; the map subtracts `start`.
pub struct FreeMap {
  start: usize,
  words: Vec<u64>,
  len: usize,
}

impl FreeMap {
  /// A map of `len` blocks beginning at absolute block `start`, all free.
  pub fn new(start: usize, len: usize) -> Self {
    Self {
      start,
      words: vec![0u64; (len + 63) / 64],
      len,
    }
  }

  fn index(&self, block: u32) -> Option<usize> {
    let block = block as usize;
    if block >= self.start && block < self.start + self.len {
      Some(block - self.start)
    } else {
      None
    }
  }

  fn checked_index(&self, block: u32) -> Result<usize> {
    self.index(block).ok_or_else(|| {
      error!("{}", FsError::BlockIndexOutOfRange(block));
      FsError::BlockIndexOutOfRange(block)
    })
  }

  pub fn mark_used(&mut self, block: u32) -> Result<()> {
    let bit = self.checked_index(block)?;
    self.words[bit / 64] |= 1u64 << (bit % 64);
    Ok(())
  }

  pub fn mark_free(&mut self, block: u32) -> Result<()> {
    let bit = self.checked_index(block)?;
    self.words[bit / 64] &= !(1u64 << (bit % 64));
    Ok(())
  }

  /// Out-of-range blocks simply read as unused.
  pub fn is_used(&self, block: u32) -> bool {
    match self.index(block) {
      Some(bit) => self.words[bit / 64] >> (bit % 64) & 1 == 1,
      None => false,
    }
  }

  /// Lowest free block by absolute number, or None when the region is
  /// full. The caller still has to `mark_used` it.
  pub fn find_free(&self) -> Option<u32> {
    self
      .words
      .iter()
      .enumerate()
      .find(|(_, word)| **word != u64::MAX)
      .map(|(i, word)| i * 64 + word.trailing_ones() as usize)
      .filter(|bit| *bit < self.len)
      .map(|bit| (self.start + bit) as u32)
  }

  pub fn free_blocks(&self) -> usize {
    self.len
      - self
        .words
        .iter()
        .map(|word| word.count_ones() as usize)
        .sum::<usize>()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}
