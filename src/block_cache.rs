use crate::{BlockDevice, DataBlock, BLOCK_SZ};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

/// A cached block with write-back semantics: modifications stay in
/// memory until `sync` or eviction flushes them to the device.
pub struct BlockCache {
  cache: DataBlock,
  block_id: usize,
  block_device: Arc<dyn BlockDevice>,
  modified: bool,
}

impl BlockCache {
  /// Load a new BlockCache from disk.
  pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
    let mut cache = [0u8; BLOCK_SZ];
    block_device.read_block(block_id, &mut cache);
    Self {
      cache,
      block_id,
      block_device,
      modified: false,
    }
  }

  pub fn read<V>(&self, f: impl FnOnce(&DataBlock) -> V) -> V {
    f(&self.cache)
  }

  pub fn modify<V>(&mut self, f: impl FnOnce(&mut DataBlock) -> V) -> V {
    self.modified = true;
    f(&mut self.cache)
  }

  pub fn sync(&mut self) {
    if self.modified {
      self.modified = false;
      self.block_device.write_block(self.block_id, &self.cache);
    }
  }
}

impl Drop for BlockCache {
  fn drop(&mut self) {
    self.sync()
  }
}

const BLOCK_CACHE_SIZE: usize = 16;

pub struct BlockCacheManager {
  queue: VecDeque<(usize, Arc<Mutex<BlockCache>>)>,
}

impl BlockCacheManager {
  pub fn new() -> Self {
    Self {
      queue: VecDeque::new(),
    }
  }

  pub fn get_block_cache(
    &mut self,
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
  ) -> Arc<Mutex<BlockCache>> {
    if let Some(pair) = self.queue.iter().find(|pair| pair.0 == block_id) {
      Arc::clone(&pair.1)
    } else {
      if self.queue.len() == BLOCK_CACHE_SIZE {
        // evict the oldest entry nobody holds a handle to
        if let Some((idx, _)) = self
          .queue
          .iter()
          .enumerate()
          .find(|(_, pair)| Arc::strong_count(&pair.1) == 1)
        {
          self.queue.drain(idx..=idx);
        } else {
          panic!("Run out of Block Cache entries!");
        }
      }
      let block_cache = Arc::new(Mutex::new(BlockCache::new(
        block_id,
        Arc::clone(&block_device),
      )));
      self.queue.push_back((block_id, Arc::clone(&block_cache)));
      block_cache
    }
  }

  /// Flush every dirty cached block to the device.
  pub fn sync_all(&self) {
    for (_, cache) in self.queue.iter() {
      cache.lock().sync();
    }
  }

  /// Flush and forget all cached blocks. Used on unmount so a later
  /// mount re-reads the device instead of trusting stale entries.
  pub fn clear(&mut self) {
    self.sync_all();
    self.queue.clear();
  }
}
