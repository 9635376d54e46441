use crate::block_cache::{BlockCache, BlockCacheManager};
use crate::error::{FsError, Result};
use crate::free_map::FreeMap;
use crate::layout::{
  get_u32, inode_pos, put_u32, DiskInode, Geometry, SuperBlock, INODES_PER_BLOCK,
  INODE_DIRECT_COUNT, MAX_FILE_BLOCKS, MAX_FILE_SIZE, PTRS_PER_INDIRECT,
};
use crate::{BlockDevice, BLOCK_SZ};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, warn};
use spin::Mutex;

/// State that only exists while the volume is mounted.
struct MountState {
  geo: Geometry,
  free_map: FreeMap,
}

/// A single volume on one block device. All operations go through
/// this handle; two volumes on two devices never share state.
pub struct FileSystem {
  block_dev: Arc<dyn BlockDevice>,
  cache: Mutex<BlockCacheManager>,
  state: Option<MountState>,
}

impl FileSystem {
  /// Wrap a device. The volume starts out unmounted; call `format`
  /// or `mount` before anything else.
  pub fn new(block_dev: Arc<dyn BlockDevice>) -> Self {
    Self {
      block_dev,
      cache: Mutex::new(BlockCacheManager::new()),
      state: None,
    }
  }

  fn get_block_cache(&self, block_id: usize) -> Arc<Mutex<BlockCache>> {
    self
      .cache
      .lock()
      .get_block_cache(block_id, Arc::clone(&self.block_dev))
  }

  fn sync_all(&self) {
    self.cache.lock().sync_all();
  }

  fn mounted(&self) -> Result<&MountState> {
    self.state.as_ref().ok_or(FsError::NotMounted)
  }

  fn read_inode(&self, inumber: u32) -> DiskInode {
    let (block_id, slot) = inode_pos(inumber);
    self
      .get_block_cache(block_id)
      .lock()
      .read(|data| DiskInode::decode_slot(data, slot))
  }

  /// Write a fresh volume onto the device: superblock plus an empty
  /// inode table covering a tenth of the device. Anything stored by a
  /// previous volume becomes unreachable. Fails while mounted.
  pub fn format(&mut self) -> Result<()> {
    if self.state.is_some() {
      return Err(FsError::AlreadyMounted);
    }
    let geo = Geometry::for_device(self.block_dev.num_blocks());
    if geo.data_start > geo.total_blocks {
      return Err(FsError::DeviceTooSmall(geo.total_blocks));
    }
    self.get_block_cache(0).lock().modify(|data| {
      for byte in data.iter_mut() {
        *byte = 0;
      }
      SuperBlock::new(&geo).encode(data);
    });
    for block_id in 1..=geo.inode_blocks {
      self.get_block_cache(block_id).lock().modify(|data| {
        for byte in data.iter_mut() {
          *byte = 0;
        }
      });
    }
    self.sync_all();
    debug!("formatted volume: {:?}", geo);
    Ok(())
  }

  /// Read the superblock and rebuild the free map by walking the
  /// inode table. Blocks referenced by no valid inode count as free.
  pub fn mount(&mut self) -> Result<()> {
    if self.state.is_some() {
      return Err(FsError::AlreadyMounted);
    }
    let sb = self.get_block_cache(0).lock().read(SuperBlock::decode);
    if !sb.is_valid() {
      return Err(FsError::InvalidMagic);
    }
    let geo = Geometry::from_super(&sb);
    let mut free_map = FreeMap::new(geo.data_start, geo.data_blocks);
    for block_id in 1..=geo.inode_blocks {
      let inodes: Vec<DiskInode> = self.get_block_cache(block_id).lock().read(|data| {
        (0..INODES_PER_BLOCK)
          .map(|slot| DiskInode::decode_slot(data, slot))
          .collect()
      });
      for inode in inodes.iter().filter(|inode| inode.is_valid()) {
        let blocks = inode.data_blocks();
        for ptr in inode.direct.iter().take(blocks.min(INODE_DIRECT_COUNT)) {
          claim(&mut free_map, *ptr);
        }
        if blocks > INODE_DIRECT_COUNT && claim(&mut free_map, inode.indirect) {
          let entries: Vec<u32> = self
            .get_block_cache(inode.indirect as usize)
            .lock()
            .read(|data| {
              (0..(blocks - INODE_DIRECT_COUNT).min(PTRS_PER_INDIRECT))
                .map(|idx| get_u32(data, idx))
                .collect()
            });
          for entry in entries {
            claim(&mut free_map, entry);
          }
        }
      }
    }
    debug!(
      "mounted volume: {:?}, {} of {} data blocks free",
      geo,
      free_map.free_blocks(),
      geo.data_blocks
    );
    self.state = Some(MountState { geo, free_map });
    Ok(())
  }

  /// Flush every dirty block and drop the in-memory state. The next
  /// mount rebuilds the free map from the device alone.
  pub fn unmount(&mut self) -> Result<()> {
    if self.state.is_none() {
      return Err(FsError::AlreadyUnmounted);
    }
    self.cache.lock().clear();
    self.state = None;
    debug!("unmounted volume");
    Ok(())
  }

  /// Allocate the lowest free inode slot and hand back its number.
  pub fn create(&mut self) -> Result<u32> {
    let geo = self.mounted()?.geo;
    for block_id in 1..=geo.inode_blocks {
      let cache = self.get_block_cache(block_id);
      let mut guard = cache.lock();
      let slot = guard
        .read(|data| (0..INODES_PER_BLOCK).find(|slot| !DiskInode::decode_slot(data, *slot).is_valid()));
      if let Some(slot) = slot {
        guard.modify(|data| {
          let mut inode = DiskInode::empty();
          inode.valid = 1;
          inode.encode_slot(data, slot);
        });
        drop(guard);
        self.sync_all();
        let inumber = ((block_id - 1) * INODES_PER_BLOCK + slot) as u32;
        debug!("created inode {}", inumber);
        return Ok(inumber);
      }
    }
    Err(FsError::TableFull)
  }

  /// Release the inode and every data block it references. Deleting
  /// an inode that is not allocated succeeds and does nothing.
  pub fn delete(&mut self, inumber: u32) -> Result<()> {
    let Self {
      block_dev,
      cache,
      state,
    } = self;
    let state = state.as_mut().ok_or(FsError::NotMounted)?;
    check_inumber(&state.geo, inumber)?;
    let get = |block_id: usize| cache.lock().get_block_cache(block_id, Arc::clone(block_dev));

    let (block_id, slot) = inode_pos(inumber);
    let inode = get(block_id)
      .lock()
      .read(|data| DiskInode::decode_slot(data, slot));
    if !inode.is_valid() {
      return Ok(());
    }
    let blocks = inode.data_blocks();
    for ptr in inode.direct.iter().take(blocks.min(INODE_DIRECT_COUNT)) {
      let _ = state.free_map.mark_free(*ptr);
    }
    if blocks > INODE_DIRECT_COUNT && state.free_map.mark_free(inode.indirect).is_ok() {
      let entries: Vec<u32> = get(inode.indirect as usize).lock().read(|data| {
        (0..(blocks - INODE_DIRECT_COUNT).min(PTRS_PER_INDIRECT))
          .map(|idx| get_u32(data, idx))
          .collect()
      });
      for entry in entries {
        let _ = state.free_map.mark_free(entry);
      }
    }
    get(block_id)
      .lock()
      .modify(|data| DiskInode::empty().encode_slot(data, slot));
    cache.lock().sync_all();
    debug!(
      "deleted inode {}, released {} blocks",
      inumber,
      DiskInode::total_blocks(inode.size as usize)
    );
    Ok(())
  }

  /// Logical size in bytes of the file behind `inumber`.
  pub fn size(&self, inumber: u32) -> Result<usize> {
    let state = self.mounted()?;
    check_inumber(&state.geo, inumber)?;
    let inode = self.read_inode(inumber);
    if inode.is_valid() {
      Ok(inode.size as usize)
    } else {
      Err(FsError::InodeNotAllocated(inumber))
    }
  }

  /// Copy up to `buf.len()` bytes starting at `offset` into `buf`.
  /// Returns how many bytes were copied; reading at or past the end
  /// of the file returns 0.
  pub fn read(&self, inumber: u32, offset: usize, buf: &mut [u8]) -> Result<usize> {
    let state = self.mounted()?;
    check_inumber(&state.geo, inumber)?;
    let inode = self.read_inode(inumber);
    if !inode.is_valid() {
      return Err(FsError::InodeNotAllocated(inumber));
    }
    let mut start = offset;
    let end = (inode.size as usize).min(offset.saturating_add(buf.len()));
    if start >= end {
      return Ok(0);
    }
    let mut read_size = 0usize;
    loop {
      let mut end_current_block = (start / BLOCK_SZ + 1) * BLOCK_SZ;
      end_current_block = end_current_block.min(end);
      let block_read_size = end_current_block - start;
      let block_id = match self.block_id_of(&state.geo, &inode, start / BLOCK_SZ) {
        Some(id) => id,
        // a hole under the size means broken metadata, stop early
        None => break,
      };
      let dst = &mut buf[read_size..read_size + block_read_size];
      self.get_block_cache(block_id as usize).lock().read(|data| {
        let begin = start % BLOCK_SZ;
        dst.copy_from_slice(&data[begin..begin + block_read_size]);
      });
      read_size += block_read_size;
      if end_current_block == end {
        break;
      }
      start = end_current_block;
    }
    Ok(read_size)
  }

  /// Copy `data` into the file starting at `offset`, allocating data
  /// blocks (and the indirect block) on demand. The write is clamped
  /// to the maximum file size and to the data region, and may stop
  /// short when the volume fills up; the return value is the byte
  /// count actually written. `offset` may be at most the current size.
  pub fn write(&mut self, inumber: u32, offset: usize, data: &[u8]) -> Result<usize> {
    let Self {
      block_dev,
      cache,
      state,
    } = self;
    let state = state.as_mut().ok_or(FsError::NotMounted)?;
    check_inumber(&state.geo, inumber)?;
    let get = |block_id: usize| cache.lock().get_block_cache(block_id, Arc::clone(block_dev));

    let (inode_block, inode_slot) = inode_pos(inumber);
    let mut inode = get(inode_block)
      .lock()
      .read(|block| DiskInode::decode_slot(block, inode_slot));
    if !inode.is_valid() {
      return Err(FsError::InodeNotAllocated(inumber));
    }
    let size = inode.size as usize;
    if offset > size {
      return Err(FsError::SparseWrite { offset, size });
    }
    let limit = MAX_FILE_SIZE.min(state.geo.data_bytes());
    let mut end = offset.saturating_add(data.len());
    if end > limit {
      warn!("{}", FsError::CapacityExceeded);
      end = limit;
    }
    if end <= offset {
      return Ok(0);
    }
    let mut start = offset;
    let mut write_size = 0usize;
    loop {
      let mut end_current_block = (start / BLOCK_SZ + 1) * BLOCK_SZ;
      end_current_block = end_current_block.min(end);
      let block_write_size = end_current_block - start;
      let block_id = match block_for_write(&mut inode, start / BLOCK_SZ, state, &get) {
        Some(id) => id,
        None => break,
      };
      let src = &data[write_size..write_size + block_write_size];
      get(block_id as usize).lock().modify(|block| {
        let begin = start % BLOCK_SZ;
        block[begin..begin + block_write_size].copy_from_slice(src);
      });
      write_size += block_write_size;
      if end_current_block == end {
        break;
      }
      start = end_current_block;
    }
    if write_size > 0 {
      inode.size = size.max(offset + write_size) as u32;
      get(inode_block)
        .lock()
        .modify(|block| inode.encode_slot(block, inode_slot));
      cache.lock().sync_all();
    }
    Ok(write_size)
  }

  /// Data blocks currently unallocated.
  pub fn free_blocks(&self) -> Result<usize> {
    Ok(self.mounted()?.free_map.free_blocks())
  }

  /// Layout of the mounted volume.
  pub fn geometry(&self) -> Result<Geometry> {
    Ok(self.mounted()?.geo)
  }

  /// Absolute number of the block holding byte-block `inner` of
  /// `inode`, or None when the pointer chain is unset or damaged.
  fn block_id_of(&self, geo: &Geometry, inode: &DiskInode, inner: usize) -> Option<u32> {
    let ptr = if inner < INODE_DIRECT_COUNT {
      inode.direct[inner]
    } else if inner < MAX_FILE_BLOCKS {
      if !geo.in_data_region(inode.indirect) {
        warn!("no indirect block while resolving data block {}", inner);
        return None;
      }
      self
        .get_block_cache(inode.indirect as usize)
        .lock()
        .read(|data| get_u32(data, inner - INODE_DIRECT_COUNT))
    } else {
      warn!("data block {} is beyond the largest supported file", inner);
      return None;
    };
    if geo.in_data_region(ptr) {
      Some(ptr)
    } else {
      warn!("inode points at block {} outside the data region", ptr);
      None
    }
  }
}

fn check_inumber(geo: &Geometry, inumber: u32) -> Result<()> {
  if (inumber as usize) < geo.total_inodes {
    Ok(())
  } else {
    Err(FsError::InvalidInodeNumber(inumber))
  }
}

/// Mark `block` used while rebuilding the free map. Returns false for
/// blocks outside the data region so the caller skips them.
fn claim(free_map: &mut FreeMap, block: u32) -> bool {
  if free_map.is_used(block) {
    warn!("block {} is referenced more than once", block);
  }
  free_map.mark_used(block).is_ok()
}

/// Resolve byte-block `inner` for a write, allocating the data block
/// (and the indirect block on first use) as needed. None means the
/// data region ran out of space.
fn block_for_write<F>(
  inode: &mut DiskInode,
  inner: usize,
  state: &mut MountState,
  get: &F,
) -> Option<u32>
where
  F: Fn(usize) -> Arc<Mutex<BlockCache>>,
{
  if inner < INODE_DIRECT_COUNT {
    let existing = inode.direct[inner];
    if state.geo.in_data_region(existing) {
      return Some(existing);
    }
    let block = alloc_block(state)?;
    inode.direct[inner] = block;
    return Some(block);
  }
  if inner >= MAX_FILE_BLOCKS {
    return None;
  }
  if !state.geo.in_data_region(inode.indirect) {
    // needs one block for the pointer table and at least one for data
    if state.free_map.free_blocks() < 2 {
      warn!("{}", FsError::CapacityExceeded);
      return None;
    }
    let indirect = alloc_block(state)?;
    get(indirect as usize).lock().modify(|block| {
      for byte in block.iter_mut() {
        *byte = 0;
      }
    });
    inode.indirect = indirect;
  }
  let idx = inner - INODE_DIRECT_COUNT;
  let existing = get(inode.indirect as usize)
    .lock()
    .read(|block| get_u32(block, idx));
  if state.geo.in_data_region(existing) {
    return Some(existing);
  }
  let block = alloc_block(state)?;
  get(inode.indirect as usize)
    .lock()
    .modify(|blk| put_u32(blk, idx, block));
  Some(block)
}

fn alloc_block(state: &mut MountState) -> Option<u32> {
  match state.free_map.find_free() {
    Some(block) => {
      let _ = state.free_map.mark_used(block);
      Some(block)
    }
    None => {
      warn!("{}", FsError::CapacityExceeded);
      None
    }
  }
}
