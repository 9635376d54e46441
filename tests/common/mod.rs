#![allow(dead_code)]

use flat_fs::{BlockDevice, BLOCK_SZ};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

pub fn init_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// Block device backed by a plain Vec. Every test gets a fresh one.
pub struct MemDisk {
  blocks: Mutex<Vec<u8>>,
  nblocks: usize,
}

impl MemDisk {
  pub fn new(nblocks: usize) -> Self {
    Self {
      blocks: Mutex::new(vec![0u8; nblocks * BLOCK_SZ]),
      nblocks,
    }
  }
}

impl BlockDevice for MemDisk {
  fn read_block(&self, block_id: usize, buf: &mut [u8]) {
    assert!(block_id < self.nblocks, "read past end of device");
    let blocks = self.blocks.lock().unwrap();
    let base = block_id * BLOCK_SZ;
    buf.copy_from_slice(&blocks[base..base + BLOCK_SZ]);
  }

  fn write_block(&self, block_id: usize, buf: &[u8]) {
    assert!(block_id < self.nblocks, "write past end of device");
    let mut blocks = self.blocks.lock().unwrap();
    let base = block_id * BLOCK_SZ;
    blocks[base..base + BLOCK_SZ].copy_from_slice(buf);
  }

  fn num_blocks(&self) -> usize {
    self.nblocks
  }
}

/// Block device backed by a regular file, for persistence tests.
pub struct BlockFile {
  file: Mutex<File>,
  nblocks: usize,
}

impl BlockFile {
  pub fn create(path: &Path, nblocks: usize) -> Self {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(true)
      .open(path)
      .unwrap();
    file.set_len((nblocks * BLOCK_SZ) as u64).unwrap();
    Self {
      file: Mutex::new(file),
      nblocks,
    }
  }

  pub fn open(path: &Path) -> Self {
    let file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let nblocks = file.metadata().unwrap().len() as usize / BLOCK_SZ;
    Self {
      file: Mutex::new(file),
      nblocks,
    }
  }
}

impl BlockDevice for BlockFile {
  fn read_block(&self, block_id: usize, buf: &mut [u8]) {
    let mut file = self.file.lock().unwrap();
    file
      .seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
      .expect("Error when seeking!");
    assert_eq!(file.read(buf).unwrap(), BLOCK_SZ, "Not a complete block!");
  }

  fn write_block(&self, block_id: usize, buf: &[u8]) {
    let mut file = self.file.lock().unwrap();
    file
      .seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
      .expect("Error when seeking!");
    assert_eq!(file.write(buf).unwrap(), BLOCK_SZ, "Not a complete block!");
  }

  fn num_blocks(&self) -> usize {
    self.nblocks
  }
}
