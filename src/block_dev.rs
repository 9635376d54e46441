/// Trait implemented by anything that can serve fixed-size blocks:
/// a file, a RAM buffer, a virtio disk. The filesystem never touches
/// storage except through this interface.
pub trait BlockDevice: Send + Sync {
  fn read_block(&self, block_id: usize, buf: &mut [u8]);
  fn write_block(&self, block_id: usize, buf: &[u8]);
  /// Number of blocks the device can hold.
  fn num_blocks(&self) -> usize;
}
