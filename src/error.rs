use thiserror::Error;

/// Everything a volume operation can report. None of these are fatal;
/// the caller decides whether to retry, abort or surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
  #[error("volume is not mounted")]
  NotMounted,
  #[error("volume is already mounted")]
  AlreadyMounted,
  #[error("volume is already unmounted")]
  AlreadyUnmounted,
  #[error("bad magic number, device holds no formatted volume")]
  InvalidMagic,
  #[error("inode number {0} is out of range")]
  InvalidInodeNumber(u32),
  #[error("inode {0} is not allocated")]
  InodeNotAllocated(u32),
  #[error("no free slot left in the inode table")]
  TableFull,
  #[error("write at offset {offset} would leave a gap in a {size} byte file")]
  SparseWrite { offset: usize, size: usize },
  /// Reported when a write request runs past the maximum file size or
  /// the data region. The clamped portion of the write still succeeds,
  /// so this kind reaches callers as a short byte count plus a warning
  /// in the log rather than as an `Err`.
  #[error("write truncated to the volume's capacity")]
  CapacityExceeded,
  #[error("block {0} is outside the data region")]
  BlockIndexOutOfRange(u32),
  #[error("device of {0} blocks is too small to hold a volume")]
  DeviceTooSmall(usize),
}

pub type Result<T> = core::result::Result<T, FsError>;
