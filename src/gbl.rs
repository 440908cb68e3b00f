// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Shared leaf types and constants.

use std::{
  fmt::{self, Display, Formatter},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

/// Block size for streaming file reads.
pub const READ_BLOCK_SIZE: usize = 64 * 1024;

/// Priority assigned to newly indexed files unless overridden.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Maximum number of paths per ExifTool invocation.
pub const EXIF_BATCH_SIZE: usize = 200;

/// Kind of device backing a source or destination tree. Used to pick worker
/// counts: spinning disks degrade under concurrent reads, arrays thrive on
/// them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageClass {
  #[value(name = "HDD")]
  Hdd,
  #[value(name = "SSD")]
  Ssd,
  #[value(name = "RAID")]
  Raid,
}

impl StorageClass {
  /// Worker count for the digest pool.
  pub fn digest_workers(self) -> usize {
    match self {
      Self::Hdd => 1,
      Self::Ssd => num_cpus::get(),
      Self::Raid => num_cpus::get().max(4),
    }
  }

  /// Worker count for the metadata extractor pool.
  pub fn exif_workers(self) -> usize {
    self.digest_workers()
  }
}

impl Display for StorageClass {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    f.write_str(match self {
      Self::Hdd => "HDD",
      Self::Ssd => "SSD",
      Self::Raid => "RAID",
    })
  }
}

/// Cooperative cancellation, checked between files. In-flight copies and
/// deletes run to completion or are rolled back by their owner.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_set(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }
}
