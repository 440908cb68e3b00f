// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Streaming digest engine over the catalog's supported algorithms.

use std::{
  collections::HashMap,
  fmt::{self, Display, Formatter},
  fs::File,
  io::Read,
  path::{Path, PathBuf},
  thread,
};

use blake2::{Blake2b, digest::consts::U32};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  error::{Error, Result},
  gbl::{CancelFlag, READ_BLOCK_SIZE},
};

/// 32-byte BLAKE2b, matching `b2sum -l 256`.
type Blake2b256 = Blake2b<U32>;

/// Content digest algorithm. Fixed per catalog at creation; every `chk` in a
/// catalog is a digest under its one algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Algorithm {
  #[serde(rename = "blake2b-256")]
  #[value(name = "blake2b-256")]
  Blake2b256,
  #[serde(rename = "blake3")]
  #[value(name = "blake3")]
  Blake3,
  #[serde(rename = "sha256")]
  #[value(name = "sha256")]
  Sha256,
}

impl Display for Algorithm {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    f.write_str(match self {
      Self::Blake2b256 => "blake2b-256",
      Self::Blake3 => "blake3",
      Self::Sha256 => "sha256",
    })
  }
}

/// Computes the lowercase hex digest of `path`'s contents, reading in
/// `READ_BLOCK_SIZE` blocks.
pub fn hash_file(path: impl AsRef<Path>, algorithm: Algorithm) -> Result<String> {
  let path = path.as_ref();
  let mut file = File::open(path).map_err(|e| Error::io(path, e))?;

  match algorithm {
    Algorithm::Blake2b256 => digest_stream::<Blake2b256>(&mut file, path),
    Algorithm::Blake3 => blake3_stream(&mut file, path),
    Algorithm::Sha256 => digest_stream::<Sha256>(&mut file, path),
  }
}

/// Digests `paths` across `workers` threads, returning a per-path result.
/// Errors stay per-path; the batch always runs to completion (or to
/// cancellation, which stops handing out further files).
pub fn hash_batch(
  paths: &[PathBuf],
  algorithm: Algorithm,
  workers: usize,
  cancel: &CancelFlag,
) -> HashMap<PathBuf, Result<String>> {
  let workers = workers.max(1);
  let (job_tx, job_rx) = crossbeam_channel::bounded::<PathBuf>(workers * 2);
  let (result_tx, result_rx) = crossbeam_channel::unbounded();

  thread::scope(|s| {
    for _ in 0..workers {
      let job_rx = job_rx.clone();
      let result_tx = result_tx.clone();
      s.spawn(move || {
        for path in job_rx.iter() {
          let digest = hash_file(&path, algorithm);
          result_tx.send((path, digest)).unwrap();
        }
      });
    }
    drop(job_rx);
    drop(result_tx);

    for path in paths {
      if cancel.is_set() {
        break;
      }
      job_tx.send(path.clone()).unwrap();
    }
    drop(job_tx);

    result_rx.iter().collect()
  })
}

fn digest_stream<D: Digest>(file: &mut File, path: &Path) -> Result<String> {
  let mut hasher = D::new();
  let mut block = vec![0u8; READ_BLOCK_SIZE];

  loop {
    let n = file.read(&mut block).map_err(|e| Error::Hash {
      path:    path.to_path_buf(),
      message: e.to_string(),
    })?;
    if n == 0 {
      break;
    }
    hasher.update(&block[..n]);
  }

  Ok(hex::encode(hasher.finalize()))
}

// BLAKE3 ships its own hasher type rather than the RustCrypto trait.
fn blake3_stream(file: &mut File, path: &Path) -> Result<String> {
  let mut hasher = blake3::Hasher::new();
  let mut block = vec![0u8; READ_BLOCK_SIZE];

  loop {
    let n = file.read(&mut block).map_err(|e| Error::Hash {
      path:    path.to_path_buf(),
      message: e.to_string(),
    })?;
    if n == 0 {
      break;
    }
    hasher.update(&block[..n]);
  }

  Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod test_hash_file {
  use super::*;
  use crate::testing::*;

  #[test]
  fn blake2b_256_matches_b2sum() {
    let d = test_dir!(
      "data.bin": b"hello world",
    );

    assert_eq!(
      hash_file(d.get_path("data.bin"), Algorithm::Blake2b256).unwrap(),
      "256c83b297114d201b30179f3f0ef0cace9783622da5974326b436178aeef610"
    );
  }

  #[test]
  fn blake3_matches_reference() {
    let d = test_dir!(
      "data.bin": b"hello world",
    );

    assert_eq!(
      hash_file(d.get_path("data.bin"), Algorithm::Blake3).unwrap(),
      "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
    );
  }

  #[test]
  fn sha256_matches_reference() {
    let d = test_dir!(
      "data.bin": b"hello world",
    );

    assert_eq!(
      hash_file(d.get_path("data.bin"), Algorithm::Sha256).unwrap(),
      "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
  }

  #[test]
  fn digests_empty_file() {
    let d = test_dir!(
      "empty.bin": b"",
    );

    assert_eq!(
      hash_file(d.get_path("empty.bin"), Algorithm::Sha256).unwrap(),
      "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
  }

  #[test]
  fn digests_file_larger_than_one_block() {
    let d = test_dir!();
    let path = d.get_path("big.bin");
    std::fs::write(&path, vec![0xab_u8; READ_BLOCK_SIZE * 2 + 17]).unwrap();

    let full = hash_file(&path, Algorithm::Blake3).unwrap();
    let whole = blake3::hash(&vec![0xab_u8; READ_BLOCK_SIZE * 2 + 17]);

    assert_eq!(full, whole.to_hex().to_string());
  }

  #[test]
  fn errors_if_file_does_not_exist() {
    let d = test_dir!();

    assert!(matches!(
      hash_file(d.get_path("missing.jpg"), Algorithm::Sha256),
      Err(Error::Io { .. })
    ));
  }
}
