// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! The verifier: recomputes digests of stored files and classifies each as
//! PASS, FAIL or MISSING. Mutates nothing.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use rand::Rng;

use crate::{
  catalog::Catalog,
  gbl::{CancelFlag, StorageClass},
  hash,
};

pub struct VerifyOptions {
  /// Restrict to variants whose `sto` has this prefix.
  pub subdir: Option<String>,

  /// Sample each stored variant independently with this probability.
  pub random_fraction: Option<f64>,

  pub storage: StorageClass,
  pub cancel:  CancelFlag,
}

impl Default for VerifyOptions {
  fn default() -> Self {
    Self {
      subdir:          None,
      random_fraction: None,
      storage:         StorageClass::Hdd,
      cancel:          CancelFlag::new(),
    }
  }
}

#[derive(Default)]
pub struct VerifyReport {
  pub n_pass:      usize,
  pub n_fail:      usize,
  pub n_missing:   usize,
  pub total_bytes: u64,
  pub failed:      Vec<String>,
  pub missing:     Vec<String>,
}

impl VerifyReport {
  pub fn ok(&self) -> bool {
    self.n_fail == 0 && self.n_missing == 0
  }
}

/// Recomputes the digest of every selected stored file under the catalog's
/// algorithm and compares it to `chk`.
pub fn verify(catalog: &Catalog, destination: &Path, options: &VerifyOptions) -> VerifyReport {
  let mut rng = rand::thread_rng();
  let mut report = VerifyReport::default();

  let mut to_hash: Vec<PathBuf> = Vec::new();
  let mut expected: HashMap<PathBuf, (String, String, u64)> = HashMap::new();

  for (_, photo) in catalog.stored_photos() {
    if let Some(subdir) = &options.subdir {
      if !photo.sto.starts_with(subdir.as_str()) {
        continue;
      }
    }
    if let Some(fraction) = options.random_fraction {
      if rng.r#gen::<f64>() >= fraction {
        continue;
      }
    }

    let full = destination.join(&photo.sto);
    if full.is_file() {
      expected.insert(full.clone(), (photo.sto.clone(), photo.chk.clone(), photo.fsz));
      to_hash.push(full);
    } else {
      log::warn!("{}: MISSING.", photo.sto);
      report.n_missing += 1;
      report.missing.push(photo.sto.clone());
    }
  }

  log::info!("Verifying {} stored files.", to_hash.len() + report.n_missing);

  let digests = hash::hash_batch(
    &to_hash,
    catalog.algorithm(),
    options.storage.digest_workers(),
    &options.cancel,
  );

  for full in &to_hash {
    let (sto, chk, fsz) = &expected[full];
    match digests.get(full) {
      Some(Ok(digest)) if digest == chk => {
        log::debug!("{sto}: PASS.");
        report.n_pass += 1;
        report.total_bytes += fsz;
      }
      Some(Ok(_)) => {
        log::warn!("{sto}: FAIL.");
        report.n_fail += 1;
        report.failed.push(sto.clone());
        report.total_bytes += fsz;
      }
      Some(Err(e)) => {
        log::warn!("{sto}: FAIL ({e}).");
        report.n_fail += 1;
        report.failed.push(sto.clone());
      }
      // Cancelled before this file was handed out.
      None => {}
    }
  }

  log::info!(
    "Verified {} bytes: {} pass, {} fail, {} missing.",
    report.total_bytes,
    report.n_pass,
    report.n_fail,
    report.n_missing
  );

  report
}
