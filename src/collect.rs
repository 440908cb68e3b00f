// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! The collector: copies the best variant of each photo into the
//! content-named destination layout, resumably and idempotently.

use std::{
  fs, io,
  path::{Path, PathBuf},
};

use chrono::DateTime;

use crate::{
  catalog::{Catalog, PhotoFile},
  error::{Error, Result},
  gbl::CancelFlag,
  hash::{self, Algorithm},
};

/// Attempts at suffixed store names before giving up on a uid.
const MAX_NAME_ATTEMPTS: usize = 100;

#[derive(Default)]
pub struct CollectReport {
  pub copied:       usize,
  pub skipped:      usize,
  pub bytes_copied: u64,
  pub uncollected:  Vec<String>,
  pub errors:       Vec<Error>,
}

/// Copies the primary variant of every uid into `destination`, marking
/// `sto` on success. Already-stored variants whose file exists with matching
/// size are skipped, so repeat runs touch nothing.
pub fn collect(
  catalog: &mut Catalog,
  destination: &Path,
  cancel: &CancelFlag,
) -> Result<CollectReport> {
  fs::create_dir_all(destination).map_err(|e| Error::io(destination, e))?;
  let algorithm = catalog.algorithm();

  let mut report = CollectReport::default();

  for uid in catalog.uids() {
    if cancel.is_set() {
      log::warn!("Cancelled; collection stopped.");
      break;
    }

    let order = catalog.best_order(&uid);
    let primary = &catalog.get(&uid).unwrap()[order[0]];
    if primary.is_stored() && size_matches(&destination.join(&primary.sto), primary.fsz) {
      report.skipped += 1;
      continue;
    }

    match store_first_readable(catalog, &uid, &order, destination, algorithm) {
      Ok(Some(bytes)) => {
        report.copied += 1;
        report.bytes_copied += bytes;
      }
      Ok(None) => {
        log::warn!("{uid}: No readable variant. UNCOLLECTED.");
        report.uncollected.push(uid);
      }
      Err(e) => {
        log::warn!("{e}");
        report.errors.push(e);
      }
    }
  }

  log::info!(
    "Collected {} photos ({} bytes), {} already stored, {} uncollected, {} errors.",
    report.copied,
    report.bytes_copied,
    report.skipped,
    report.uncollected.len(),
    report.errors.len()
  );

  Ok(report)
}

/// Relative store path for `variant`:
/// `YYYY/MM-Mon/YYYY-MM-DD_HH-MM-SS-<chk[0:7]>-<basename>`, rendered in the
/// variant's recorded offset. Always forward slashes.
fn store_path(variant: &PhotoFile) -> String {
  let date_time = DateTime::from_timestamp(variant.timestamp_secs(), 0)
    .unwrap_or(DateTime::UNIX_EPOCH)
    .with_timezone(&variant.offset());

  let prefix = date_time.format("%Y/%m-%b/%Y-%m-%d_%H-%M-%S").to_string();
  let chk = &variant.chk[..7.min(variant.chk.len())];
  let name = sanitize_file_name(variant.file_name());

  format!("{prefix}-{chk}-{name}")
}

//
// Private.
//

/// Walks `order` until a variant with a readable source stores successfully.
/// Returns the bytes copied, or `None` if no variant could be read.
fn store_first_readable(
  catalog: &mut Catalog,
  uid: &str,
  order: &[usize],
  destination: &Path,
  algorithm: Algorithm,
) -> Result<Option<u64>> {
  for &index in order {
    let variant = catalog.get(uid).unwrap()[index].clone();

    if let Err(e) = fs::File::open(&variant.src) {
      log::warn!(
        "{}: Unreadable source ({e}). Trying next variant.",
        variant.src.display()
      );
      continue;
    }

    return store_variant(catalog, uid, index, &variant, destination, algorithm).map(Some);
  }

  Ok(None)
}

fn store_variant(
  catalog: &mut Catalog,
  uid: &str,
  index: usize,
  variant: &PhotoFile,
  destination: &Path,
  algorithm: Algorithm,
) -> Result<u64> {
  // A stale store record (file missing or wrong size) is re-resolved from
  // scratch; release its claim first.
  if variant.is_stored() {
    catalog.clear_stored(uid, index);
  }

  let base = store_path(variant);

  for attempt in 0..MAX_NAME_ATTEMPTS {
    let rel = with_suffix(&base, attempt);
    if catalog.is_store_path_taken(&rel) {
      continue;
    }

    let full = destination.join(&rel);
    if let Some(parent) = full.parent() {
      fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    if full.exists() {
      let size = fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
      if size < variant.fsz {
        // Leftover of an interrupted copy.
        log::warn!(
          "{}: Removing partial file from an interrupted collect.",
          full.display()
        );
        fs::remove_file(&full).map_err(|e| Error::io(&full, e))?;
      } else if hash::hash_file(&full, algorithm)? == variant.chk {
        log::debug!("{}: Already present at {rel}.", variant.src.display());
        catalog.set_stored(uid, index, rel)?;
        return Ok(0);
      } else {
        // Same name, different photo.
        continue;
      }
    }

    let bytes = copy_file(&variant.src, &full)?;
    catalog.set_stored(uid, index, rel.clone())?;
    log::debug!("{} -> {rel}.", variant.src.display());
    return Ok(bytes);
  }

  Err(Error::Collection {
    path:    PathBuf::from(base),
    message: "no unique store name available".to_string(),
  })
}

/// Streams `src` to a freshly created `dst` and fsyncs it. A failed copy
/// unlinks the partial target.
fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
  let mut reader = fs::File::open(src).map_err(|e| Error::io(src, e))?;
  let mut writer = fs::OpenOptions::new()
    .write(true)
    .create_new(true)
    .open(dst)
    .map_err(|e| Error::io(dst, e))?;

  let copied = io::copy(&mut reader, &mut writer).and_then(|n| writer.sync_all().map(|()| n));

  match copied {
    Ok(bytes) => Ok(bytes),
    Err(e) => {
      drop(writer);
      let _ = fs::remove_file(dst);
      Err(Error::Collection {
        path:    dst.to_path_buf(),
        message: e.to_string(),
      })
    }
  }
}

fn sanitize_file_name(name: &str) -> String {
  let cleaned: String = name
    .chars()
    .map(|c| if c == '/' || c == '\\' { '_' } else { c })
    .collect();

  if cleaned.is_empty() {
    "unnamed".to_string()
  } else {
    cleaned
  }
}

fn size_matches(path: &Path, expected: u64) -> bool {
  fs::metadata(path).is_ok_and(|m| m.len() == expected)
}

fn with_suffix(base: &str, n: usize) -> String {
  if n == 0 {
    return base.to_string();
  }

  match base.rsplit_once('.') {
    Some((stem, ext)) => format!("{stem}-{n}.{ext}"),
    None => format!("{base}-{n}"),
  }
}
