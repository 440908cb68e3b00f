// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Catalog persistence: JSON with optional gzip/zstd framing, versioned
//! upgrade on load, atomic writes, and non-destructive rotation of prior
//! versions.

use std::{
  collections::BTreeMap,
  fs,
  io::{Read, Write},
  path::{Path, PathBuf},
};

use chrono::Local;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
  db::{CATALOG_VERSION, Catalog},
  photo::PhotoFile,
};
use crate::{
  error::{Error, Result},
  hash::{self, Algorithm},
};

/// zstd level for `.zst` catalogs.
const ZSTD_LEVEL: i32 = 9;

/// Version 1 used long field names.
const V1_KEYS: [(&str, &str); 7] = [
  ("checksum", "chk"),
  ("source_path", "src"),
  ("datetime", "dt"),
  ("timestamp", "ts"),
  ("file_size", "fsz"),
  ("store_path", "sto"),
  ("priority", "prio"),
];

/// On-disk document. Fields sorted so serde emits sorted keys.
#[derive(Deserialize)]
struct CatalogDoc {
  command_history:  BTreeMap<String, String>,
  hash_algorithm:   Algorithm,
  photo_db:         BTreeMap<String, Vec<PhotoFile>>,
  timezone_default: String,
  #[allow(dead_code)]
  version:          u64,
}

#[derive(Serialize)]
struct CatalogDocRef<'a> {
  command_history:  &'a BTreeMap<String, String>,
  hash_algorithm:   Algorithm,
  photo_db:         &'a BTreeMap<String, Vec<PhotoFile>>,
  timezone_default: &'a str,
  version:          u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Framing {
  Plain,
  Gzip,
  Zstd,
}

/// Loads a catalog, upgrading older versions in memory.
pub fn load(path: impl AsRef<Path>) -> Result<Catalog> {
  let path = path.as_ref();
  log::debug!("{}: Loading catalog.", path.display());

  let bytes = read_payload(path)?;
  let mut value: Value = serde_json::from_slice(&bytes)
    .map_err(|e| Error::Database(format!("{}: Parse failed ({e}).", path.display())))?;

  upgrade(&mut value)?;

  let doc: CatalogDoc = serde_json::from_value(value)
    .map_err(|e| Error::Database(format!("{}: Malformed catalog ({e}).", path.display())))?;

  Catalog::from_parts(
    doc.hash_algorithm,
    doc.timezone_default,
    doc.photo_db,
    doc.command_history,
  )
}

/// Saves `catalog` to `path`, compressing per the file suffix. An existing
/// file with different content is first renamed to
/// `<stem>_YYYYMMDD_HHMMSS_<digest7>.<ext>`; identical content is left
/// untouched. The write itself is temp-file + fsync + rename.
pub fn save(catalog: &Catalog, path: impl AsRef<Path>) -> Result<()> {
  let path = path.as_ref();
  let payload = encode(catalog)?;

  if path.exists() {
    if read_payload(path).is_ok_and(|existing| existing == payload) {
      log::debug!("{}: Catalog unchanged; not rewritten.", path.display());
      return Ok(());
    }
    rotate(path, catalog.algorithm())?;
  }

  let framed = compress(&payload, framing(path))?;
  write_atomic(path, &framed)
}

/// Serializes `catalog` to its canonical JSON bytes (sorted keys, compact
/// separators), without compression framing.
pub fn encode(catalog: &Catalog) -> Result<Vec<u8>> {
  let doc = CatalogDocRef {
    command_history:  catalog.command_history(),
    hash_algorithm:   catalog.algorithm(),
    photo_db:         catalog.photo_db(),
    timezone_default: catalog.timezone_default(),
    version:          CATALOG_VERSION,
  };

  serde_json::to_vec(&doc).map_err(|e| Error::Database(format!("Serialization failed ({e}).")))
}

//
// Private.
//

fn framing(path: &Path) -> Framing {
  match path.extension().and_then(|e| e.to_str()) {
    Some("gz") => Framing::Gzip,
    Some("zst") => Framing::Zstd,
    _ => Framing::Plain,
  }
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
  let raw = fs::read(path).map_err(|e| Error::io(path, e))?;

  match framing(path) {
    Framing::Plain => Ok(raw),
    Framing::Gzip => {
      let mut out = Vec::new();
      GzDecoder::new(&raw[..])
        .read_to_end(&mut out)
        .map_err(|e| Error::Database(format!("{}: gzip decode failed ({e}).", path.display())))?;
      Ok(out)
    }
    Framing::Zstd => zstd::decode_all(&raw[..])
      .map_err(|e| Error::Database(format!("{}: zstd decode failed ({e}).", path.display()))),
  }
}

fn compress(payload: &[u8], framing: Framing) -> Result<Vec<u8>> {
  match framing {
    Framing::Plain => Ok(payload.to_vec()),
    Framing::Gzip => {
      let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
      encoder
        .write_all(payload)
        .and_then(|()| encoder.finish())
        .map_err(|e| Error::Database(format!("gzip encode failed ({e}).")))
    }
    Framing::Zstd => zstd::encode_all(payload, ZSTD_LEVEL)
      .map_err(|e| Error::Database(format!("zstd encode failed ({e})."))),
  }
}

fn upgrade(value: &mut Value) -> Result<()> {
  let version = value
    .get("version")
    .and_then(Value::as_u64)
    .ok_or_else(|| Error::Database("Missing or non-integer version.".to_string()))?;

  match version {
    1 => {
      upgrade_v1(value)?;
      upgrade_v2(value);
    }
    2 => upgrade_v2(value),
    3 => {}
    v => return Err(Error::Database(format!("Unknown version {v}."))),
  }

  value["version"] = CATALOG_VERSION.into();
  Ok(())
}

/// v1 -> v2: long photo field names become the short forms.
fn upgrade_v1(value: &mut Value) -> Result<()> {
  let photo_db = value
    .get_mut("photo_db")
    .and_then(Value::as_object_mut)
    .ok_or_else(|| Error::Database("Missing photo_db.".to_string()))?;

  for bucket in photo_db.values_mut() {
    let Some(photos) = bucket.as_array_mut() else {
      continue;
    };
    for photo in photos {
      let Some(fields) = photo.as_object_mut() else {
        continue;
      };
      for (old, new) in V1_KEYS {
        if let Some(v) = fields.remove(old) {
          fields.insert(new.to_string(), v);
        }
      }
    }
  }

  Ok(())
}

/// v2 -> v3: `timezone_default` appears; `tzo` stays absent on old records.
fn upgrade_v2(value: &mut Value) {
  if value.get("timezone_default").is_none() {
    value["timezone_default"] = "local".into();
  }
}

/// Renames the existing catalog aside so no version history is overwritten.
fn rotate(path: &Path, algorithm: Algorithm) -> Result<()> {
  let digest = hash::hash_file(path, algorithm)?;
  let stamp = Local::now().format("%Y%m%d_%H%M%S");

  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let rotated = match name.split_once('.') {
    Some((stem, ext)) => format!("{stem}_{stamp}_{}.{ext}", &digest[..7]),
    None => format!("{name}_{stamp}_{}", &digest[..7]),
  };
  let target = path.with_file_name(rotated);

  fs::rename(path, &target).map_err(|e| Error::io(path, e))?;
  log::info!(
    "{}: Previous catalog kept as {}.",
    path.display(),
    target.display()
  );

  Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
  }

  let tmp = PathBuf::from(format!("{}.tmp", path.display()));
  {
    let mut file = fs::File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| Error::io(&tmp, e))?;
    file.sync_all().map_err(|e| Error::io(&tmp, e))?;
  }

  fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}



#[cfg(test)]
mod test_rotation {
  use super::*;
  use crate::testing::*;

  #[test]
  fn keeps_previous_version_on_change() {
    let d = test_dir!();
    let db = d.get_path("photos.json");

    let mut catalog = Catalog::new(Algorithm::Sha256, "local".to_string());
    save(&catalog, &db).unwrap();
    let original = fs::read(&db).unwrap();

    catalog.add(photo!("chk": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "src": "/a.jpg"));
    save(&catalog, &db).unwrap();

    let rotated: Vec<_> = fs::read_dir(d.root())
      .unwrap()
      .map(|e| e.unwrap().path())
      .filter(|p| p.is_file() && p != &db)
      .collect();
    assert_eq!(rotated.len(), 1);
    assert_eq!(fs::read(&rotated[0]).unwrap(), original);

    let name = rotated[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("photos_"));
    assert!(name.ends_with(".json"));
  }

  #[test]
  fn does_not_rotate_identical_content() {
    let d = test_dir!();
    let db = d.get_path("photos.json");

    let catalog = Catalog::new(Algorithm::Sha256, "local".to_string());
    save(&catalog, &db).unwrap();
    save(&catalog, &db).unwrap();

    let files = fs::read_dir(d.root())
      .unwrap()
      .filter(|e| e.as_ref().unwrap().path().is_file())
      .count();
    assert_eq!(files, 1);
  }
}
