// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! In-memory catalog model: variant lists bucketed by uid, with derived
//! digest and timestamp indexes.

use std::{
  cmp::Ordering,
  collections::{BTreeMap, BTreeSet, HashMap, HashSet},
  path::Path,
};

use chrono::Local;

use super::photo::PhotoFile;
use crate::{
  error::{Error, Result},
  hash::Algorithm,
};

/// Current on-disk version. Older versions are upgraded on load.
pub const CATALOG_VERSION: u64 = 3;

/// How `Catalog::add` resolved an incoming file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
  /// A new uid was allocated.
  Inserted,
  /// Appended to an existing uid, as an exact copy at a new path or an
  /// alternate version.
  Merged,
  /// Already recorded with the same digest and source path; left unchanged.
  Duplicate,
}

/// The photo database. Every variant of one logical photo shares a uid; the
/// uid never changes once allocated.
pub struct Catalog {
  hash_algorithm:   Algorithm,
  timezone_default: String,
  photo_db:         BTreeMap<String, Vec<PhotoFile>>,
  command_history:  BTreeMap<String, String>,

  // Derived caches. Rebuilt on load, updated on every add, never persisted.
  hash_to_uid:       HashMap<String, String>,
  timestamp_to_uids: HashMap<i64, BTreeSet<String>>,
  stored_paths:      HashSet<String>,
}

impl Catalog {
  //
  // Constructors.
  //

  /// Creates an empty catalog. The algorithm is fixed for the catalog's
  /// life.
  pub fn new(hash_algorithm: Algorithm, timezone_default: String) -> Self {
    Self {
      hash_algorithm,
      timezone_default,
      photo_db: BTreeMap::new(),
      command_history: BTreeMap::new(),
      hash_to_uid: HashMap::new(),
      timestamp_to_uids: HashMap::new(),
      stored_paths: HashSet::new(),
    }
  }

  /// Rebuilds a catalog from its persisted parts, deriving indexes and
  /// checking invariants.
  pub(super) fn from_parts(
    hash_algorithm: Algorithm,
    timezone_default: String,
    photo_db: BTreeMap<String, Vec<PhotoFile>>,
    command_history: BTreeMap<String, String>,
  ) -> Result<Self> {
    let mut catalog = Self {
      hash_algorithm,
      timezone_default,
      photo_db,
      command_history,
      hash_to_uid: HashMap::new(),
      timestamp_to_uids: HashMap::new(),
      stored_paths: HashSet::new(),
    };
    catalog.rebuild_indexes()?;

    Ok(catalog)
  }

  //
  // Public.
  //

  pub fn algorithm(&self) -> Algorithm {
    self.hash_algorithm
  }

  pub fn timezone_default(&self) -> &str {
    &self.timezone_default
  }

  /// Resolves `photo` into an existing uid or allocates a new one.
  ///
  /// 1. An identical digest joins its bucket: unchanged if this exact source
  ///    path is already recorded, appended otherwise.
  /// 2. A matching integer-second timestamp plus case-insensitive basename
  ///    marks an alternate version of an existing photo.
  /// 3. Anything else founds a new bucket.
  pub fn add(&mut self, photo: PhotoFile) -> AddOutcome {
    if let Some(uid) = self.hash_to_uid.get(&photo.chk).cloned() {
      let already_recorded = self.photo_db[&uid]
        .iter()
        .any(|p| p.chk == photo.chk && p.src == photo.src);
      if already_recorded {
        log::debug!("{}: Already recorded under {uid}.", photo.src.display());
        return AddOutcome::Duplicate;
      }

      log::debug!("{}: New copy of {uid}.", photo.src.display());
      self.index_photo(&uid, &photo);
      self.photo_db.get_mut(&uid).unwrap().push(photo);
      return AddOutcome::Merged;
    }

    if let Some(uid) = self.find_alternate(&photo) {
      log::debug!("{}: Alternate version of {uid}.", photo.src.display());
      self.index_photo(&uid, &photo);
      self.photo_db.get_mut(&uid).unwrap().push(photo);
      return AddOutcome::Merged;
    }

    let uid = self.allocate_uid(&photo.chk);
    log::debug!("{}: New photo {uid}.", photo.src.display());
    self.index_photo(&uid, &photo);
    self.photo_db.insert(uid, vec![photo]);
    AddOutcome::Inserted
  }

  pub fn get(&self, uid: &str) -> Option<&[PhotoFile]> {
    self.photo_db.get(uid).map(Vec::as_slice)
  }

  /// The uid holding `chk`, if any variant carries that digest.
  pub fn uid_for_digest(&self, chk: &str) -> Option<&str> {
    self.hash_to_uid.get(chk).map(String::as_str)
  }

  /// Iterates over all buckets, in uid order.
  pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<PhotoFile>)> {
    self.photo_db.iter()
  }

  /// All uids, in order. Cloned so callers can mutate while iterating.
  pub fn uids(&self) -> Vec<String> {
    self.photo_db.keys().cloned().collect()
  }

  pub fn num_photos(&self) -> usize {
    self.photo_db.len()
  }

  pub fn num_variants(&self) -> usize {
    self.photo_db.values().map(Vec::len).sum()
  }

  /// Iterates over `(uid, variant)` for every variant with a store path.
  pub fn stored_photos(&self) -> impl Iterator<Item = (&str, &PhotoFile)> {
    self
      .photo_db
      .iter()
      .flat_map(|(uid, bucket)| bucket.iter().map(move |p| (uid.as_str(), p)))
      .filter(|(_, p)| p.is_stored())
  }

  /// Variant indices for `uid`, best first: ascending priority, then newest
  /// timestamp, then source path.
  pub fn best_order(&self, uid: &str) -> Vec<usize> {
    let Some(bucket) = self.photo_db.get(uid) else {
      return Vec::new();
    };

    let mut order: Vec<usize> = (0..bucket.len()).collect();
    order.sort_by(|&a, &b| {
      let (pa, pb) = (&bucket[a], &bucket[b]);
      pa.prio
        .cmp(&pb.prio)
        .then(pb.ts.partial_cmp(&pa.ts).unwrap_or(Ordering::Equal))
        .then(pa.src.cmp(&pb.src))
    });

    order
  }

  /// Marks `bucket[index]` as stored at `sto`. Store paths are unique across
  /// the catalog.
  pub fn set_stored(&mut self, uid: &str, index: usize, sto: String) -> Result<()> {
    if !self.stored_paths.insert(sto.clone()) {
      return Err(Error::Collection {
        path:    sto.clone().into(),
        message: "store path already claimed".to_string(),
      });
    }

    self.photo_db.get_mut(uid).unwrap()[index].sto = sto;
    Ok(())
  }

  /// Clears the store path of `bucket[index]` after its file was removed.
  pub fn clear_stored(&mut self, uid: &str, index: usize) {
    let photo = &mut self.photo_db.get_mut(uid).unwrap()[index];
    self.stored_paths.remove(&photo.sto);
    photo.sto.clear();
  }

  pub fn is_store_path_taken(&self, sto: &str) -> bool {
    self.stored_paths.contains(sto)
  }

  /// Every recorded source path, for `skip-existing` filtering.
  pub fn src_paths(&self) -> HashSet<&Path> {
    self
      .photo_db
      .values()
      .flatten()
      .map(|p| p.src.as_path())
      .collect()
  }

  /// Appends a command line to the history under a local ISO timestamp.
  pub fn record_command(&mut self, command: String) {
    let mut stamp = Local::now().format("%Y-%m-%dT%H:%M:%S%z").to_string();
    // Identical timestamps happen in tests that run commands back-to-back.
    while self.command_history.contains_key(&stamp) {
      stamp.push('+');
    }
    self.command_history.insert(stamp, command);
  }

  pub(super) fn photo_db(&self) -> &BTreeMap<String, Vec<PhotoFile>> {
    &self.photo_db
  }

  pub(super) fn command_history(&self) -> &BTreeMap<String, String> {
    &self.command_history
  }

  /// Rewrites every `chk` from `from` to `to` using an externally computed
  /// translation table. Uids are preserved. Irreversible.
  pub fn map_hashes(
    &mut self,
    from: Algorithm,
    to: Algorithm,
    mapping: &HashMap<String, String>,
  ) -> Result<()> {
    if from != self.hash_algorithm {
      return Err(Error::Database(format!(
        "Catalog uses {}, not {from}.",
        self.hash_algorithm
      )));
    }

    // All or nothing: check the table covers the catalog before touching it.
    for photo in self.photo_db.values().flatten() {
      if !mapping.contains_key(&photo.chk) {
        return Err(Error::Database(format!(
          "No {to} digest provided for {}.",
          photo.chk
        )));
      }
    }

    for bucket in self.photo_db.values_mut() {
      for photo in bucket {
        photo.chk = mapping[&photo.chk].clone();
      }
    }
    self.hash_algorithm = to;
    self.rebuild_indexes()
  }

  //
  // Private.
  //

  /// First 8 bytes of `chk` as hex, extended a byte at a time while another
  /// bucket holds the prefix.
  fn allocate_uid(&self, chk: &str) -> String {
    let mut end = 16.min(chk.len());

    loop {
      let uid = &chk[..end];
      if !self.photo_db.contains_key(uid) {
        return uid.to_string();
      }
      if end == chk.len() {
        // Equal-length digests that differ always diverge within the full
        // prefix; only a uid equal to the entire digest lands here.
        log::warn!("{chk}: Digest exhausted during uid allocation.");
        let mut n = 1;
        while self.photo_db.contains_key(&format!("{chk}-{n}")) {
          n += 1;
        }
        return format!("{chk}-{n}");
      }
      end = (end + 2).min(chk.len());
    }
  }

  /// An alternate version shares its integer-second timestamp and its full
  /// basename (case-insensitive) with an existing variant.
  fn find_alternate(&self, photo: &PhotoFile) -> Option<String> {
    let uids = self.timestamp_to_uids.get(&photo.timestamp_secs())?;

    for uid in uids {
      let matched = self.photo_db[uid].iter().any(|p| {
        p.timestamp_secs() == photo.timestamp_secs()
          && p.file_name().eq_ignore_ascii_case(photo.file_name())
      });
      if matched {
        return Some(uid.clone());
      }
    }

    None
  }

  fn index_photo(&mut self, uid: &str, photo: &PhotoFile) {
    self.hash_to_uid.insert(photo.chk.clone(), uid.to_string());
    self
      .timestamp_to_uids
      .entry(photo.timestamp_secs())
      .or_default()
      .insert(uid.to_string());
    if photo.is_stored() {
      self.stored_paths.insert(photo.sto.clone());
    }
  }

  fn rebuild_indexes(&mut self) -> Result<()> {
    self.hash_to_uid.clear();
    self.timestamp_to_uids.clear();
    self.stored_paths.clear();

    for (uid, bucket) in &self.photo_db {
      if bucket.is_empty() {
        return Err(Error::Database(format!("{uid}: Empty variant list.")));
      }

      let mut stored_here = 0;
      for photo in bucket {
        if let Some(other) = self.hash_to_uid.get(&photo.chk) {
          if other != uid {
            return Err(Error::Database(format!(
              "Digest {} recorded under both {other} and {uid}.",
              photo.chk
            )));
          }
        } else {
          self.hash_to_uid.insert(photo.chk.clone(), uid.clone());
        }

        self
          .timestamp_to_uids
          .entry(photo.timestamp_secs())
          .or_default()
          .insert(uid.clone());

        if photo.is_stored() {
          stored_here += 1;
          if !self.stored_paths.insert(photo.sto.clone()) {
            return Err(Error::Database(format!(
              "Store path {} recorded more than once.",
              photo.sto
            )));
          }
        }
      }

      // Legal in catalogs migrated from older layouts; clean restores the
      // one-stored-variant invariant.
      if stored_here > 1 {
        log::warn!("{uid}: {stored_here} stored variants; run clean to drop superseded copies.");
      }
    }

    Ok(())
  }
}
