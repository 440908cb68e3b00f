// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! The cleaner: removes superseded stored variants once the retained copy is
//! verified against disk.

use std::{fs, io::ErrorKind, path::Path};

use crate::{
  catalog::Catalog,
  error::Error,
  gbl::CancelFlag,
  hash,
};

#[derive(Default)]
pub struct CleanReport {
  pub removed: usize,

  /// Store paths removed, or planned for removal under dry run.
  pub planned: Vec<String>,

  pub errors: Vec<Error>,
}

/// For every uid holding more than one stored variant (legacy or migrated
/// layouts), keeps the best one and removes the rest, clearing their `sto`.
/// Nothing is touched for a uid whose retained copy does not verify. Dry run
/// logs the same plan without filesystem or catalog changes.
pub fn clean(
  catalog: &mut Catalog,
  destination: &Path,
  dry_run: bool,
  cancel: &CancelFlag,
) -> CleanReport {
  let algorithm = catalog.algorithm();
  let mut report = CleanReport::default();

  for uid in catalog.uids() {
    if cancel.is_set() {
      log::warn!("Cancelled; cleaning stopped.");
      break;
    }

    let stored: Vec<usize> = catalog
      .best_order(&uid)
      .into_iter()
      .filter(|&i| catalog.get(&uid).unwrap()[i].is_stored())
      .collect();
    if stored.len() <= 1 {
      continue;
    }

    // The retained copy must verify before any peer is deleted.
    let keep = catalog.get(&uid).unwrap()[stored[0]].clone();
    let keep_path = destination.join(&keep.sto);
    match hash::hash_file(&keep_path, algorithm) {
      Ok(digest) if digest == keep.chk => {}
      Ok(_) => {
        log::warn!("{uid}: Retained copy {} does not verify. Skipping.", keep.sto);
        report.errors.push(Error::VerificationMismatch { path: keep_path });
        continue;
      }
      Err(e) => {
        log::warn!("{uid}: Cannot verify retained copy {} ({e}). Skipping.", keep.sto);
        report.errors.push(e);
        continue;
      }
    }

    for &index in &stored[1..] {
      let sto = catalog.get(&uid).unwrap()[index].sto.clone();
      let full = destination.join(&sto);

      if dry_run {
        log::info!("{sto}: Would remove superseded copy (dry run).");
        report.planned.push(sto);
        continue;
      }

      match fs::remove_file(&full) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
          log::warn!("{sto}: Already absent; clearing store record.");
        }
        Err(e) => {
          report.errors.push(Error::io(&full, e));
          continue;
        }
      }

      catalog.clear_stored(&uid, index);
      report.removed += 1;
      log::info!("{sto}: Removed superseded copy.");
      report.planned.push(sto);
    }
  }

  log::info!(
    "Cleaned {} superseded copies, {} errors.",
    report.removed,
    report.errors.len()
  );

  report
}

#[cfg(test)]
mod test_clean {
  use super::*;
  use crate::{hash::Algorithm, testing::*};

  /// A migrated catalog: one photo, two variants, both stored on disk.
  fn migrated(d: &TestDir) -> Catalog {
    std::fs::create_dir_all(d.get_dest("2021/03-Mar")).unwrap();
    std::fs::create_dir_all(d.get_dest("legacy")).unwrap();
    std::fs::write(d.get_dest("2021/03-Mar/primary.nef"), b"raw bytes").unwrap();
    std::fs::write(d.get_dest("legacy/extra.jpg"), b"jpeg bytes").unwrap();

    let chk_nef =
      hash::hash_file(d.get_dest("2021/03-Mar/primary.nef"), Algorithm::Blake2b256).unwrap();
    let chk_jpg = hash::hash_file(d.get_dest("legacy/extra.jpg"), Algorithm::Blake2b256).unwrap();

    let mut c = Catalog::new(Algorithm::Blake2b256, "+0000".to_string());
    let mut nef = photo!("src": "/card/shot.nef", "ts": 1617000000.0, "prio": 10);
    nef.chk = chk_nef;
    let mut jpg = photo!("src": "/phone/SHOT.NEF", "ts": 1617000000.0, "prio": 30);
    jpg.chk = chk_jpg;
    c.add(nef);
    c.add(jpg);
    assert_eq!(c.num_photos(), 1);

    let uid = c.uids().remove(0);
    let order = c.best_order(&uid);
    c.set_stored(&uid, order[0], "2021/03-Mar/primary.nef".to_string())
      .unwrap();
    c.set_stored(&uid, order[1], "legacy/extra.jpg".to_string())
      .unwrap();
    c
  }

  #[test]
  fn removes_superseded_copy_and_clears_sto() {
    let d = test_dir!();
    let mut c = migrated(&d);

    let report = clean(&mut c, d.dest(), false, &CancelFlag::new());

    assert_eq!(report.removed, 1);
    assert!(report.errors.is_empty());
    assert_dest!(d, ["2021/03-Mar/primary.nef"]);
    // One stored variant remains.
    assert_eq!(c.stored_photos().count(), 1);
    let (_, stored) = c.stored_photos().next().unwrap();
    assert_eq!(stored.sto, "2021/03-Mar/primary.nef");
  }

  #[test]
  fn dry_run_logs_plan_and_touches_nothing() {
    let d = test_dir!();
    let mut c = migrated(&d);

    let report = clean(&mut c, d.dest(), true, &CancelFlag::new());

    assert_eq!(report.removed, 0);
    assert_eq!(report.planned, vec!["legacy/extra.jpg".to_string()]);
    assert!(d.get_dest("legacy/extra.jpg").is_file());
    assert_eq!(c.stored_photos().count(), 2);
  }

  #[test]
  fn refuses_when_retained_copy_does_not_verify() {
    let d = test_dir!();
    let mut c = migrated(&d);
    std::fs::write(d.get_dest("2021/03-Mar/primary.nef"), b"rot bytes").unwrap();

    let report = clean(&mut c, d.dest(), false, &CancelFlag::new());

    assert_eq!(report.removed, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], Error::VerificationMismatch { .. }));
    assert!(d.get_dest("legacy/extra.jpg").is_file());
    assert_eq!(c.stored_photos().count(), 2);
  }

  #[test]
  fn refuses_when_retained_copy_is_missing() {
    let d = test_dir!();
    let mut c = migrated(&d);
    std::fs::remove_file(d.get_dest("2021/03-Mar/primary.nef")).unwrap();

    let report = clean(&mut c, d.dest(), false, &CancelFlag::new());

    assert_eq!(report.removed, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(d.get_dest("legacy/extra.jpg").is_file());
  }

  #[test]
  fn leaves_singly_stored_photos_alone() {
    let d = test_dir!();
    std::fs::write(d.get_dest("only.jpg"), b"jpeg bytes").unwrap();

    let mut c = Catalog::new(Algorithm::Blake2b256, "+0000".to_string());
    let mut photo = photo!("src": "/a/only.jpg");
    photo.chk = hash::hash_file(d.get_dest("only.jpg"), Algorithm::Blake2b256).unwrap();
    c.add(photo);
    let uid = c.uids().remove(0);
    c.set_stored(&uid, 0, "only.jpg".to_string()).unwrap();

    let report = clean(&mut c, d.dest(), false, &CancelFlag::new());

    assert_eq!(report.removed, 0);
    assert!(report.errors.is_empty());
    assert!(d.get_dest("only.jpg").is_file());
  }

  #[test]
  fn clears_record_for_already_absent_file() {
    let d = test_dir!();
    let mut c = migrated(&d);
    std::fs::remove_file(d.get_dest("legacy/extra.jpg")).unwrap();

    let report = clean(&mut c, d.dest(), false, &CancelFlag::new());

    assert_eq!(report.removed, 1);
    assert_eq!(c.stored_photos().count(), 1);
  }
}
