// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Capture-time resolution: EXIF fields, file-name patterns, then filesystem
//! times, with the catalog's default time zone applied to naive values.

use std::{fs, path::Path, sync::LazyLock};

use chrono::{
  DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone,
};
use chrono_tz::Tz;
use regex::Regex;

use crate::{
  error::{Error, Result},
  exif::ExifRecord,
};

/// Catalog `dt` format, e.g. `2021:03:29 06:40:00-0400`.
pub const DT_FORMAT: &str = "%Y:%m:%d %H:%M:%S%z";

/// Date & time patterns embedded in file names, in match order. Each captures
/// year, month, day, hour, minute, second.
static FILE_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  [
    // 2021-03-29_06-40-00
    r"(\d{4})-(\d{2})-(\d{2})_(\d{2})-(\d{2})-(\d{2})",
    // 2021-03-29 06.40.00, Screen Shot 2021-03-29 at 06.40.00
    r"(\d{4})-(\d{2})-(\d{2})(?: at | )(\d{2})\.(\d{2})\.(\d{2})",
    // 20210329_064000, IMG_20210329_064000, VID_20210329_064000
    r"(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})(\d{2})",
  ]
  .iter()
  .map(|p| Regex::new(p).unwrap())
  .collect()
});

static EXIF_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(\d{4})[:-](\d{2})[:-](\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:\.\d+)?(?:([+-]\d{2}:?\d{2})|Z)?$",
  )
  .unwrap()
});

static OFFSET: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})$").unwrap());

/// The catalog's `timezone_default`: the offset applied to naive datetimes.
pub enum TimezoneDefault {
  /// The host's local offset at the datetime in question.
  Local,
  Fixed(FixedOffset),
  /// An IANA zone, resolved per-datetime (handles DST).
  Named(Tz),
}

impl TimezoneDefault {
  /// Parses `local`, a fixed offset (`-0400`, `+05:30`), or an IANA name.
  pub fn parse(value: &str) -> Result<Self> {
    if value == "local" {
      return Ok(Self::Local);
    }
    if let Some(offset) = parse_offset(value) {
      return Ok(Self::Fixed(offset));
    }
    value.parse::<Tz>().map(Self::Named).map_err(|_| {
      Error::Database(format!("Unrecognized timezone_default `{value}`."))
    })
  }

  /// The effective offset for a naive `date_time` under this default.
  pub fn offset_at(&self, date_time: &NaiveDateTime) -> FixedOffset {
    let utc = FixedOffset::east_opt(0).unwrap();
    match self {
      Self::Local => Local
        .from_local_datetime(date_time)
        .earliest()
        .map_or(utc, |d| *d.offset()),
      Self::Fixed(offset) => *offset,
      Self::Named(tz) => tz
        .offset_from_local_datetime(date_time)
        .earliest()
        .map_or(utc, |o| o.fix()),
    }
  }
}

/// A best-estimate capture time, ready to record on a `PhotoFile`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDateTime {
  pub date_time: DateTime<FixedOffset>,
  /// Offset (seconds east) applied to a naive source datetime. `None` when
  /// the source carried its own offset.
  pub tz_offset: Option<i32>,
}

impl ResolvedDateTime {
  pub fn dt_string(&self) -> String {
    self.date_time.format(DT_FORMAT).to_string()
  }

  pub fn timestamp(&self) -> f64 {
    self.date_time.timestamp() as f64
  }
}

/// Resolves the capture time for `path` from `record`, in priority order:
/// `DateTimeOriginal`, `CreateDate`, `ModifyDate`, a file-name pattern,
/// `FileModifyDate`, and finally the file's own modification time.
pub fn resolve_date_time(
  record: &ExifRecord,
  path: &Path,
  tz_default: &TimezoneDefault,
) -> Result<ResolvedDateTime> {
  for candidate in [
    &record.date_time_original,
    &record.create_date,
    &record.modify_date,
  ] {
    if let Some(value) = candidate {
      if let Some((naive, offset)) = parse_exif_date_time(value) {
        return Ok(promote(naive, offset, tz_default));
      }
    }
  }

  if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
    if let Some(naive) = date_time_from_file_name(name) {
      return Ok(promote(naive, None, tz_default));
    }
  }

  if let Some(value) = &record.file_modify_date {
    if let Some((naive, offset)) = parse_exif_date_time(value) {
      return Ok(promote(naive, offset, tz_default));
    }
  }

  let modified = fs::metadata(path)
    .and_then(|m| m.modified())
    .map_err(|e| Error::io(path, e))?;
  let local: DateTime<Local> = modified.into();
  Ok(ResolvedDateTime {
    date_time: local.fixed_offset(),
    tz_offset: None,
  })
}

/// Parses an EXIF-style datetime (`2021:03:29 06:40:00`, optionally with
/// subseconds and a `±HH:MM`/`±HHMM`/`Z` suffix). RFC 3339 separators are
/// also accepted.
pub fn parse_exif_date_time(value: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
  let caps = EXIF_DATE_TIME.captures(value.trim())?;

  let field = |i: usize| caps.get(i).unwrap().as_str().parse::<u32>().unwrap();
  let naive = NaiveDate::from_ymd_opt(field(1) as i32, field(2), field(3))?
    .and_hms_opt(field(4), field(5), field(6))?;

  let offset = match caps.get(7) {
    Some(m) => Some(parse_offset(m.as_str())?),
    None if value.trim_end().ends_with('Z') => Some(FixedOffset::east_opt(0).unwrap()),
    None => None,
  };

  Some((naive, offset))
}

/// Extracts a datetime embedded in a file name, if one matches a known
/// pattern.
pub fn date_time_from_file_name(name: &str) -> Option<NaiveDateTime> {
  for pattern in FILE_NAME_PATTERNS.iter() {
    if let Some(caps) = pattern.captures(name) {
      let field = |i: usize| caps.get(i).unwrap().as_str().parse::<u32>().unwrap();
      if let Some(naive) = NaiveDate::from_ymd_opt(field(1) as i32, field(2), field(3))
        .and_then(|d| d.and_hms_opt(field(4), field(5), field(6)))
      {
        return Some(naive);
      }
    }
  }

  None
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
  let caps = OFFSET.captures(value)?;

  let hours = caps.get(2).unwrap().as_str().parse::<i32>().unwrap();
  let minutes = caps.get(3).unwrap().as_str().parse::<i32>().unwrap();
  let mut seconds = hours * 3600 + minutes * 60;
  if caps.get(1).unwrap().as_str() == "-" {
    seconds = -seconds;
  }

  FixedOffset::east_opt(seconds)
}

fn promote(
  naive: NaiveDateTime,
  offset: Option<FixedOffset>,
  tz_default: &TimezoneDefault,
) -> ResolvedDateTime {
  match offset {
    Some(offset) => ResolvedDateTime {
      date_time: offset.from_local_datetime(&naive).unwrap(),
      tz_offset: None,
    },
    None => {
      let offset = tz_default.offset_at(&naive);
      ResolvedDateTime {
        date_time: offset.from_local_datetime(&naive).unwrap(),
        tz_offset: Some(offset.local_minus_utc()),
      }
    }
  }
}


#[cfg(test)]
mod test_date_time_from_file_name {
  use super::*;

  fn expected() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 3, 29)
      .and_then(|d| d.and_hms_opt(6, 40, 0))
      .unwrap()
  }

  #[test]
  fn matches_dashed_underscore_pattern() {
    assert_eq!(
      date_time_from_file_name("2021-03-29_06-40-00.jpg"),
      Some(expected())
    );
  }

  #[test]
  fn matches_dotted_time_pattern() {
    assert_eq!(
      date_time_from_file_name("photo 2021-03-29 06.40.00.jpg"),
      Some(expected())
    );
  }

  #[test]
  fn matches_screen_shot_pattern() {
    assert_eq!(
      date_time_from_file_name("Screen Shot 2021-03-29 at 06.40.00.png"),
      Some(expected())
    );
  }

  #[test]
  fn matches_compact_pattern() {
    assert_eq!(
      date_time_from_file_name("20210329_064000.jpg"),
      Some(expected())
    );
  }

  #[test]
  fn matches_img_and_vid_prefixes() {
    assert_eq!(
      date_time_from_file_name("IMG_20210329_064000.jpg"),
      Some(expected())
    );
    assert_eq!(
      date_time_from_file_name("VID_20210329_064000.mp4"),
      Some(expected())
    );
  }

  #[test]
  fn ignores_unrelated_names() {
    assert!(date_time_from_file_name("IMG_0001.JPG").is_none());
    assert!(date_time_from_file_name("vacation.jpg").is_none());
  }
}
