// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Extra asserts to make tests shorter / more readable.

#[macro_export]
macro_rules! assert_source {
  ($dir:expr, [$($path:literal),* $(,)?]) => {{
    let actual = $dir.files_source();
    let expected = std::collections::HashSet::from([$($dir.get_path($path)),*]);

    assert!(
      actual == expected,
      "Source contents do not match:\nActual:   {actual:#?}\nExpected: {expected:#?}"
    );
  }}
}

#[macro_export]
macro_rules! assert_dest {
  ($dir:expr, [$($path:literal),* $(,)?]) => {{
    let actual = $dir.files_dest();
    let expected = std::collections::HashSet::from([$($dir.get_dest($path)),*]);

    assert!(
      actual == expected,
      "Destination contents do not match:\nActual:   {actual:#?}\nExpected: {expected:#?}"
    );
  }}
}

#[macro_export]
macro_rules! assert_err {
  ($res:expr, $msg:literal) => {{
    let Err(e) = $res else {
      panic!("Unexpected `Ok`.");
    };

    let message = e.to_string();
    assert!(
      message.contains($msg),
      "Error message did not contain expected substring.\nActual:\n{message}\nExpected:\n{}",
      $msg
    );
  }};
}

/// Builds an `ExifRecord` the way ExifTool's JSON would.
#[macro_export]
macro_rules! metadata {
  ($($key:literal: $value:literal),* $(,)?) => {
    serde_json::from_value::<$crate::exif::ExifRecord>(
      serde_json::json!({
        "SourceFile": "-",
        $(
          $key: $value,
        )*
      })
    ).unwrap()
  }
}

/// Builds a `PhotoFile` with placeholder fields, overridable per-key.
#[macro_export]
macro_rules! photo {
  ($($key:literal: $value:literal),* $(,)?) => {
    serde_json::from_value::<$crate::catalog::PhotoFile>(
      serde_json::json!({
        "chk": "-",
        "dt": "1970:01:01 00:00:00+0000",
        "fsz": 0,
        "prio": 10,
        "src": "-",
        "sto": "",
        "ts": 0.0,
        $(
          $key: $value,
        )*
      })
    ).unwrap()
  }
}
