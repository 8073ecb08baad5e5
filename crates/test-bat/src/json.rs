use super::{SnapshotFormat, Style};
use expect_test::Expect;
use serde::Serialize;

struct Imp;

impl<T: Serialize> SnapshotFormat<T> for Imp {
    fn make_snapshot_imp(style: Style, actual: &T) -> String {
        let result = match style {
            Style::Terse => serde_json::to_string(actual),
            Style::Verbose => serde_json::to_string_pretty(actual),
        };
        result.unwrap_or_else(|err| format!("<unserializable: {err}>"))
    }
}

/// Asserts that the JSON representation of `actual` matches the snapshot.
#[track_caller]
pub fn assert_eq<T: Serialize>(actual: T, expected: &Expect) {
    Imp::assert_eq(&actual, expected)
}
