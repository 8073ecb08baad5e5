use super::{SnapshotFormat, Style};
use expect_test::Expect;
use std::fmt;

struct Imp;

impl<T: fmt::Debug> SnapshotFormat<T> for Imp {
    fn make_snapshot_imp(style: Style, actual: &T) -> String {
        match style {
            Style::Terse => format!("{actual:?}"),
            Style::Verbose => format!("{actual:#?}"),
        }
    }
}

/// Asserts that the [`fmt::Debug`] representation of `actual` matches the
/// snapshot. Long values are pretty-printed.
#[track_caller]
pub fn assert_eq<T: fmt::Debug>(actual: T, expected: &Expect) {
    Imp::assert_eq(&actual, expected)
}
