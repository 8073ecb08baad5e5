//! Snapshot testing helpers shared by the workspace crates.
//!
//! Snapshots are short when the value is small and pretty-printed otherwise,
//! so that inline `expect![[...]]` literals stay readable in the source.

pub mod debug;
pub mod json;

use expect_test::Expect;

/// Approximate number of characters that can fit on a single screen
const COMMON_SCREEN_CHARS_WIDTH: usize = 60;

#[derive(Clone, Copy)]
enum Style {
    Terse,
    Verbose,
}

trait SnapshotFormat<T: ?Sized> {
    fn make_snapshot_imp(style: Style, actual: &T) -> String;

    fn make_snapshot(actual: &T) -> String {
        let terse = Self::make_snapshot_imp(Style::Terse, actual);

        let Some(width) = terse.lines().map(|line| line.chars().count()).max() else {
            return terse;
        };

        if width >= COMMON_SCREEN_CHARS_WIDTH {
            return Self::make_snapshot_imp(Style::Verbose, actual);
        }

        terse
    }

    #[track_caller]
    fn assert_eq(actual: &T, expected: &Expect) {
        expected.assert_eq(&Self::make_snapshot(actual));
    }
}
