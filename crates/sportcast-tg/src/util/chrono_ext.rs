use chrono::prelude::*;
use easy_ext::ext;
use std::time::Duration;

pub(crate) mod prelude {
    pub(crate) use super::DateTimeExt as _;
}

#[ext(DateTimeExt)]
pub(crate) impl DateTime<Utc> {
    /// Time passed since `self` till `now`. Timestamps from the future
    /// (clock skew between the app and the database) count as zero.
    fn elapsed_until(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(*self)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn saturating_sub_std(self, duration: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|duration| self.checked_sub_signed(duration))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
