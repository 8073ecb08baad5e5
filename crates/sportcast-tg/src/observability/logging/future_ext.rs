use async_trait::async_trait;
use easy_ext::ext;
use futures::prelude::*;
use std::time::{Duration, Instant};

#[ext(FutureExt)]
#[async_trait]
pub(crate) impl<F> F
where
    F: Future + Send,
{
    /// Measures the time it took for the future to complete
    async fn with_duration(self) -> (F::Output, Duration) {
        let start = Instant::now();
        let output = self.await;
        (output, start.elapsed())
    }
}
