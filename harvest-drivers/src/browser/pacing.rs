use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
/// Produces jittered pauses so page scripts get time to settle after
/// navigation and clicks.
pub struct Pacing {
    settle: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000))
    }
}

impl Pacing {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Sleep for a random duration between `min` and `max` milliseconds.
    pub async fn random_delay(&self, min: u64, max: u64) {
        let ms = if max > min {
            OsRng.gen_range(min..=max)
        } else {
            min
        };
        sleep(Duration::from_millis(ms)).await;
    }

    /// Sleep for the configured settle time, +/- 20%.
    pub async fn settle(&self) {
        let (min, max) = jitter_bounds(self.settle);
        self.random_delay(min, max).await;
    }
}

fn jitter_bounds(base: Duration) -> (u64, u64) {
    let ms = base.as_millis() as u64;
    let spread = ms / 5;
    (ms - spread, ms + spread)
}
