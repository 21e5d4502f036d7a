use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Politeness gate shared by the walker and the enricher.
///
/// Callers take turns: each turn is spaced at least `min_interval` after the
/// previous one, and nothing runs before a cooldown set with
/// [`RateLimitPolicy::cool_down`] has expired.
#[derive(Debug)]
pub struct RateLimitPolicy {
    min_interval: Duration,
    state: Mutex<PolicyState>,
}

#[derive(Debug, Default)]
struct PolicyState {
    not_before: Option<Instant>,
    last_turn: Option<Instant>,
}

impl PolicyState {
    /// Wait needed before the next turn at `now`; reserves that turn.
    fn needed_wait(&mut self, min_interval: Duration, now: Instant) -> Duration {
        let mut ready = now;
        if let Some(last) = self.last_turn {
            ready = ready.max(last + min_interval);
        }
        if let Some(nb) = self.not_before {
            ready = ready.max(nb);
        }
        // Reserve the slot so concurrent callers queue up behind it.
        self.last_turn = Some(ready);
        ready.saturating_duration_since(now)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl RateLimitPolicy {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(PolicyState::default()),
        }
    }

    /// Hold off every caller for `pause` from now, e.g. after the site
    /// answered 429.
    pub fn cool_down(&self, pause: Duration) {
        let until = Instant::now() + pause;
        let mut st = self.lock();
        st.not_before = Some(st.not_before.map_or(until, |nb| nb.max(until)));
    }

    fn reserve(&self) -> Duration {
        let now = Instant::now();
        self.lock().needed_wait(self.min_interval, now)
    }

    /// Sleep until it is this caller's turn.
    pub async fn wait_turn(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tracing::debug!(target: "harvest.rate", wait_ms = wait.as_millis() as u64, "rate.wait");
            sleep(wait).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PolicyState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn turns_are_spaced_by_min_interval() {
        let policy = RateLimitPolicy::new(Duration::from_secs(1));
        assert_eq!(policy.reserve(), Duration::ZERO);
        assert_eq!(policy.reserve(), Duration::from_secs(1));
        assert_eq!(policy.reserve(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_turn_sleeps_for_the_reserved_slot() {
        let policy = RateLimitPolicy::new(Duration::from_millis(500));
        let start = Instant::now();
        policy.wait_turn().await;
        policy.wait_turn().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_delays_even_unlimited_policies() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.reserve(), Duration::ZERO);
        policy.cool_down(Duration::from_secs(30));
        assert_eq!(policy.reserve(), Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(policy.reserve(), Duration::ZERO);
    }
}
