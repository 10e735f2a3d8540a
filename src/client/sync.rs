use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use super::state::ClientTimerState;

/// Cadences the scheduler runs at. Defaults mirror production: fast polls
/// keep the clock honest, the hard resync bounds drift accumulation even if
/// fast polls keep getting skipped.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub tick_interval: Duration,
    pub fast_poll_interval: Duration,
    pub hard_resync_interval: Duration,
    pub stale_after: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            fast_poll_interval: Duration::from_secs(30),
            hard_resync_interval: Duration::from_secs(120),
            stale_after: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff for transient network failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomized in either direction.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Deterministic backoff curve: base * 2^attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = base.as_secs_f64() * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
    }
}

/// Advisory connection health for the UI. Derived purely from sync recency
/// and the last call outcome; never consulted for correctness.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Stale,
    Error,
}

pub fn connection_status(
    state: &ClientTimerState,
    now_ms: i64,
    stale_after: Duration,
) -> ConnectionStatus {
    if state.last_sync_failed {
        return ConnectionStatus::Error;
    }
    match state.last_synced_ms {
        None => ConnectionStatus::Connecting,
        Some(synced_ms) => {
            if now_ms.saturating_sub(synced_ms) > stale_after.as_millis() as i64 {
                ConnectionStatus::Stale
            } else {
                ConnectionStatus::Connected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(31), Duration::from_secs(30));
    }

    #[test]
    fn jittered_backoff_stays_within_spread() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let delay = policy.jittered_backoff(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn classifies_connection_health() {
        let mut state = ClientTimerState::new();
        let stale_after = Duration::from_secs(120);

        assert_eq!(
            connection_status(&state, 0, stale_after),
            ConnectionStatus::Connecting
        );

        state.last_synced_ms = Some(0);
        assert_eq!(
            connection_status(&state, 60_000, stale_after),
            ConnectionStatus::Connected
        );
        assert_eq!(
            connection_status(&state, 121_000, stale_after),
            ConnectionStatus::Stale
        );

        state.note_sync_failure();
        assert_eq!(
            connection_status(&state, 60_000, stale_after),
            ConnectionStatus::Error
        );
    }
}
