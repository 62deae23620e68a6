//! Reconnect state machine shared by the position and candle WS managers
//! (spec §4.1): exponential backoff with full jitter, capped at 30s, and a
//! degraded flag once a connection has failed enough times in a row to be
//! worth surfacing on `/health`.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Connection lifecycle for one managed WS subscription set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Subscribing,
    Streaming,
    Reconnecting,
    Shutdown,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Init => "INIT",
            SessionState::Connecting => "CONNECTING",
            SessionState::Subscribing => "SUBSCRIBING",
            SessionState::Streaming => "STREAMING",
            SessionState::Reconnecting => "RECONNECTING",
            SessionState::Shutdown => "SHUTDOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Failure streak at which the manager reports itself degraded.
    pub degraded_after: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 30_000,
            multiplier: 2.0,
            degraded_after: 5,
        }
    }
}

/// Full-jitter exponential backoff (AWS-style: `random(0, min(max, base *
/// 2^attempt))`), distinct from the teacher's `±jitter_factor` variant
/// because the spec calls for full jitter, not bounded jitter.
struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    fn new(config: BackoffConfig, seed: u64) -> Self {
        Self {
            config,
            attempt: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let capped = (self.config.base_ms as f64 * self.config.multiplier.powi(self.attempt as i32))
            .min(self.config.max_ms as f64);
        let delay_ms = self.rng.gen::<f64>() * capped;
        self.attempt += 1;
        Duration::from_millis(delay_ms as u64)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Tracks reconnect state for one WS subscription manager. Cheap to share
/// behind an `Arc` for `/health` reporting; no lock is ever held across an
/// `.await`.
pub struct Session {
    state: Mutex<SessionState>,
    backoff: Mutex<Backoff>,
    consecutive_failures: Mutex<u32>,
    degraded_after: u32,
}

impl Session {
    pub fn new(config: BackoffConfig, seed: u64) -> Self {
        Self {
            state: Mutex::new(SessionState::Init),
            degraded_after: config.degraded_after,
            backoff: Mutex::new(Backoff::new(config, seed)),
            consecutive_failures: Mutex::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub fn on_connect_success(&self) {
        self.backoff.lock().reset();
        *self.consecutive_failures.lock() = 0;
        self.set_state(SessionState::Streaming);
    }

    /// Records a failed connect/stream attempt and returns how long to wait
    /// before retrying.
    pub fn on_failure(&self) -> Duration {
        *self.consecutive_failures.lock() += 1;
        self.set_state(SessionState::Reconnecting);
        self.backoff.lock().next_delay()
    }

    pub fn is_degraded(&self) -> bool {
        *self.consecutive_failures.lock() >= self.degraded_after
    }

    pub fn consecutive_failures(&self) -> u32 {
        *self.consecutive_failures.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        let mut backoff = Backoff::new(BackoffConfig::default(), 42);
        for _ in 0..30 {
            let d = backoff.next_delay();
            assert!(d.as_millis() as u64 <= 30_000);
        }
    }

    #[test]
    fn degraded_after_threshold() {
        let session = Session::new(
            BackoffConfig {
                degraded_after: 3,
                ..Default::default()
            },
            1,
        );
        assert!(!session.is_degraded());
        session.on_failure();
        session.on_failure();
        assert!(!session.is_degraded());
        session.on_failure();
        assert!(session.is_degraded());
    }

    #[test]
    fn success_resets_failure_streak() {
        let session = Session::new(BackoffConfig::default(), 7);
        session.on_failure();
        session.on_failure();
        session.on_connect_success();
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.state(), SessionState::Streaming);
    }
}
