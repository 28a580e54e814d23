//! Progress throttling policy
//!
//! A [`ProgressThrottle`] decides whether a new progress sample for a key is
//! worth forwarding. A sample passes when any of the following holds:
//!
//! 1. no sample has been emitted for the key yet,
//! 2. the sample signals completion (`>= 1.0`),
//! 3. the key's minimum interval has elapsed since the last emission,
//! 4. the sample differs from the last emitted value by at least the
//!    significant delta (0.05 by default).
//!
//! The throttle performs no I/O and keeps no clock of its own; callers that
//! need deterministic behavior pass `now` explicitly.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Tolerance absorbing binary rounding when comparing progress deltas
const DELTA_EPSILON: f64 = 1e-9;

/// Last emission recorded for one key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleState {
    /// When the last accepted sample was emitted
    pub last_emitted_at: Instant,
    /// Value of the last accepted sample
    pub last_emitted_progress: f64,
}

/// Per-key progress throttle
#[derive(Debug)]
pub struct ProgressThrottle<K> {
    states: HashMap<K, ThrottleState>,
    significant_delta: f64,
}

impl<K: Eq + Hash> ProgressThrottle<K> {
    /// Progress jump that bypasses the time gate unless configured otherwise
    pub const DEFAULT_SIGNIFICANT_DELTA: f64 = 0.05;

    /// Creates a throttle with the default significant delta
    pub fn new() -> Self {
        Self::with_significant_delta(Self::DEFAULT_SIGNIFICANT_DELTA)
    }

    /// Creates a throttle with a custom significant delta
    pub fn with_significant_delta(significant_delta: f64) -> Self {
        Self {
            states: HashMap::new(),
            significant_delta,
        }
    }

    /// Decides whether `progress` should be emitted for `key` now
    pub fn should_emit(&mut self, key: K, progress: f64, min_interval: Duration) -> bool {
        self.should_emit_at(key, progress, min_interval, Instant::now())
    }

    /// Decides whether `progress` should be emitted for `key` at `now`
    ///
    /// Accepted samples update the stored state; rejected samples leave it
    /// untouched. NaN is always rejected.
    pub fn should_emit_at(
        &mut self,
        key: K,
        progress: f64,
        min_interval: Duration,
        now: Instant,
    ) -> bool {
        if progress.is_nan() {
            return false;
        }

        let emit = match self.states.get(&key) {
            None => true,
            Some(_) if progress >= 1.0 => true,
            Some(state) => {
                let elapsed = now.saturating_duration_since(state.last_emitted_at);
                let delta = (progress - state.last_emitted_progress).abs();
                elapsed >= min_interval || delta + DELTA_EPSILON >= self.significant_delta
            }
        };

        if emit {
            self.record_at(key, progress, now);
        }
        emit
    }

    /// Stores `progress` as the last emission for `key` without deciding
    pub fn record_at(&mut self, key: K, progress: f64, now: Instant) {
        self.states.insert(
            key,
            ThrottleState {
                last_emitted_at: now,
                last_emitted_progress: progress,
            },
        );
    }

    /// Clears the stored state for `key`
    ///
    /// Returns true if state existed. The next sample for the key is treated
    /// as a first sample.
    pub fn reset<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.states.remove(key).is_some()
    }

    /// Drops every key for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.states.retain(|key, _| keep(key));
    }

    /// Last recorded state for `key`
    pub fn state<Q>(&self, key: &Q) -> Option<&ThrottleState>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.states.get(key)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no key is tracked
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drops all state
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

impl<K: Eq + Hash> Default for ProgressThrottle<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_SECOND: Duration = Duration::from_millis(500);

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_first_sample_always_emits() {
        let mut throttle = ProgressThrottle::new();
        assert!(throttle.should_emit_at("a", 0.01, HALF_SECOND, Instant::now()));
        assert_eq!(throttle.len(), 1);
    }

    #[test]
    fn test_scenario_small_step_suppressed_large_step_passes() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("f", 0.1, HALF_SECOND, at(t0, 0)));
        assert!(!throttle.should_emit_at("f", 0.12, HALF_SECOND, at(t0, 100)));
        assert!(throttle.should_emit_at("f", 0.9, HALF_SECOND, at(t0, 200)));

        let state = throttle.state("f").unwrap();
        assert_eq!(state.last_emitted_at, at(t0, 200));
        assert!((state.last_emitted_progress - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completion_always_emits() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("f", 0.99, HALF_SECOND, t0));
        // 1ms later, delta 0.01: only completion lets it through
        assert!(throttle.should_emit_at("f", 1.0, HALF_SECOND, at(t0, 1)));
        assert!(throttle.should_emit_at("f", 1.0, HALF_SECOND, at(t0, 2)));
    }

    #[test]
    fn test_interval_elapsed_emits_small_step() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("f", 0.10, HALF_SECOND, t0));
        assert!(!throttle.should_emit_at("f", 0.11, HALF_SECOND, at(t0, 499)));
        assert!(throttle.should_emit_at("f", 0.11, HALF_SECOND, at(t0, 500)));
    }

    #[test]
    fn test_rejected_sample_does_not_move_baseline() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("f", 0.10, HALF_SECOND, t0));
        assert!(!throttle.should_emit_at("f", 0.13, HALF_SECOND, at(t0, 10)));
        // Delta is measured from the last *emitted* value (0.10), not 0.13
        assert!(throttle.should_emit_at("f", 0.15, HALF_SECOND, at(t0, 20)));
    }

    #[test]
    fn test_exact_significant_delta_passes() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("f", 0.10, HALF_SECOND, t0));
        assert!(throttle.should_emit_at("f", 0.15, HALF_SECOND, at(t0, 1)));
    }

    #[test]
    fn test_emissions_respect_interval_or_delta() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        let mut last: Option<(u64, f64)> = None;

        for step in 0..200u64 {
            let progress = (step as f64) * 0.004;
            let now_ms = step * 7;
            if throttle.should_emit_at("f", progress, HALF_SECOND, at(t0, now_ms)) {
                if let Some((prev_ms, prev_progress)) = last {
                    let close = now_ms - prev_ms < 500;
                    let small = (progress - prev_progress).abs() + DELTA_EPSILON < 0.05;
                    assert!(
                        !(close && small) || progress >= 1.0,
                        "emission at {now_ms}ms too close to {prev_ms}ms"
                    );
                }
                last = Some((now_ms, progress));
            }
        }
    }

    #[test]
    fn test_reset_makes_next_sample_first() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("f", 0.5, HALF_SECOND, t0));
        assert!(throttle.reset("f"));
        assert!(!throttle.reset("f"));
        assert!(throttle.should_emit_at("f", 0.0, HALF_SECOND, at(t0, 1)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();

        assert!(throttle.should_emit_at("a", 0.10, HALF_SECOND, t0));
        assert!(throttle.should_emit_at("b", 0.11, HALF_SECOND, t0));
        assert!(!throttle.should_emit_at("a", 0.11, HALF_SECOND, at(t0, 1)));
    }

    #[test]
    fn test_nan_never_emits() {
        let mut throttle: ProgressThrottle<&str> = ProgressThrottle::new();
        assert!(!throttle.should_emit_at("f", f64::NAN, HALF_SECOND, Instant::now()));
        assert!(throttle.is_empty());
    }

    #[test]
    fn test_custom_delta_and_retain() {
        let mut throttle = ProgressThrottle::with_significant_delta(0.5);
        let t0 = Instant::now();

        assert!(throttle.should_emit_at(1u32, 0.1, HALF_SECOND, t0));
        assert!(!throttle.should_emit_at(1u32, 0.3, HALF_SECOND, at(t0, 1)));
        assert!(throttle.should_emit_at(2u32, 0.1, HALF_SECOND, t0));

        throttle.retain(|k| *k == 2);
        assert!(throttle.state(&1).is_none());
        assert!(throttle.state(&2).is_some());

        throttle.clear();
        assert!(throttle.is_empty());
    }
}
