//! Working state of the pop-up dismissal loop.
//!
//! Each attempt observes the screen and picks exactly one action:
//! tap a detected close control, or fall back to the fixed cadence
//! (Back / FallbackTap / Wait).

use std::fmt;
use std::time::{Duration, Instant};

use crate::automation::config::ResolveConfig;
use crate::geometry::Point;

/// Corrective action chosen for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Tap a detected close control
    TapDismiss(Point),
    /// Android back key
    Back,
    /// Tap the fixed fallback coordinate
    FallbackTap(Point),
    /// Do nothing, only wait
    Wait,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::TapDismiss(p) => write!(f, "Tapping close control at {}", p),
            Action::Back => write!(f, "Pressing Android back"),
            Action::FallbackTap(p) => write!(f, "Tapping fallback point {}", p),
            Action::Wait => write!(f, "Waiting"),
        }
    }
}

/// Fallback action for a 0-based attempt index.
///
/// The first three attempts only wait so a slow app launch is not disturbed.
pub fn fallback_action(attempt: u32, fallback_tap: Point) -> Action {
    if attempt <= 2 {
        return Action::Wait;
    }
    match attempt % 4 {
        0 => Action::Back,
        2 => Action::FallbackTap(fallback_tap),
        _ => Action::Wait,
    }
}

/// Counters for one resolution run.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Attempts started so far
    pub attempts: u32,
    /// Close-control taps that reached the device
    pub taps: u32,
    pub started: Instant,
}

impl RetryState {
    pub fn new(started: Instant) -> Self {
        Self {
            attempts: 0,
            taps: 0,
            started,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Whether another close-control tap is allowed.
    pub fn can_tap(&self, config: &ResolveConfig) -> bool {
        match config.max_popup_clears {
            Some(cap) => self.taps < cap,
            None => true,
        }
    }

    /// Whether the attempt or time budget is used up.
    pub fn exhausted(&self, config: &ResolveConfig, now: Instant) -> bool {
        if self.attempts >= config.max_attempts {
            return true;
        }
        match config.time_budget() {
            Some(budget) => self.elapsed(now) >= budget,
            None => false,
        }
    }

    /// Progress string for log lines, e.g. "3/20".
    pub fn progress(&self, config: &ResolveConfig) -> String {
        format!("{}/{}", self.attempts, config.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_cadence() {
        let p = Point::new(270, 100);
        let actions: Vec<Action> = (0..10).map(|i| fallback_action(i, p)).collect();

        assert_eq!(
            actions,
            vec![
                Action::Wait,
                Action::Wait,
                Action::Wait,
                Action::Wait,
                Action::Back,
                Action::Wait,
                Action::FallbackTap(p),
                Action::Wait,
                Action::Back,
                Action::Wait,
            ]
        );
    }

    #[test]
    fn test_cadence_depends_only_on_index_mod_four() {
        let p = Point::new(1, 1);
        for i in 3..200 {
            assert_eq!(fallback_action(i, p), fallback_action(i + 4, p));
        }
    }

    #[test]
    fn test_tap_cap() {
        let config = ResolveConfig::default();
        let mut state = RetryState::new(Instant::now());
        assert!(state.can_tap(&config));
        state.taps = 2;
        assert!(!state.can_tap(&config));

        let uncapped = ResolveConfig {
            max_popup_clears: None,
            ..ResolveConfig::default()
        };
        state.taps = 1000;
        assert!(state.can_tap(&uncapped));
    }

    #[test]
    fn test_exhausted_by_attempts_and_time() {
        let start = Instant::now();
        let config = ResolveConfig {
            max_attempts: 3,
            dismiss_timeout_seconds: Some(10),
            ..ResolveConfig::default()
        };
        let mut state = RetryState::new(start);

        assert!(!state.exhausted(&config, start));
        assert!(state.exhausted(&config, start + Duration::from_secs(10)));
        state.attempts = 3;
        assert!(state.exhausted(&config, start));
        assert_eq!(state.progress(&config), "3/3");
    }

    #[test]
    fn test_action_display() {
        assert_eq!(
            Action::TapDismiss(Point::new(5, 6)).to_string(),
            "Tapping close control at 5,6"
        );
        assert_eq!(Action::Back.to_string(), "Pressing Android back");
    }
}
