//! Pop-up dismissal loop: drives the device from an arbitrary post-launch
//! screen to the one showing the target UI.
//!
//! The loop is attempt-bounded with a capped number of close-control taps.
//! An optional wall-clock budget, an uncapped tap mode and an immediate
//! re-check after each tap are configuration switches on the same loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::automation::clock::{Clock, SystemClock};
use crate::automation::config::ResolveConfig;
use crate::automation::state::{Action, RetryState, fallback_action};
use crate::capture::{Screenshot, capture_screenshot, screenshot_file_name};
use crate::device::{DeviceController, DeviceError};
use crate::vision::{Detection, ScreenOracle};

/// Result of one resolution run.
#[derive(Debug)]
pub struct ResolveOutcome {
    /// Target UI was observed
    pub success: bool,
    /// Frame the target was seen on, or the last frame captured.
    /// None only if every capture failed.
    pub screenshot: Option<Screenshot>,
    /// The target detection (NotFound on failure)
    pub target: Detection,
    pub attempts: u32,
    pub taps: u32,
    pub elapsed: Duration,
}

/// Resolves with the system clock and without saving frames.
pub fn resolve(
    device: &mut dyn DeviceController,
    oracle: &dyn ScreenOracle,
    config: &ResolveConfig,
) -> ResolveOutcome {
    Resolver::new(config, &SystemClock).resolve(device, oracle)
}

pub struct Resolver<'a> {
    config: &'a ResolveConfig,
    clock: &'a dyn Clock,
    /// Instance index and directory for persisted frames
    save: Option<(u32, PathBuf)>,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a ResolveConfig, clock: &'a dyn Clock) -> Self {
        Self {
            config,
            clock,
            save: None,
        }
    }

    /// Saves every inspected frame as `memu-<index>-check-start-<n>-<stamp>.png`.
    pub fn save_screenshots(mut self, index: u32, dir: &Path) -> Self {
        self.save = Some((index, dir.to_path_buf()));
        self
    }

    pub fn resolve(
        &self,
        device: &mut dyn DeviceController,
        oracle: &dyn ScreenOracle,
    ) -> ResolveOutcome {
        let config = self.config;
        let mut state = RetryState::new(self.clock.now());
        let mut last: Option<Screenshot> = None;

        while !state.exhausted(config, self.clock.now()) {
            let attempt = state.attempts;
            state.attempts += 1;

            let shot = match self.capture(device, &format!("check-start-{}", attempt)) {
                Ok(shot) => shot,
                Err(e) => {
                    warn!("Attempt {}: capture failed: {}", state.progress(config), e);
                    self.clock.sleep(config.retry_delay());
                    continue;
                }
            };

            let target = oracle.detect_target(&shot.image);
            if target.is_found() {
                info!("Attempt {}: target {}", state.progress(config), target);
                return self.finish(true, Some(shot), target, &state);
            }

            let control = oracle.detect_dismiss_control(&shot.image);
            last = Some(shot);

            if let Some(location) = control.location() {
                if state.can_tap(config) {
                    let action = Action::TapDismiss(location);
                    info!("Attempt {}: close control {}. {}", state.progress(config), control, action);
                    self.perform(device, action);
                    state.taps += 1;
                    self.clock.sleep(config.settle_delay());

                    if config.recheck_after_tap {
                        match self.capture(device, &format!("after-tap-{}", state.taps)) {
                            Ok(shot) => {
                                let target = oracle.detect_target(&shot.image);
                                if target.is_found() {
                                    info!("Target {} right after close tap", target);
                                    return self.finish(true, Some(shot), target, &state);
                                }
                                last = Some(shot);
                            }
                            Err(e) => warn!("Re-check capture failed: {}", e),
                        }
                    }
                    continue;
                }
                warn!(
                    "Attempt {}: close control still visible after {} taps, treating as stuck",
                    state.progress(config),
                    state.taps
                );
            } else {
                info!("Attempt {}: no close control found", state.progress(config));
            }

            let action = fallback_action(attempt, config.fallback_tap);
            if action != Action::Wait {
                info!("Stuck? {}", action);
                self.perform(device, action);
            }
            self.clock.sleep(config.retry_delay());
        }

        warn!(
            "Target not reached after {} attempts ({} close taps, {:.1}s)",
            state.attempts,
            state.taps,
            state.elapsed(self.clock.now()).as_secs_f32()
        );
        self.finish(false, last, Detection::NotFound, &state)
    }

    fn capture(
        &self,
        device: &mut dyn DeviceController,
        suffix: &str,
    ) -> Result<Screenshot, DeviceError> {
        let path = self
            .save
            .as_ref()
            .map(|(index, dir)| dir.join(screenshot_file_name(*index, suffix)));
        capture_screenshot(device, path.as_deref())
    }

    /// Sends an action to the device. Failures are logged and ignored.
    fn perform(&self, device: &mut dyn DeviceController, action: Action) {
        let result = match action {
            Action::TapDismiss(p) | Action::FallbackTap(p) => device.tap(p.x, p.y),
            Action::Back => device.back(),
            Action::Wait => Ok(()),
        };
        match result {
            Ok(()) => debug!("{} done", action),
            Err(e) => warn!("{} failed: {}", action, e),
        }
    }

    fn finish(
        &self,
        success: bool,
        screenshot: Option<Screenshot>,
        target: Detection,
        state: &RetryState,
    ) -> ResolveOutcome {
        ResolveOutcome {
            success,
            screenshot,
            target,
            attempts: state.attempts,
            taps: state.taps,
            elapsed: state.elapsed(self.clock.now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::clock::fake::FakeClock;
    use crate::geometry::Point;
    use crate::vision::detection::DetectionMethod;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::collections::HashSet;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Capture(u8),
        Tap(i32, i32),
        Back,
    }

    /// Device whose n-th frame carries `n` in the red channel.
    #[derive(Default)]
    struct ScriptedDevice {
        captures: u8,
        fail_captures: HashSet<u8>,
        fail_input: bool,
        events: Vec<Event>,
    }

    impl ScriptedDevice {
        fn taps(&self) -> Vec<Point> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Tap(x, y) => Some(Point::new(*x, *y)),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, event: &Event) -> usize {
            self.events.iter().filter(|e| *e == event).count()
        }
    }

    impl DeviceController for ScriptedDevice {
        fn capture_screenshot(&mut self) -> Result<Vec<u8>, DeviceError> {
            let n = self.captures;
            self.captures += 1;
            self.events.push(Event::Capture(n));
            if self.fail_captures.contains(&n) {
                return Err(DeviceError::Screenshot("device offline".to_string()));
            }
            let img = RgbaImage::from_pixel(4, 4, Rgba([n, 0, 0, 255]));
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .unwrap();
            Ok(bytes)
        }

        fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
            self.events.push(Event::Tap(x, y));
            if self.fail_input {
                return Err(DeviceError::Screenshot("tap dropped".to_string()));
            }
            Ok(())
        }

        fn back(&mut self) -> Result<(), DeviceError> {
            self.events.push(Event::Back);
            Ok(())
        }
    }

    /// Answers by frame number.
    #[derive(Default)]
    struct ScriptedOracle {
        target_on: HashSet<u8>,
        control_on: HashSet<u8>,
        control_always: bool,
    }

    const CONTROL: Point = Point { x: 500, y: 40 };

    fn frame_number(img: &RgbaImage) -> u8 {
        img.get_pixel(0, 0)[0]
    }

    impl ScreenOracle for ScriptedOracle {
        fn detect_target(&self, img: &RgbaImage) -> Detection {
            if self.target_on.contains(&frame_number(img)) {
                Detection::found(Point::new(100, 900), 91.0, DetectionMethod::Template)
            } else {
                Detection::NotFound
            }
        }

        fn detect_dismiss_control(&self, img: &RgbaImage) -> Detection {
            let n = frame_number(img);
            if self.control_always || self.control_on.contains(&n) {
                // Shift by frame number so taps are distinguishable
                Detection::found(
                    Point::new(CONTROL.x, CONTROL.y + n as i32),
                    90.0,
                    DetectionMethod::Phrase {
                        phrase: "X".to_string(),
                    },
                )
            } else {
                Detection::NotFound
            }
        }
    }

    fn set(items: &[u8]) -> HashSet<u8> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_target_on_first_frame() {
        let config = ResolveConfig::default();
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();
        let oracle = ScriptedOracle {
            target_on: set(&[0]),
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &oracle);

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.taps, 0);
        assert_eq!(outcome.target.location(), Some(Point::new(100, 900)));
        assert_eq!(device.events, vec![Event::Capture(0)]);
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_capped_taps_then_fallback_cadence() {
        // Control on attempts 1, 3 and 5, cap 2, target never shows
        let config = ResolveConfig::default();
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();
        let oracle = ScriptedOracle {
            control_on: set(&[1, 3, 5]),
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &oracle);

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 20);
        assert_eq!(outcome.taps, 2);
        assert_eq!(outcome.target, Detection::NotFound);
        let last = outcome.screenshot.expect("last frame");
        assert_eq!(frame_number(&last.image), 19);

        let fallback = config.fallback_tap;
        assert_eq!(
            device.taps(),
            vec![
                Point::new(500, 41),
                Point::new(500, 43),
                fallback, // attempt 6
                fallback, // 10
                fallback, // 14
                fallback, // 18
            ]
        );
        // Attempts 4, 8, 12, 16
        assert_eq!(device.count(&Event::Back), 4);
        // Attempt 5 is wait-only: back at 4, next capture, then nothing until 6
        let after_five = device
            .events
            .iter()
            .skip_while(|e| **e != Event::Capture(5))
            .nth(1)
            .cloned();
        assert_eq!(after_five, Some(Event::Capture(6)));

        let sleeps = clock.sleeps.borrow();
        assert_eq!(sleeps.iter().filter(|d| **d == config.settle_delay()).count(), 2);
        assert_eq!(sleeps.iter().filter(|d| **d == config.retry_delay()).count(), 18);
    }

    #[test]
    fn test_tap_cap_never_exceeded() {
        let config = ResolveConfig {
            max_popup_clears: Some(3),
            ..ResolveConfig::default()
        };
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();
        let oracle = ScriptedOracle {
            control_always: true,
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &oracle);

        assert_eq!(outcome.taps, 3);
        let close_taps = device.taps().iter().filter(|p| p.x == CONTROL.x).count();
        assert_eq!(close_taps, 3);
        assert_eq!(outcome.attempts, config.max_attempts);
        assert!(device.count(&Event::Back) > 0);
    }

    #[test]
    fn test_fallback_cadence_without_controls() {
        let config = ResolveConfig {
            max_attempts: 9,
            ..ResolveConfig::default()
        };
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();

        Resolver::new(&config, &clock).resolve(&mut device, &ScriptedOracle::default());

        let inputs: Vec<Event> = device
            .events
            .into_iter()
            .filter(|e| !matches!(e, Event::Capture(_)))
            .collect();
        assert_eq!(
            inputs,
            vec![Event::Back, Event::Tap(270, 100), Event::Back]
        );
    }

    #[test]
    fn test_uncapped_taps_every_control() {
        let config = ResolveConfig {
            max_attempts: 5,
            max_popup_clears: None,
            ..ResolveConfig::default()
        };
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();
        let oracle = ScriptedOracle {
            control_always: true,
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &oracle);

        assert_eq!(outcome.taps, 5);
        assert_eq!(device.taps().len(), 5);
        assert_eq!(device.count(&Event::Back), 0);
    }

    #[test]
    fn test_time_budget_stops_loop() {
        let config = ResolveConfig {
            dismiss_timeout_seconds: Some(7),
            ..ResolveConfig::default()
        };
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &ScriptedOracle::default());

        // Attempts at t = 0, 2, 4, 6
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.elapsed, Duration::from_secs(8));
    }

    #[test]
    fn test_recheck_after_tap() {
        let config = ResolveConfig {
            recheck_after_tap: true,
            max_popup_clears: None,
            ..ResolveConfig::default()
        };
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();
        let oracle = ScriptedOracle {
            control_on: set(&[0]),
            target_on: set(&[1]),
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &oracle);

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.taps, 1);
        assert_eq!(frame_number(&outcome.screenshot.unwrap().image), 1);
    }

    #[test]
    fn test_device_failures_do_not_abort() {
        let config = ResolveConfig::default();
        let clock = FakeClock::new();
        let mut device = ScriptedDevice {
            fail_captures: set(&[0, 2]),
            fail_input: true,
            ..Default::default()
        };
        let oracle = ScriptedOracle {
            control_on: set(&[3]),
            target_on: set(&[4]),
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &oracle);

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.taps, 1);
        assert_eq!(device.taps(), vec![Point::new(500, 43)]);
    }

    #[test]
    fn test_all_captures_fail() {
        let config = ResolveConfig {
            max_attempts: 3,
            ..ResolveConfig::default()
        };
        let clock = FakeClock::new();
        let mut device = ScriptedDevice {
            fail_captures: set(&[0, 1, 2]),
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock).resolve(&mut device, &ScriptedOracle::default());

        assert!(!outcome.success);
        assert!(outcome.screenshot.is_none());
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_frames_are_saved() {
        let dir = tempdir().unwrap();
        let config = ResolveConfig::default();
        let clock = FakeClock::new();
        let mut device = ScriptedDevice::default();
        let oracle = ScriptedOracle {
            target_on: set(&[1]),
            ..Default::default()
        };

        let outcome = Resolver::new(&config, &clock)
            .save_screenshots(7, dir.path())
            .resolve(&mut device, &oracle);

        let path = outcome.screenshot.unwrap().path.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("memu-7-check-start-1-"), "{}", name);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
