//! Process-wide list of running emulator instances with guaranteed teardown.
//!
//! Instances are stopped in reverse start order when the guard drops (normal
//! exit or unwinding) or when Ctrl+C arrives.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::device::{DeviceError, memu};

/// One started instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub index: u32,
    pub serial: String,
    pub memu_root: PathBuf,
    /// False when the instance is meant to keep running
    pub should_stop: bool,
}

type StopFn = Box<dyn Fn(&SessionEntry) -> Result<(), DeviceError> + Send + Sync>;

pub struct SessionRegistry {
    active: Mutex<Vec<SessionEntry>>,
    stop: StopFn,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Registry that stops instances through memuc.
    pub fn new() -> Self {
        Self::with_stopper(|entry| memu::stop_instance(entry.index, &entry.memu_root))
    }

    pub fn with_stopper(
        stop: impl Fn(&SessionEntry) -> Result<(), DeviceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            stop: Box::new(stop),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionEntry>> {
        // A panic while holding the lock leaves the list itself intact
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, entry: SessionEntry) {
        self.lock().push(entry);
    }

    pub fn unregister(&self, index: u32, serial: &str) {
        self.lock()
            .retain(|entry| !(entry.index == index && entry.serial == serial));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stops every pending instance, newest first, and empties the registry.
    ///
    /// Returns how many instances were stopped successfully.
    pub fn cleanup_all(&self, reason: &str) -> usize {
        let pending: Vec<SessionEntry> = std::mem::take(&mut *self.lock());
        let mut stopped = 0;

        for entry in pending.iter().rev() {
            if !entry.should_stop {
                continue;
            }
            match (self.stop)(entry) {
                Ok(()) => stopped += 1,
                Err(e) => warn!(
                    "[cleanup] Failed to stop instance {} ({}) during {}: {}",
                    entry.index, entry.serial, reason, e
                ),
            }
        }
        stopped
    }
}

/// Runs `cleanup_all` when dropped.
pub struct CleanupGuard {
    registry: Arc<SessionRegistry>,
}

impl CleanupGuard {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            info!("Stopping {} remaining MEmu instance(s)", self.registry.len());
            self.registry.cleanup_all("exit");
        }
    }
}

/// Exit status after an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Spawns a thread that waits for Ctrl+C, tears down all sessions and exits.
pub fn install_interrupt_handler(registry: Arc<SessionRegistry>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("interrupt-watcher".to_string())
        .spawn(move || {
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    warn!("Received Ctrl+C. Cleaning up MEmu instances...");
                    registry.cleanup_all("interrupt");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
                Err(e) => warn!("Interrupt handler unavailable: {}", e),
            }
        })
        .context("Failed to spawn interrupt watcher")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u32, should_stop: bool) -> SessionEntry {
        SessionEntry {
            index,
            serial: format!("127.0.0.1:{}", 21500 + index),
            memu_root: PathBuf::from("memu"),
            should_stop,
        }
    }

    fn recording_registry() -> (Arc<SessionRegistry>, Arc<Mutex<Vec<u32>>>) {
        let stopped = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stopped);
        let registry = SessionRegistry::with_stopper(move |entry| {
            sink.lock().unwrap().push(entry.index);
            if entry.index == 13 {
                return Err(DeviceError::CommandNotFound {
                    program: "memuc.exe".to_string(),
                });
            }
            Ok(())
        });
        (Arc::new(registry), stopped)
    }

    #[test]
    fn test_cleanup_reverse_order() {
        let (registry, stopped) = recording_registry();
        registry.register(entry(59, true));
        registry.register(entry(57, true));
        registry.register(entry(173, true));

        assert_eq!(registry.cleanup_all("test"), 3);
        assert_eq!(*stopped.lock().unwrap(), vec![173, 57, 59]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cleanup_skips_kept_and_survives_errors() {
        let (registry, stopped) = recording_registry();
        registry.register(entry(1, true));
        registry.register(entry(2, false));
        registry.register(entry(13, true));

        assert_eq!(registry.cleanup_all("test"), 1);
        assert_eq!(*stopped.lock().unwrap(), vec![13, 1]);
    }

    #[test]
    fn test_unregister_matches_index_and_serial() {
        let (registry, _) = recording_registry();
        registry.register(entry(1, true));
        registry.register(entry(2, true));

        registry.unregister(1, "wrong-serial");
        assert_eq!(registry.len(), 2);
        registry.unregister(1, "127.0.0.1:21501");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_guard_cleans_up_on_drop() {
        let (registry, stopped) = recording_registry();
        registry.register(entry(4, true));
        {
            let _guard = CleanupGuard::new(Arc::clone(&registry));
        }
        assert_eq!(*stopped.lock().unwrap(), vec![4]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_cleanup_is_noop() {
        let (registry, stopped) = recording_registry();
        registry.register(entry(4, true));
        registry.cleanup_all("first");
        registry.cleanup_all("second");
        assert_eq!(stopped.lock().unwrap().len(), 1);
    }
}
