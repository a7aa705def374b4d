//! Emulator start/stop through memuc.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use tracing::info;

use super::DeviceError;
use super::adb::run_command;

const START_TIMEOUT: Duration = Duration::from_secs(120);
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Base of the adb port MEmu assigns when memuc does not report one.
const FALLBACK_ADB_PORT_BASE: u32 = 21500;

/// `memuc start` prints a line like `... adb: ... Android Emulator 127.0.0.1:21503`.
static SERIAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^.*adb:.*Android Emulator.*?(\S+)\s*$").expect("serial regex is valid")
});

/// Path of memuc.exe inside the MEmu install directory.
pub fn memuc_path(memu_root: &Path) -> PathBuf {
    memu_root.join("memuc.exe")
}

fn run_memuc(memu_root: &Path, args: &[&str], timeout: Duration) -> Result<String, DeviceError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let output = run_command(&memuc_path(memu_root), &args, timeout)?;
    Ok(output.stdout_text())
}

/// Starts instance `index` and returns its adb serial.
///
/// Does not wait for the device to become reachable.
pub fn start_instance(index: u32, memu_root: &Path) -> Result<String, DeviceError> {
    info!("Starting MEmu instance {}", index);
    let output = run_memuc(memu_root, &["start", &index.to_string()], START_TIMEOUT)?;
    let serial = parse_serial(&output).unwrap_or_else(|| fallback_serial(index));
    info!("Instance {} uses adb serial {}", index, serial);
    Ok(serial)
}

/// Stops instance `index`.
pub fn stop_instance(index: u32, memu_root: &Path) -> Result<(), DeviceError> {
    info!("Stopping MEmu instance {}", index);
    run_memuc(memu_root, &["stop", &index.to_string()], STOP_TIMEOUT)?;
    Ok(())
}

/// Extracts the serial from the last matching line of `memuc start` output.
fn parse_serial(output: &str) -> Option<String> {
    SERIAL_LINE
        .captures_iter(output)
        .last()
        .map(|caps| caps[1].to_string())
}

fn fallback_serial(index: u32) -> String {
    format!("127.0.0.1:{}", FALLBACK_ADB_PORT_BASE + index)
}
