//! adb command plumbing and the adb-backed device controller.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{DeviceController, DeviceError};

const TAP_TIMEOUT: Duration = Duration::from_secs(5);
const KEY_TIMEOUT: Duration = Duration::from_secs(5);
const SCREENCAP_TIMEOUT: Duration = Duration::from_secs(15);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(15);
const GET_STATE_TIMEOUT: Duration = Duration::from_secs(10);
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Android key codes used by the tool.
const KEYCODE_BACK: u32 = 4;
const KEYCODE_POWER: u32 = 26;
const KEYCODE_MENU: u32 = 82;

/// Output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// Runs a command to completion, killing it once `timeout` expires.
///
/// A non-zero exit status is an error carrying the captured output.
pub fn run_command(program: &Path, args: &[String], timeout: Duration) -> Result<CommandOutput, DeviceError> {
    let command_line = format!("{} {}", program.display(), args.join(" "));
    debug!("Running: {}", command_line);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DeviceError::CommandNotFound {
                program: program.display().to_string(),
            },
            _ => DeviceError::Io(e),
        })?;

    // Drain the pipes on helper threads so a chatty child cannot block on a full pipe
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DeviceError::Timeout {
                command: command_line,
                timeout,
            });
        }
        std::thread::sleep(Duration::from_millis(20));
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    if !status.success() {
        return Err(DeviceError::CommandFailed {
            command: command_line,
            code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Path of adb.exe inside the MEmu install directory.
pub fn adb_path(memu_root: &Path) -> PathBuf {
    memu_root.join("adb.exe")
}

/// An emulator instance reachable through adb.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: PathBuf,
    serial: String,
    tap_pause: Duration,
}

impl AdbDevice {
    pub fn new(memu_root: &Path, serial: impl Into<String>, tap_pause: Duration) -> Self {
        Self {
            adb: adb_path(memu_root),
            serial: serial.into(),
            tap_pause,
        }
    }

    /// Runs `adb -s <serial> <args>`.
    pub fn run(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, DeviceError> {
        let mut full_args = vec!["-s".to_string(), self.serial.clone()];
        full_args.extend(args.iter().map(|a| a.to_string()));
        run_command(&self.adb, &full_args, timeout)
    }

    fn keyevent(&self, code: u32) -> Result<(), DeviceError> {
        self.run(&["shell", "input", "keyevent", &code.to_string()], KEY_TIMEOUT)?;
        Ok(())
    }

    /// Polls `adb get-state` until the device reports ready or `timeout` expires.
    pub fn wait_for_device(&self, timeout: Duration) -> Result<(), DeviceError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.run(&["get-state"], GET_STATE_TIMEOUT) {
                Ok(output) if output.stdout_text().contains("device") => {
                    info!("Device {} is ready", self.serial);
                    return Ok(());
                }
                Ok(output) => debug!("Device state: {}", output.stdout_text().trim()),
                Err(e) => debug!("get-state failed: {}", e),
            }
            std::thread::sleep(Duration::from_secs(2));
        }
        Err(DeviceError::DeviceNotReady {
            serial: self.serial.clone(),
        })
    }

    /// Wakes and unlocks the screen. Best effort.
    pub fn unlock(&self) {
        let result = (|| -> Result<(), DeviceError> {
            self.keyevent(KEYCODE_POWER)?;
            std::thread::sleep(Duration::from_millis(500));
            self.run(&["shell", "input", "swipe", "300", "1000", "300", "300"], KEY_TIMEOUT)?;
            std::thread::sleep(Duration::from_millis(500));
            self.keyevent(KEYCODE_MENU)
        })();
        if let Err(e) = result {
            warn!("Unlock failed on {}: {}", self.serial, e);
        }
    }

    /// Lists installed package names.
    pub fn installed_packages(&self) -> Result<Vec<String>, DeviceError> {
        let output = self.run(&["shell", "pm", "list", "packages"], SHELL_TIMEOUT)?;
        Ok(parse_package_list(&output.stdout_text()))
    }

    /// Launches `package`, through its activity when one is known. Best effort.
    pub fn launch_app(&self, package: &str, activity: Option<&str>) {
        let result = match activity {
            Some(activity) => {
                let component = format!("{}/{}", package, activity);
                self.run(&["shell", "am", "start", "-n", &component], LAUNCH_TIMEOUT)
            }
            None => self.run(
                &[
                    "shell",
                    "monkey",
                    "-p",
                    package,
                    "-c",
                    "android.intent.category.LAUNCHER",
                    "1",
                ],
                LAUNCH_TIMEOUT,
            ),
        };
        if let Err(e) = result {
            warn!("Launching {} failed: {}", package, e);
        }
    }
}

impl DeviceController for AdbDevice {
    fn capture_screenshot(&mut self) -> Result<Vec<u8>, DeviceError> {
        let output = match self.run(&["exec-out", "screencap", "-p"], SCREENCAP_TIMEOUT) {
            Ok(output) => output,
            Err(DeviceError::CommandFailed { stderr, .. }) => {
                return Err(DeviceError::Screenshot(stderr));
            }
            Err(e) => return Err(e),
        };
        if output.stdout.is_empty() {
            return Err(DeviceError::Screenshot(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(output.stdout)
    }

    fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        let result = self.run(
            &["shell", "input", "tap", &x.to_string(), &y.to_string()],
            TAP_TIMEOUT,
        );
        // The pause applies whether or not the tap went through
        if !self.tap_pause.is_zero() {
            std::thread::sleep(self.tap_pause);
        }
        result.map(|_| ())
    }

    fn back(&mut self) -> Result<(), DeviceError> {
        self.keyevent(KEYCODE_BACK)
    }
}

/// Parses `pm list packages` output (`package:<name>` per line).
fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
