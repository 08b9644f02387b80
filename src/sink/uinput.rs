//! Direct input backend.
//!
//! Emission goes through a `uinput` virtual keyboard created once at startup.
//! Each emitted key writes a scan-code report (`MSC_SCAN`), the key-state report
//! (`EV_KEY`) and a `SYN_REPORT`, in that order.
//!
//! Capture discovers every `event*` character device under the configured
//! directory, opens each non-blocking, and polls them together on one worker
//! thread. The worker reads one `input_event` record per ready descriptor and
//! forwards `EV_KEY` records to the capture handler.
//!
//! Lifecycle of the worker:
//! - The device set lives behind a mutex; the worker holds it while polling.
//! - `stop()` cancels the token, joins the worker, and only then closes the devices.
//! - A device that errors or hangs up is removed from the set; the others keep going.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key, MiscType};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{Capture, EventSink, KeyEvent, KeyEventHandler, KeyEventKind};
use crate::keys::KeyCode;

/// Size of one kernel `input_event` record on this platform.
pub const EVENT_RECORD_SIZE: usize = std::mem::size_of::<libc::input_event>();

/// `EV_KEY` event type.
const EV_KEY: u16 = 0x01;

/// Key bits registered on the virtual device (`KEY_MAX + 1`).
const KEY_BIT_COUNT: u16 = 0x300;

const VENDOR_ID: u16 = 0x1234;
const PRODUCT_ID: u16 = 0x5678;

/// Encode a key event kind as an `EV_KEY` value.
pub fn key_value(kind: KeyEventKind) -> i32 {
    match kind {
        KeyEventKind::Up => 0,
        KeyEventKind::Down => 1,
        KeyEventKind::Repeat => 2,
    }
}

/// Decode an `EV_KEY` value.
pub fn kind_from_value(value: i32) -> Option<KeyEventKind> {
    match value {
        0 => Some(KeyEventKind::Up),
        1 => Some(KeyEventKind::Down),
        2 => Some(KeyEventKind::Repeat),
        _ => None,
    }
}

/// The payload of one `input_event` record (the timestamp is ignored).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RawInputEvent {
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    /// Decode a native-endian kernel record. Type, code and value are the last 8 bytes.
    pub fn decode(record: &[u8; EVENT_RECORD_SIZE]) -> Self {
        let tail = &record[EVENT_RECORD_SIZE - 8..];
        Self {
            type_: u16::from_ne_bytes([tail[0], tail[1]]),
            code: u16::from_ne_bytes([tail[2], tail[3]]),
            value: i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]),
        }
    }

    /// Encode as a native-endian kernel record with a zero timestamp.
    pub fn encode(&self) -> [u8; EVENT_RECORD_SIZE] {
        let mut record = [0u8; EVENT_RECORD_SIZE];
        let tail = &mut record[EVENT_RECORD_SIZE - 8..];
        tail[0..2].copy_from_slice(&self.type_.to_ne_bytes());
        tail[2..4].copy_from_slice(&self.code.to_ne_bytes());
        tail[4..8].copy_from_slice(&self.value.to_ne_bytes());
        record
    }

    /// The key event carried by this record, if it is an `EV_KEY` record.
    pub fn key_event(&self) -> Option<KeyEvent> {
        if self.type_ != EV_KEY {
            return None;
        }
        kind_from_value(self.value).map(|kind| KeyEvent::new(kind, KeyCode::from(self.code)))
    }
}

/// An opened input device in the capture set. Dropping it closes the descriptor.
#[derive(Debug)]
pub struct InputDevice {
    path: PathBuf,
    file: File,
}

impl InputDevice {
    /// Open a device read-only and non-blocking.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one record.
    ///
    /// - `Ok(Some(_))`: a full record was read.
    /// - `Ok(None)`: nothing available, or a short read (logged and skipped).
    /// - `Err(_)`: the device failed or reached end of stream; drop it.
    fn read_record(&mut self) -> io::Result<Option<RawInputEvent>> {
        let mut record = [0u8; EVENT_RECORD_SIZE];
        match self.file.read(&mut record) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device returned end of stream",
            )),
            Ok(n) if n == EVENT_RECORD_SIZE => Ok(Some(RawInputEvent::decode(&record))),
            Ok(n) => {
                warn!(
                    target: "otto::sink", path = %self.path.display(), bytes = n,
                    "Incomplete event read"
                );
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Open every `event*` character device under `dir`, in name order.
///
/// Devices that fail to open are skipped with a warning. An unreadable directory
/// or an empty result is logged as an error and yields an empty set.
pub fn discover_devices(dir: &Path) -> Vec<InputDevice> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(
                target: "otto::sink", dir = %dir.display(), error = %e,
                "Failed to open input device directory"
            );
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_char_device()))
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    let mut devices = Vec::with_capacity(paths.len());
    for path in paths {
        match InputDevice::open(&path) {
            Ok(device) => {
                info!(target: "otto::sink", path = %path.display(), "Discovered input device");
                devices.push(device);
            }
            Err(e) => {
                warn!(
                    target: "otto::sink", path = %path.display(), error = %e,
                    "Failed to open input device"
                );
            }
        }
    }

    if devices.is_empty() {
        error!(target: "otto::sink", dir = %dir.display(), "No usable input devices found");
    }
    devices
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sink backed by a `uinput` virtual keyboard.
pub struct UinputSink {
    device: Mutex<VirtualDevice>,
    device_dir: PathBuf,
    poll_timeout_ms: u16,
}

impl UinputSink {
    /// Create the virtual device. Failure here is fatal to the run.
    pub fn new(name: &str, device_dir: impl Into<PathBuf>, poll_timeout_ms: u16) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..KEY_BIT_COUNT {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .context("Failed to open /dev/uinput")?
            .name(name)
            .input_id(InputId::new(BusType::BUS_USB, VENDOR_ID, PRODUCT_ID, 1))
            .with_keys(&keys)
            .context("Failed to configure key bits for uinput")?
            .build()
            .context("Failed to set up uinput device")?;

        info!(target: "otto::sink", %name, "UInput setup completed");
        Ok(Self {
            device: Mutex::new(device),
            device_dir: device_dir.into(),
            poll_timeout_ms,
        })
    }
}

impl EventSink for UinputSink {
    fn name(&self) -> &'static str {
        "uinput"
    }

    fn emit(&self, kind: KeyEventKind, code: KeyCode) {
        let Ok(key) = u16::try_from(code) else {
            error!(target: "otto::sink", code, "Key code out of range for uinput");
            return;
        };

        // The device appends the SYN_REPORT after these two.
        let events = [
            InputEvent::new(EventType::MISC, MiscType::MSC_SCAN.0, i32::from(key)),
            InputEvent::new(EventType::KEY, key, key_value(kind)),
        ];
        if let Err(e) = lock(&self.device).emit(&events) {
            error!(target: "otto::sink", code, ?kind, error = %e, "Failed to send uinput event");
            return;
        }
        debug!(target: "otto::sink", code, ?kind, "Event sent");
    }

    fn start_capture(&self, handler: KeyEventHandler) -> Result<Box<dyn Capture>> {
        let devices = discover_devices(&self.device_dir);
        let capture = EvdevCapture::spawn(devices, self.poll_timeout_ms, handler)?;
        Ok(Box::new(capture))
    }
}

/// Poll-thread capture over a set of input devices.
pub struct EvdevCapture {
    devices: Arc<Mutex<Vec<InputDevice>>>,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl EvdevCapture {
    /// Start the poll worker over `devices`.
    pub fn spawn(
        devices: Vec<InputDevice>,
        poll_timeout_ms: u16,
        handler: KeyEventHandler,
    ) -> Result<Self> {
        let devices = Arc::new(Mutex::new(devices));
        let token = CancellationToken::new();

        let worker = {
            let devices = Arc::clone(&devices);
            let token = token.clone();
            thread::Builder::new()
                .name("otto-evdev".into())
                .spawn(move || poll_loop(&devices, &token, poll_timeout_ms, &handler))
                .context("Failed to spawn evdev polling thread")?
        };

        Ok(Self {
            devices,
            token,
            worker: Some(worker),
        })
    }

    /// Number of devices still in the poll set.
    pub fn device_count(&self) -> usize {
        lock(&self.devices).len()
    }
}

impl Capture for EvdevCapture {
    fn stop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(target: "otto::sink", "Evdev polling thread panicked");
            }
            let mut devices = lock(&self.devices);
            devices.clear();
            info!(target: "otto::sink", "Evdev recording thread terminated");
        }
    }
}

impl Drop for EvdevCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    devices: &Mutex<Vec<InputDevice>>,
    token: &CancellationToken,
    poll_timeout_ms: u16,
    handler: &KeyEventHandler,
) {
    debug!(target: "otto::sink", devices = lock(devices).len(), "Evdev polling started");

    while !token.is_cancelled() {
        let mut devices = lock(devices);
        if devices.is_empty() {
            drop(devices);
            thread::sleep(Duration::from_millis(u64::from(poll_timeout_ms)));
            continue;
        }

        let ready: Vec<(usize, PollFlags)> = {
            let mut fds: Vec<PollFd<'_>> = devices
                .iter()
                .map(|d| PollFd::new(d.file.as_fd(), PollFlags::POLLIN))
                .collect();
            match poll(&mut fds, PollTimeout::from(poll_timeout_ms)) {
                Ok(0) => {
                    trace!(target: "otto::sink", "Poll timed out");
                    continue;
                }
                Ok(_) => fds
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, fd)| {
                        fd.revents()
                            .filter(|r| !r.is_empty())
                            .map(|r| (idx, r))
                    })
                    .collect(),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    error!(target: "otto::sink", error = %e, "Poll failed during evdev recording");
                    break;
                }
            }
        };

        let mut dropped = Vec::new();
        for (idx, revents) in ready {
            if token.is_cancelled() {
                break;
            }
            let device = &mut devices[idx];
            if revents.contains(PollFlags::POLLIN) {
                match device.read_record() {
                    Ok(Some(record)) => match record.key_event() {
                        Some(event) => handler(event),
                        None => trace!(target: "otto::sink", ?record, "Non-key event ignored"),
                    },
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            target: "otto::sink", path = %device.path.display(), error = %e,
                            "Read failed; removing device from poll set"
                        );
                        dropped.push(idx);
                    }
                }
            } else if revents
                .intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL)
            {
                warn!(
                    target: "otto::sink", path = %device.path.display(),
                    "Device disconnected; removing from poll set"
                );
                dropped.push(idx);
            }
        }

        if !dropped.is_empty() {
            for idx in dropped.into_iter().rev() {
                devices.remove(idx);
            }
            info!(target: "otto::sink", remaining = devices.len(), "Removed failed devices");
        }
    }

    debug!(target: "otto::sink", "Evdev polling loop terminated");
}
