/*!
Recorder: captures live key events into a replayable script.

Lifecycle:
- `start(path)` clears the buffer, switches to `Recording`, and starts the
  sink's live capture (poll thread or bus callback, depending on backend).
- Every captured event goes through `handle_event`: debounced, filtered to
  key-downs, converted to `key_press <name>`, and appended to the buffer.
- `stop()` stops the capture (joining any worker), then writes the buffer to
  the output path, one command per line, replacing the file.

The buffer has its own mutex; the capture thread and the foreground thread
never touch it without holding that lock.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::keys::{KeyCode, KeyTable};
use crate::sink::{Capture, EventSink, KeyEvent, KeyEventHandler, KeyEventKind};

pub mod debounce;

pub use debounce::{DEFAULT_DEBOUNCE, Debouncer};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Name written for codes missing from the key table.
pub fn unknown_key_name(code: KeyCode) -> String {
    format!("KEY_UNKNOWN_{code}")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State reachable from capture callbacks.
struct Shared {
    recording: AtomicBool,
    events: Mutex<Vec<String>>,
    debouncer: Mutex<Debouncer>,
    table: Arc<KeyTable>,
}

impl Shared {
    fn handle_event(&self, event: KeyEvent, now: Instant) {
        if !self.recording.load(Ordering::Acquire) {
            warn!(target: "otto::recorder", ?event, "No recording in progress; event ignored");
            return;
        }
        debug!(target: "otto::recorder", kind = ?event.kind, code = event.code, "Received event");

        if !lock(&self.debouncer).accept(event, now) {
            debug!(target: "otto::recorder", code = event.code, "Filtered duplicate event");
            return;
        }

        if event.kind != KeyEventKind::Down {
            debug!(target: "otto::recorder", kind = ?event.kind, "Ignoring non-keydown event");
            return;
        }

        let name = match self.table.name_of(event.code) {
            Some(name) => name.to_string(),
            None => {
                warn!(target: "otto::recorder", code = event.code, "Unknown key code");
                unknown_key_name(event.code)
            }
        };
        let command = format!("key_press {name}");
        lock(&self.events).push(command.clone());
        info!(target: "otto::recorder", %command, "Recorded key event");
    }
}

pub struct Recorder {
    sink: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    capture: Option<Box<dyn Capture>>,
    output: Option<PathBuf>,
}

impl Recorder {
    /// - `debounce`: window for collapsing repeated key-downs (see `Debouncer`).
    pub fn new(sink: Arc<dyn EventSink>, table: Arc<KeyTable>, debounce: Duration) -> Self {
        Self {
            sink,
            shared: Arc::new(Shared {
                recording: AtomicBool::new(false),
                events: Mutex::new(Vec::new()),
                debouncer: Mutex::new(Debouncer::new(debounce)),
                table,
            }),
            capture: None,
            output: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.shared.recording.load(Ordering::Acquire) {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Begin recording to `path`. A second call while recording only warns.
    ///
    /// Errors when the live capture cannot be started; the recorder stays idle.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.state() == RecorderState::Recording {
            warn!(target: "otto::recorder", "Recording already in progress");
            return Ok(());
        }

        lock(&self.shared.events).clear();
        lock(&self.shared.debouncer).reset();
        self.shared.recording.store(true, Ordering::Release);

        let handler: KeyEventHandler = {
            let shared = Arc::clone(&self.shared);
            Arc::new(move |event| shared.handle_event(event, Instant::now()))
        };
        match self.sink.start_capture(handler) {
            Ok(capture) => self.capture = Some(capture),
            Err(e) => {
                self.shared.recording.store(false, Ordering::Release);
                return Err(e).context("Failed to start key event capture");
            }
        }

        self.output = Some(path.to_path_buf());
        info!(
            target: "otto::recorder", path = %path.display(), sink = self.sink.name(),
            "Started recording key events"
        );
        Ok(())
    }

    /// Feed one observed event, timestamped now.
    pub fn handle_event(&self, kind: KeyEventKind, code: KeyCode) {
        self.shared.handle_event(KeyEvent::new(kind, code), Instant::now());
    }

    /// Feed one observed event with an explicit timestamp.
    pub fn handle_event_at(&self, kind: KeyEventKind, code: KeyCode, at: Instant) {
        self.shared.handle_event(KeyEvent::new(kind, code), at);
    }

    /// Snapshot of the commands recorded so far.
    pub fn recorded(&self) -> Vec<String> {
        lock(&self.shared.events).clone()
    }

    /// Stop capturing and write the recorded commands. A no-op when idle.
    pub fn stop(&mut self) -> Result<()> {
        if self.state() == RecorderState::Idle {
            debug!(target: "otto::recorder", "No recording in progress");
            return Ok(());
        }

        self.shared.recording.store(false, Ordering::Release);
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }

        let Some(path) = self.output.take() else {
            return Ok(());
        };
        let events = lock(&self.shared.events);
        let mut contents = String::with_capacity(events.iter().map(|e| e.len() + 1).sum());
        for command in events.iter() {
            contents.push_str(command);
            contents.push('\n');
        }
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write recorded events to {}", path.display()))?;

        info!(
            target: "otto::recorder",
            path = %path.display(), events = events.len(),
            "Stopped recording; events saved"
        );
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(target: "otto::recorder", error = %e, "Failed to finish recording");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::keys::KeyManager;
    use crate::sink::testing::MemorySink;
    use crate::sink::{BusSink, LoopbackBus, LogSink};

    fn recorder_with(sink: Arc<dyn EventSink>) -> Recorder {
        Recorder::new(
            sink,
            Arc::new(KeyTable::for_backend(Backend::Direct)),
            DEFAULT_DEBOUNCE,
        )
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_down_up_down_burst_yields_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rec.txt");
        let sink = Arc::new(MemorySink::default());
        let mut rec = Recorder::new(
            sink.clone(),
            Arc::new(KeyTable::from_pairs([("mute", 5)])),
            DEFAULT_DEBOUNCE,
        );

        rec.start(&out).unwrap();
        let t0 = Instant::now();
        rec.handle_event_at(KeyEventKind::Down, 5, t0);
        rec.handle_event_at(KeyEventKind::Up, 5, t0 + Duration::from_millis(40));
        rec.handle_event_at(KeyEventKind::Down, 5, t0 + Duration::from_millis(90));
        rec.stop().unwrap();

        assert_eq!(read_lines(&out), vec!["key_press mute"]);
    }

    #[test]
    fn test_debounce_window_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rec.txt");
        let mut rec = recorder_with(Arc::new(MemorySink::default()));

        rec.start(&out).unwrap();
        let t0 = Instant::now();
        rec.handle_event_at(KeyEventKind::Down, 103, t0);
        rec.handle_event_at(KeyEventKind::Down, 103, t0 + Duration::from_millis(100));
        rec.handle_event_at(KeyEventKind::Down, 103, t0 + Duration::from_millis(350));
        rec.stop().unwrap();

        assert_eq!(read_lines(&out), vec!["key_press up", "key_press up"]);
    }

    #[test]
    fn test_events_are_ignored_when_idle() {
        let rec = recorder_with(Arc::new(MemorySink::default()));
        rec.handle_event(KeyEventKind::Down, 103);
        assert!(rec.recorded().is_empty());
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[test]
    fn test_unknown_codes_use_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rec.txt");
        let mut rec = recorder_with(Arc::new(MemorySink::default()));
        rec.start(&out).unwrap();
        rec.handle_event(KeyEventKind::Down, 4242);
        rec.handle_event(KeyEventKind::Repeat, 4242);
        rec.stop().unwrap();
        assert_eq!(read_lines(&out), vec!["key_press KEY_UNKNOWN_4242"]);
    }

    #[test]
    fn test_capture_lifecycle_and_restart_clears_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let sink = Arc::new(MemorySink::default());
        let mut rec = recorder_with(sink.clone());

        rec.start(&first).unwrap();
        assert!(sink.capturing());
        rec.start(&second).unwrap(); // already recording: ignored
        sink.inject(KeyEventKind::Down, 116);
        rec.stop().unwrap();
        assert!(!sink.capturing());
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(!second.exists());
        assert_eq!(read_lines(&first), vec!["key_press power"]);

        rec.start(&second).unwrap();
        rec.stop().unwrap();
        assert_eq!(fs::read_to_string(&second).unwrap(), "");
        rec.stop().unwrap(); // idle: no-op
    }

    #[test]
    fn test_failed_capture_leaves_recorder_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder_with(Arc::new(LogSink::new()));
        assert!(rec.start(dir.path().join("x.txt")).is_err());
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[test]
    fn test_records_keys_sent_over_loopback_bus() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bus.txt");
        let table = Arc::new(KeyTable::for_backend(Backend::Bus));
        let sink: Arc<dyn EventSink> = Arc::new(BusSink::new(Arc::new(LoopbackBus::new())));
        let keys = KeyManager::new(Arc::clone(&table), Arc::clone(&sink), Duration::ZERO);
        let mut rec = Recorder::new(sink, table, Duration::ZERO);

        rec.start(&out).unwrap();
        keys.send_key_press("up", 1);
        keys.send_key_press("enter", 1);
        rec.stop().unwrap();

        assert_eq!(read_lines(&out), vec!["key_press up", "key_press enter"]);
    }
}
