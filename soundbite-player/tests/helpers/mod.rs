//! Test helpers for soundbite-player integration tests
//!
//! Provides in-memory stand-ins for the playback seams:
//! - FakeDevice: records every handle call, detects overlapping handles and
//!   can hold or fail the resume and begin steps
//! - FakeFetcher: serves bytes by name, with per-file gates and counters
//! - FakeDecoder: turns any bytes into a fixed length of silence

#![allow(dead_code)]

use futures::future::BoxFuture;
use soundbite_common::PlaybackEvent;
use soundbite_player::audio::{
    AudioDecoder, AudioDevice, CompletionCallback, DecodedBuffer, PlaybackHandle, SourceFetcher,
};
use soundbite_player::playback::{BufferStore, PlaybackController, SharedFilter};
use soundbite_player::{ClipCatalog, Error, FileFilter, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Rate every fake buffer is produced at
pub const TEST_RATE: u32 = 1000;

/// Length of every fake decoded file
pub const TEST_FILE_SECONDS: u32 = 20;

pub const CATALOG: &str = r#"{
    "Alice": [ { "file": "a.mp3", "start": 2.0, "duration": 3.0 } ],
    "Bob":   [ { "file": "b.mp3", "start": 0.5, "duration": 1.0 } ],
    "Carol": [
        { "file": "a.mp3", "start": 5.0, "duration": 1.0 },
        { "file": "b.mp3", "start": 1.0, "duration": 1.0 }
    ]
}"#;

// ============================================================================
// Fake device
// ============================================================================

/// One call observed by the fake device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Create {
        serial: u64,
        start: Duration,
        duration: Duration,
    },
    Begin(u64),
    Stop(u64),
    Release(u64),
}

#[derive(Default)]
struct DeviceState {
    next_serial: u64,
    calls: Vec<DeviceCall>,
    /// Begun and not yet stopped or released
    live: HashSet<u64>,
    /// `begin` while another handle was live
    overlaps: usize,
    callbacks: HashMap<u64, CompletionCallback>,
    resumes: usize,
}

struct DeviceShared {
    state: Mutex<DeviceState>,
    fail_resume: AtomicBool,
    fail_begin: AtomicBool,
    auto_complete: AtomicBool,
    /// Armed by `hold_next_resume`; taken by the next resume call
    resume_gate: Mutex<Option<Arc<Notify>>>,
    /// Same gate, kept for `open_resume`
    held_resume: Mutex<Option<Arc<Notify>>>,
}

impl DeviceShared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    fn complete(&self, serial: u64) -> bool {
        let callback = self.lock().callbacks.remove(&serial);
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    fn end(&self, serial: u64) {
        let mut state = self.lock();
        state.live.remove(&serial);
        state.callbacks.remove(&serial);
    }
}

/// Recording [`AudioDevice`]; segments end only when the test says so
/// unless auto-complete is enabled
#[derive(Clone)]
pub struct FakeDevice {
    shared: Arc<DeviceShared>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                state: Mutex::new(DeviceState::default()),
                fail_resume: AtomicBool::new(false),
                fail_begin: AtomicBool::new(false),
                auto_complete: AtomicBool::new(false),
                resume_gate: Mutex::new(None),
                held_resume: Mutex::new(None),
            }),
        }
    }

    /// Fire natural end after each segment's duration (tokio time)
    pub fn with_auto_complete(self) -> Self {
        self.shared.auto_complete.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fail_resume(&self, fail: bool) {
        self.shared.fail_resume.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_begin(&self, fail: bool) {
        self.shared.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Make the next resume wait until [`open_resume`](Self::open_resume)
    pub fn hold_next_resume(&self) {
        let gate = Arc::new(Notify::new());
        *self.shared.resume_gate.lock().unwrap() = Some(Arc::clone(&gate));
        *self.shared.held_resume.lock().unwrap() = Some(gate);
    }

    /// Let the held resume proceed
    pub fn open_resume(&self) {
        if let Some(gate) = self.shared.held_resume.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    /// Fire the natural end of `serial`; false if it can no longer complete
    pub fn complete(&self, serial: u64) -> bool {
        self.shared.complete(serial)
    }

    /// Fire the natural end of the live handle
    pub fn complete_live(&self) -> bool {
        let live = self.live();
        match live.as_slice() {
            [serial] => self.complete(*serial),
            _ => false,
        }
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.shared.lock().calls.clone()
    }

    pub fn live(&self) -> Vec<u64> {
        self.shared.lock().live.iter().copied().collect()
    }

    pub fn overlaps(&self) -> usize {
        self.shared.lock().overlaps
    }

    pub fn resumes(&self) -> usize {
        self.shared.lock().resumes
    }

    pub fn begun(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Begin(serial) => Some(serial),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<(Duration, Duration)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Create { start, duration, .. } => Some((start, duration)),
                _ => None,
            })
            .collect()
    }
}

impl AudioDevice for FakeDevice {
    fn sample_rate(&self) -> u32 {
        TEST_RATE
    }

    fn resume_if_suspended(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shared.lock().resumes += 1;
            let gate = self.shared.resume_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.shared.fail_resume.load(Ordering::SeqCst) {
                return Err(Error::Device("no output available".to_string()));
            }
            Ok(())
        })
    }

    fn create_handle(
        &self,
        _buffer: Arc<DecodedBuffer>,
        start: Duration,
        duration: Duration,
        on_complete: CompletionCallback,
    ) -> Result<Box<dyn PlaybackHandle>> {
        let mut state = self.shared.lock();
        state.next_serial += 1;
        let serial = state.next_serial;
        state.calls.push(DeviceCall::Create {
            serial,
            start,
            duration,
        });

        Ok(Box::new(FakeHandle {
            serial,
            duration,
            shared: Arc::clone(&self.shared),
            on_complete: Some(on_complete),
        }))
    }
}

struct FakeHandle {
    serial: u64,
    duration: Duration,
    shared: Arc<DeviceShared>,
    on_complete: Option<CompletionCallback>,
}

impl PlaybackHandle for FakeHandle {
    fn begin(&mut self) -> Result<()> {
        if self.shared.fail_begin.load(Ordering::SeqCst) {
            return Err(Error::Device("stream refused to start".to_string()));
        }
        {
            let mut state = self.shared.lock();
            if !state.live.is_empty() {
                state.overlaps += 1;
            }
            state.live.insert(self.serial);
            state.calls.push(DeviceCall::Begin(self.serial));
            if let Some(callback) = self.on_complete.take() {
                state.callbacks.insert(self.serial, callback);
            }
        }

        if self.shared.auto_complete.load(Ordering::SeqCst) {
            let shared = Arc::clone(&self.shared);
            let serial = self.serial;
            let duration = self.duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                shared.complete(serial);
            });
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.lock().calls.push(DeviceCall::Stop(self.serial));
        self.shared.end(self.serial);
    }

    fn release(&mut self) {
        self.shared.lock().calls.push(DeviceCall::Release(self.serial));
        self.shared.end(self.serial);
        self.on_complete = None;
    }
}

// ============================================================================
// Fake fetcher and decoder
// ============================================================================

/// Serves a few bytes for any file not marked missing
#[derive(Default)]
pub struct FakeFetcher {
    missing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_missing(&self, file: &str, missing: bool) {
        let mut set = self.missing.lock().unwrap();
        if missing {
            set.insert(file.to_string());
        } else {
            set.remove(file);
        }
    }

    /// Make fetches of `file` wait until [`open`](Self::open) is called
    pub fn hold(&self, file: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(file.to_string(), Arc::new(Notify::new()));
    }

    /// Let every fetch waiting on `file` proceed
    pub fn open(&self, file: &str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(file) {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn fetch_count(&self, file: &str) -> usize {
        self.fetches.lock().unwrap().get(file).copied().unwrap_or(0)
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch<'a>(&'a self, file: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            *self
                .fetches
                .lock()
                .unwrap()
                .entry(file.to_string())
                .or_default() += 1;

            let gate = self.gates.lock().unwrap().get(file).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            if self.missing.lock().unwrap().contains(file) {
                return Err(Error::load(file, "not found"));
            }
            Ok(file.as_bytes().to_vec())
        })
    }
}

/// Decodes anything into [`TEST_FILE_SECONDS`] of silence
pub struct FakeDecoder;

impl AudioDecoder for FakeDecoder {
    fn decode(&self, file: &str, _bytes: Vec<u8>) -> Result<DecodedBuffer> {
        if file.starts_with("corrupt") {
            return Err(Error::Decode(format!("{}: not audio", file)));
        }
        let frames = (TEST_RATE * TEST_FILE_SECONDS) as usize;
        Ok(DecodedBuffer::new(vec![0.0; frames * 2], TEST_RATE))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub controller: PlaybackController,
    pub device: FakeDevice,
    pub fetcher: Arc<FakeFetcher>,
    pub buffers: Arc<BufferStore>,
    pub filter: SharedFilter,
    pub events: broadcast::Receiver<PlaybackEvent>,
}

impl Harness {
    pub fn new(catalog_json: &str, device: FakeDevice) -> Self {
        let catalog = Arc::new(ClipCatalog::from_json_str(catalog_json).unwrap());
        let fetcher = Arc::new(FakeFetcher::new());
        let buffers = Arc::new(BufferStore::new(fetcher.clone(), Arc::new(FakeDecoder)));
        let filter = SharedFilter::new(FileFilter::All);
        let controller = PlaybackController::new(
            catalog,
            Arc::clone(&buffers),
            Arc::new(device.clone()),
            filter.clone(),
        );
        let events = controller.subscribe();

        Self {
            controller,
            device,
            fetcher,
            buffers,
            filter,
            events,
        }
    }

    /// Notifications received so far
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn default_harness() -> Harness {
    Harness::new(CATALOG, FakeDevice::new())
}

/// Let other tasks run until `condition` holds (about two seconds at most)
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for attempt in 0..2100 {
        if condition() {
            return;
        }
        // Blocking decodes run off-runtime; give them real time after a few yields
        if attempt < 100 {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    panic!("condition not reached");
}

pub fn started(clip: &str) -> PlaybackEvent {
    PlaybackEvent::Started {
        clip: clip.to_string(),
    }
}

pub fn ended(clip: &str) -> PlaybackEvent {
    PlaybackEvent::Ended {
        clip: clip.to_string(),
    }
}

pub fn interrupted(clip: &str) -> PlaybackEvent {
    PlaybackEvent::Interrupted {
        clip: clip.to_string(),
    }
}
