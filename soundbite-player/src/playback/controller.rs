//! Playback controller
//!
//! Turns "play clip X" requests into sound on a single output slot.
//!
//! **Supersession:** every request takes a fresh epoch from a shared counter
//! and re-checks it after each suspension point (device resume, buffer load).
//! A request whose epoch is no longer current abandons quietly; its fetch or
//! decode still finishes and may populate the buffer cache. Only the newest
//! request can install a handle, and the slot is released before any new
//! handle begins, so two clips never sound at once.
//!
//! **Locking:** the slot mutex is synchronous and never held across an await.
//! Notifications that describe the slot (`Started`, `Ended`, `Interrupted`)
//! are emitted while it is held so subscribers see them in slot order.

use crate::audio::device::{AudioDevice, CompletionCallback};
use crate::catalog::{ClipCatalog, FileFilter, Segment};
use crate::error::Error;
use crate::playback::buffer_store::BufferStore;
use crate::playback::filter::SharedFilter;
use crate::playback::sequence::{Completion, SequenceState};
use crate::playback::slot::{ActiveHandle, OutputSlot};
use rand::seq::SliceRandom;
use soundbite_common::events::{EventBus, PlaybackEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, trace, warn};

/// What became of a [`PlaybackController::play`] request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A handle was installed and is sounding
    Started,
    /// No segment of the clip passes the active filter
    NothingPlayable,
    /// A newer request or a stop took over before this one installed
    Superseded,
    /// Device or buffer failure; already logged
    Failed,
}

/// Token a request compares against at every suspension point
#[derive(Debug, Clone, Copy)]
enum Freshness {
    /// Direct request; current while the controller epoch is unchanged
    Request(u64),
    /// Sequence or one-off wait; current while its generation is unchanged
    Sequence(u64),
}

struct Inner {
    catalog: Arc<ClipCatalog>,
    buffers: Arc<BufferStore>,
    device: Arc<dyn AudioDevice>,
    filter: SharedFilter,
    slot: Mutex<OutputSlot>,
    epoch: AtomicU64,
    sequence: SequenceState,
    events: EventBus,
    /// Set once a device failure has been reported; cleared on recovery
    device_failed: AtomicBool,
}

/// Coordinates clip requests onto the output device
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    pub fn new(
        catalog: Arc<ClipCatalog>,
        buffers: Arc<BufferStore>,
        device: Arc<dyn AudioDevice>,
        filter: SharedFilter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                buffers,
                device,
                filter,
                slot: Mutex::new(OutputSlot::default()),
                epoch: AtomicU64::new(0),
                sequence: SequenceState::default(),
                events: EventBus::default(),
                device_failed: AtomicBool::new(false),
            }),
        }
    }

    /// Play one randomly chosen segment of `name`
    ///
    /// Whatever is sounding stops immediately, and a running sequence is
    /// stopped first. Failures are logged and reported through the outcome;
    /// they never surface as errors.
    ///
    /// `Started` is emitted only after the new handle has begun and been
    /// installed. Subscribers therefore see `Interrupted` for the replaced
    /// clip first, then `Started`, then the new clip's `Ended`. A segment the
    /// device fails to begin is never announced.
    pub async fn play(&self, name: &str) -> PlayOutcome {
        if self.inner.sequence.request_stop() {
            info!("Direct play of '{}' stops the running sequence", name);
        }

        let epoch = self.inner.begin_request();
        let filter = self.inner.filter.get();
        self.inner
            .play_segment(name, &filter, Freshness::Request(epoch), None)
            .await
    }

    /// Stop the sequence and whatever is sounding
    pub fn stop(&self) {
        if self.inner.sequence.request_stop() {
            info!("Sequence stopped");
        }

        let mut slot = self.inner.lock_slot();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(clip) = slot.release() {
            debug!("Stopped '{}'", clip);
        }
        self.inner.events.emit(PlaybackEvent::Stopped);
    }

    /// Subscribe to playback notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    pub fn filter(&self) -> FileFilter {
        self.inner.filter.get()
    }

    /// Change the filter; applies from the next request onwards
    pub fn set_filter(&self, filter: FileFilter) {
        info!("File filter: {}", filter);
        self.inner.filter.set(filter);
    }

    pub fn shared_filter(&self) -> SharedFilter {
        self.inner.filter.clone()
    }

    pub fn catalog(&self) -> &Arc<ClipCatalog> {
        &self.inner.catalog
    }

    pub fn buffers(&self) -> &Arc<BufferStore> {
        &self.inner.buffers
    }

    /// Clip of the installed handle, if any
    pub fn current_clip(&self) -> Option<String> {
        self.inner.lock_slot().current_clip().map(str::to_string)
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock_slot().is_occupied()
    }

    pub fn is_sequence_running(&self) -> bool {
        self.inner.sequence.is_running()
    }

    pub(crate) fn sequence(&self) -> &SequenceState {
        &self.inner.sequence
    }

    /// Play one segment of `name` under sequence `generation` and wait for it
    pub(crate) async fn play_and_wait(
        &self,
        name: &str,
        filter: &FileFilter,
        generation: u64,
    ) -> Completion {
        if !self.inner.sequence.is_valid(generation) {
            return Completion::Interrupted;
        }

        self.inner.begin_request();
        let (done_tx, done_rx) = oneshot::channel();
        let outcome = self
            .inner
            .play_segment(name, filter, Freshness::Sequence(generation), Some(done_tx))
            .await;

        match outcome {
            // Sender dropped unfired: the handle was released first
            PlayOutcome::Started => match done_rx.await {
                Ok(()) => Completion::Finished,
                Err(_) => Completion::Interrupted,
            },
            PlayOutcome::Superseded => Completion::Interrupted,
            PlayOutcome::NothingPlayable | PlayOutcome::Failed => Completion::Skipped,
        }
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, OutputSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_fresh(&self, freshness: Freshness) -> bool {
        match freshness {
            Freshness::Request(epoch) => self.epoch.load(Ordering::SeqCst) == epoch,
            Freshness::Sequence(generation) => self.sequence.is_valid(generation),
        }
    }

    /// Silence the slot and take a new epoch in one step
    fn begin_request(&self) -> u64 {
        let mut slot = self.lock_slot();
        if let Some(clip) = slot.release() {
            debug!("Interrupted '{}'", clip);
            self.events.emit(PlaybackEvent::Interrupted { clip });
        }
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn play_segment(
        self: &Arc<Self>,
        name: &str,
        filter: &FileFilter,
        freshness: Freshness,
        waiter: Option<oneshot::Sender<()>>,
    ) -> PlayOutcome {
        let candidates = self.catalog.segments_for(name, filter);
        let Some(segment) = pick_random(&candidates).cloned() else {
            debug!("Nothing playable for '{}' (filter: {})", name, filter);
            return PlayOutcome::NothingPlayable;
        };

        if let Err(e) = self.device.resume_if_suspended().await {
            self.report_device_error(&e);
            return PlayOutcome::Failed;
        }
        self.device_failed.store(false, Ordering::SeqCst);

        if !self.is_fresh(freshness) {
            debug!("Request for '{}' superseded during device resume", name);
            return PlayOutcome::Superseded;
        }

        let buffer = match self.buffers.get(&segment.file).await {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Cannot play '{}': {}", name, e);
                return PlayOutcome::Failed;
            }
        };

        if !self.is_fresh(freshness) {
            debug!("Request for '{}' superseded while loading {}", name, segment.file);
            return PlayOutcome::Superseded;
        }

        let mut slot = self.lock_slot();
        if !self.is_fresh(freshness) {
            debug!("Request for '{}' superseded before install", name);
            return PlayOutcome::Superseded;
        }
        if let Some(previous) = slot.release() {
            self.events.emit(PlaybackEvent::Interrupted { clip: previous });
        }

        let serial = slot.next_serial();
        let on_complete = completion_callback(Arc::downgrade(self), serial, waiter);
        let mut handle = match self.device.create_handle(
            buffer,
            segment.start_offset(),
            segment.length(),
            on_complete,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot play '{}': {}", name, e);
                return PlayOutcome::Failed;
            }
        };
        if let Err(e) = handle.begin() {
            handle.release();
            self.report_device_error(&e);
            return PlayOutcome::Failed;
        }

        slot.install(ActiveHandle {
            serial,
            clip: name.to_string(),
            handle,
        });
        self.events.emit(PlaybackEvent::Started {
            clip: name.to_string(),
        });
        drop(slot);

        log_started(name, &segment);
        PlayOutcome::Started
    }

    /// Natural end of handle `serial`; no-op unless it is still installed
    fn finish(&self, serial: u64) -> bool {
        let mut slot = self.lock_slot();
        let Some(mut finished) = slot.take_if(serial) else {
            trace!("Completion of replaced handle {} ignored", serial);
            return false;
        };
        finished.handle.release();
        debug!("Finished '{}'", finished.clip);
        self.events.emit(PlaybackEvent::Ended {
            clip: finished.clip,
        });
        true
    }

    fn report_device_error(&self, e: &Error) {
        if self.device_failed.swap(true, Ordering::SeqCst) {
            debug!("Audio device still unavailable: {}", e);
            return;
        }
        error!("Audio device unavailable: {}", e);
        self.events.emit(PlaybackEvent::DeviceUnavailable {
            reason: e.to_string(),
        });
    }
}

fn completion_callback(
    inner: Weak<Inner>,
    serial: u64,
    waiter: Option<oneshot::Sender<()>>,
) -> CompletionCallback {
    Box::new(move || {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.finish(serial) {
            if let Some(waiter) = waiter {
                let _ = waiter.send(());
            }
        }
    })
}

fn log_started(name: &str, segment: &Segment) {
    info!(
        "Playing '{}': {} at {:.2}s for {:.2}s",
        name, segment.file, segment.start, segment.duration
    );
}

/// Uniform random pick; keeps the thread-local RNG out of async state
pub(crate) fn pick_random<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::thread_rng())
}
