//! Sequence player
//!
//! Plays random clips back to back: pick a name from the filtered pool, play
//! one segment, wait for its natural end, pause briefly, repeat. A stop or a
//! direct play ends the run.
//!
//! Each run gets a generation number. Requests made by the run carry that
//! generation as their freshness token, so ending the run invalidates them.
//! A one-off wait outside a run takes a generation of its own without
//! setting the run flag.

use crate::catalog::FileFilter;
use crate::playback::controller::{pick_random, PlaybackController};
use crate::playback::filter::FilterProvider;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How a sequence step's clip ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Played out to its natural end
    Finished,
    /// Released before its end (stop, direct play)
    Interrupted,
    /// Nothing could be played
    Skipped,
}

/// Why [`SequencePlayer::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceExit {
    Stopped,
    /// No clip matches the filter
    PoolEmpty,
    /// Another run was already active
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    generation: u64,
}

/// Run flag and generation shared by the controller and the sequence loop
#[derive(Debug, Default)]
pub(crate) struct SequenceState {
    state: Mutex<RunState>,
    wake: Notify,
}

impl SequenceState {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a run; `None` if one is already active
    pub fn try_start(&self) -> Option<u64> {
        let mut state = self.lock();
        if state.running {
            return None;
        }
        state.running = true;
        state.generation += 1;
        Some(state.generation)
    }

    /// End the active run, if any; returns whether one was running
    pub fn request_stop(&self) -> bool {
        let was_running = {
            let mut state = self.lock();
            state.generation += 1;
            std::mem::replace(&mut state.running, false)
        };
        self.wake.notify_waiters();
        was_running
    }

    /// Generation for a one-off wait: the active run's if there is one,
    /// otherwise a fresh one that leaves the run flag clear
    pub fn join_or_advance(&self) -> u64 {
        let mut state = self.lock();
        if !state.running {
            state.generation += 1;
        }
        state.generation
    }

    /// Whether `generation` is still the active run
    pub fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.running && state.generation == generation
    }

    /// Whether requests tagged with `generation` may still play
    pub fn is_valid(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Clear the run flag if `generation` is still the active run
    pub fn finish(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation {
            state.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }
}

/// Ends the run when the loop exits, including when its task is dropped
struct RunGuard<'a> {
    state: &'a SequenceState,
    generation: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.finish(self.generation);
    }
}

/// Continuous random playback on top of a [`PlaybackController`]
#[derive(Clone)]
pub struct SequencePlayer {
    controller: PlaybackController,
    pause: Duration,
}

impl SequencePlayer {
    pub fn new(controller: PlaybackController, pause: Duration) -> Self {
        Self { controller, pause }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    /// Whether a [`run`](Self::run) loop is active
    ///
    /// A [`play_one_and_wait`](Self::play_one_and_wait) outside a run does
    /// not count.
    pub fn is_running(&self) -> bool {
        self.controller.sequence().is_running()
    }

    /// Play one segment of `name` and wait until it ends
    ///
    /// Joins the active run if there is one. Otherwise the wait is on its own:
    /// `stop`, a direct play, a newer one-off wait or a new run interrupts it.
    pub async fn play_one_and_wait(&self, name: &str) -> Completion {
        let generation = self.controller.sequence().join_or_advance();
        let filter = self.controller.filter();
        self.controller.play_and_wait(name, &filter, generation).await
    }

    /// Loop over random clips until stopped or the pool is empty
    pub async fn run<P: FilterProvider>(&self, filter: P) -> SequenceExit {
        let state = self.controller.sequence();
        let Some(generation) = state.try_start() else {
            debug!("Sequence already running");
            return SequenceExit::AlreadyRunning;
        };
        let _guard = RunGuard { state, generation };

        info!("Sequence started");
        let exit = self.run_loop(&filter, generation).await;
        info!("Sequence ended: {:?}", exit);
        exit
    }

    /// [`run`](Self::run) on its own task
    pub fn spawn<P>(&self, filter: P) -> JoinHandle<SequenceExit>
    where
        P: FilterProvider + 'static,
    {
        let player = self.clone();
        tokio::spawn(async move { player.run(filter).await })
    }

    /// End the run and silence the output
    pub fn stop(&self) {
        self.controller.sequence().request_stop();
        self.controller.stop();
    }

    async fn run_loop<P: FilterProvider>(&self, provider: &P, generation: u64) -> SequenceExit {
        let state = self.controller.sequence();

        loop {
            if !state.is_current(generation) {
                return SequenceExit::Stopped;
            }

            let filter = provider.current();
            let Some(name) = self.pick_name(&filter) else {
                info!("No clips match filter {}", filter);
                return SequenceExit::PoolEmpty;
            };

            let completion = self
                .controller
                .play_and_wait(&name, &filter, generation)
                .await;
            debug!("Sequence clip '{}': {:?}", name, completion);

            let woken = state.wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            if !state.is_current(generation) {
                return SequenceExit::Stopped;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.pause) => {}
                _ = woken => {}
            }
        }
    }

    fn pick_name(&self, filter: &FileFilter) -> Option<String> {
        let names = self.controller.catalog().names(filter);
        pick_random(&names).cloned()
    }
}
