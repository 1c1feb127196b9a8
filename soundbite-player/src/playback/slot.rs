//! The single output slot
//!
//! At most one handle is ever installed. The controller guards the slot with a
//! `std::sync::Mutex` and never holds that lock across an await.

use crate::audio::device::PlaybackHandle;
use tracing::trace;

/// The installed handle and the clip it is playing
pub(crate) struct ActiveHandle {
    pub serial: u64,
    pub clip: String,
    pub handle: Box<dyn PlaybackHandle>,
}

#[derive(Default)]
pub(crate) struct OutputSlot {
    active: Option<ActiveHandle>,
    next_serial: u64,
}

impl OutputSlot {
    /// Serial for the next installed handle
    pub fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Stop and release whatever is installed, returning its clip name
    pub fn release(&mut self) -> Option<String> {
        let mut active = self.active.take()?;
        trace!("Releasing handle {} ({})", active.serial, active.clip);
        active.handle.stop();
        active.handle.release();
        Some(active.clip)
    }

    /// Install a started handle; the slot must be empty
    pub fn install(&mut self, active: ActiveHandle) {
        debug_assert!(self.active.is_none(), "output slot already occupied");
        self.active = Some(active);
    }

    /// Remove the installed handle if it is still `serial`
    pub fn take_if(&mut self, serial: u64) -> Option<ActiveHandle> {
        if self.active.as_ref().map(|a| a.serial) == Some(serial) {
            self.active.take()
        } else {
            None
        }
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.clip.as_str())
    }

    pub fn is_occupied(&self) -> bool {
        self.active.is_some()
    }
}
