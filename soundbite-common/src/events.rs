//! Playback notifications
//!
//! Emitted by the playback controller and consumed by whatever front end is
//! attached (console driver, UI adapter). Delivery is best effort: a front end
//! that is not subscribed simply misses them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notifications emitted by the playback core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// A clip was committed to the output; front ends highlight it
    Started {
        /// Clip name
        clip: String,
    },

    /// A clip's segment reached its natural end
    Ended {
        /// Clip name
        clip: String,
    },

    /// A sounding clip was cut off by a newer play request
    Interrupted {
        /// Clip name
        clip: String,
    },

    /// Playback was stopped explicitly; front ends clear every highlight
    Stopped,

    /// The output device could not be started
    ///
    /// Emitted once per outage; cleared by the next successful resume.
    DeviceUnavailable {
        /// Device error text
        reason: String,
    },
}

impl PlaybackEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Started",
            PlaybackEvent::Ended { .. } => "Ended",
            PlaybackEvent::Interrupted { .. } => "Interrupted",
            PlaybackEvent::Stopped => "Stopped",
            PlaybackEvent::DeviceUnavailable { .. } => "DeviceUnavailable",
        }
    }

    /// Clip the event refers to, if any
    pub fn clip(&self) -> Option<&str> {
        match self {
            PlaybackEvent::Started { clip }
            | PlaybackEvent::Ended { clip }
            | PlaybackEvent::Interrupted { clip } => Some(clip),
            PlaybackEvent::Stopped | PlaybackEvent::DeviceUnavailable { .. } => None,
        }
    }
}

/// Event distribution bus backed by `tokio::sync::broadcast`
///
/// Publishing never blocks; slow subscribers observe `Lagged` instead of
/// holding up the producer.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers that received it
    pub fn emit(&self, event: PlaybackEvent) -> usize {
        // No receivers is OK
        self.tx.send(event).unwrap_or(0)
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
