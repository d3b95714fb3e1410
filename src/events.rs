use std::fmt::Debug;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::debug;

use crate::handlers::ActionCode;
use crate::hw::DeviceAddress;
use crate::service::DeviceState;

/// A gesture performed on a SPIN remote.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct GestureEvent {
    address: DeviceAddress,
    code: u8,
    action: ActionCode,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl GestureEvent {
    #[must_use]
    pub fn new(address: DeviceAddress, code: u8, action: ActionCode, timestamp: OffsetDateTime) -> Self {
        Self {
            address,
            code,
            action,
            timestamp,
        }
    }

    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Returns the raw action byte.
    #[must_use]
    pub fn code(&self) -> u8 {
        self.code
    }

    #[must_use]
    pub fn action(&self) -> ActionCode {
        self.action
    }

    #[must_use]
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

/// A SPIN remote reported or was switched to a new profile.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ProfileChangeEvent {
    address: DeviceAddress,
    profile: u8,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl ProfileChangeEvent {
    #[must_use]
    pub fn new(address: DeviceAddress, profile: u8, timestamp: OffsetDateTime) -> Self {
        Self {
            address,
            profile,
            timestamp,
        }
    }

    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    #[must_use]
    pub fn profile(&self) -> u8 {
        self.profile
    }

    #[must_use]
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

/// A SPIN remote connected or disconnected.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ConnectivityEvent {
    address: DeviceAddress,
    state: DeviceState,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl ConnectivityEvent {
    #[must_use]
    pub fn new(address: DeviceAddress, state: DeviceState, timestamp: OffsetDateTime) -> Self {
        Self {
            address,
            state,
            timestamp,
        }
    }

    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    #[must_use]
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

/// Everything the service reports to its observer.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    Gesture(GestureEvent),
    ProfileChanged(ProfileChangeEvent),
    Connectivity(ConnectivityEvent),
}

impl ServiceEvent {
    /// Returns the address of the device that produced the event.
    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        match self {
            Self::Gesture(event) => event.address(),
            Self::ProfileChanged(event) => event.address(),
            Self::Connectivity(event) => event.address(),
        }
    }
}

/// Receives events produced by the service.
pub trait EventSink: Send + Sync + Debug {
    /// Delivers one event. Must not block.
    fn emit(&self, event: ServiceEvent);
}

/// Event sink forwarding into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ServiceEvent>,
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ServiceEvent) {
        if self.sender.send(event).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}

/// Creates a channel-backed sink and the receiver draining it.
///
/// ```
/// let (sink, mut events) = spin_remote::channel_event_sink();
/// drop(sink);
/// assert!(events.try_recv().is_err());
/// ```
#[must_use]
pub fn channel_event_sink() -> (ChannelEventSink, mpsc::UnboundedReceiver<ServiceEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelEventSink { sender }, receiver)
}
