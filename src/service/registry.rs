use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_with::SerializeDisplay;
use strum_macros::{Display, EnumIter};
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::hw::{BleSession, DeviceAddress, FoundDevice, SpinEndpoints};

/// Lifecycle state of a SPIN remote.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, SerializeDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceState {
    Discovered,
    Connecting,
    Subscribing,
    Connected,
    /// Retryable on the next discovery pass.
    Disconnected,
}

impl DeviceState {
    /// Returns whether a connection attempt or session owns the device.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Subscribing | Self::Connected)
    }
}

/// Point-in-time view of one registered device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    address: DeviceAddress,
    local_name: Option<String>,
    state: DeviceState,
    profile: u8,
    generation: u64,
    last_error: Option<String>,
}

impl DeviceSnapshot {
    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Returns the last profile observed from a read, write or notification.
    #[must_use]
    pub fn profile(&self) -> u8 {
        self.profile
    }

    /// Returns the connection attempt counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the most recent transport or protocol failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// What a discovery pass should do with a seen peripheral.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Observation {
    /// First sighting of a SPIN remote; now registered as discovered.
    Registered,
    /// Known device that is idle and should be reconnected.
    Reconnect,
    /// Known device already owned by a connection attempt or session.
    Active,
    /// Not a SPIN remote.
    Ignored,
}

/// Claim on a device for one connection attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct ConnectAttempt {
    pub(crate) prior: DeviceState,
    pub(crate) generation: u64,
}

/// A connected device resolved as a command target.
#[derive(Debug, Clone)]
pub(crate) struct ConnectedTarget {
    pub(crate) address: DeviceAddress,
    pub(crate) session: Arc<dyn BleSession>,
    pub(crate) endpoints: SpinEndpoints,
}

#[derive(Debug)]
struct DeviceRecord {
    local_name: Option<String>,
    state: DeviceState,
    profile: u8,
    session: Option<Arc<dyn BleSession>>,
    endpoints: Option<SpinEndpoints>,
    generation: u64,
    last_error: Option<String>,
    cancel: Option<CancellationToken>,
}

impl DeviceRecord {
    fn discovered(local_name: Option<String>) -> Self {
        Self {
            local_name,
            state: DeviceState::Discovered,
            profile: 0,
            session: None,
            endpoints: None,
            generation: 0,
            last_error: None,
            cancel: None,
        }
    }

    fn snapshot(&self, address: &DeviceAddress) -> DeviceSnapshot {
        DeviceSnapshot {
            address: address.clone(),
            local_name: self.local_name.clone(),
            state: self.state,
            profile: self.profile,
            generation: self.generation,
            last_error: self.last_error.clone(),
        }
    }
}

/// Address-keyed table of every SPIN remote seen since startup.
///
/// Each method takes the lock once and never holds it across an await.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceRegistry {
    devices: Arc<Mutex<HashMap<DeviceAddress, DeviceRecord>>>,
}

impl DeviceRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<DeviceAddress, DeviceRecord>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a scan sighting and classifies it.
    pub(crate) fn observe(&self, found: &FoundDevice) -> Observation {
        let mut devices = self.lock();
        if let Some(record) = devices.get_mut(found.address()) {
            if let Some(name) = found.local_name() {
                record.local_name = Some(name.to_string());
            }
            return if record.state.is_active() {
                Observation::Active
            } else {
                Observation::Reconnect
            };
        }

        if !found.advertises_discovery_signature() {
            return Observation::Ignored;
        }
        devices.insert(
            found.address().clone(),
            DeviceRecord::discovered(found.local_name().map(str::to_string)),
        );
        Observation::Registered
    }

    /// Moves an idle device to `Connecting` under a fresh generation.
    ///
    /// Returns `None` when the device is unknown or already active.
    pub(crate) fn try_begin_connect(&self, address: &DeviceAddress) -> Option<ConnectAttempt> {
        let mut devices = self.lock();
        let record = devices.get_mut(address)?;
        if record.state.is_active() {
            return None;
        }
        let attempt = ConnectAttempt {
            prior: record.state,
            generation: record.generation + 1,
        };
        record.generation = attempt.generation;
        record.state = DeviceState::Connecting;
        Some(attempt)
    }

    /// Sets `state` if `generation` is still current.
    pub(crate) fn advance(
        &self,
        address: &DeviceAddress,
        generation: u64,
        state: DeviceState,
    ) -> bool {
        let mut devices = self.lock();
        match devices.get_mut(address) {
            Some(record) if record.generation == generation => {
                record.state = state;
                true
            }
            _ => false,
        }
    }

    /// Ends an attempt or session in `state`, recording `error` when given.
    ///
    /// Returns whether the device was still on `generation`. The session
    /// handle and cancel token are dropped either way for a current generation.
    pub(crate) fn finish(
        &self,
        address: &DeviceAddress,
        generation: u64,
        state: DeviceState,
        error: Option<String>,
    ) -> bool {
        let mut devices = self.lock();
        let Some(record) = devices.get_mut(address) else {
            return false;
        };
        if record.generation != generation {
            return false;
        }
        record.state = state;
        record.session = None;
        record.endpoints = None;
        record.cancel = None;
        if error.is_some() {
            record.last_error = error;
        }
        true
    }

    /// Stores the session of a completed attempt and marks the device connected.
    pub(crate) fn mark_connected(
        &self,
        address: &DeviceAddress,
        generation: u64,
        session: Arc<dyn BleSession>,
        endpoints: SpinEndpoints,
        cancel: CancellationToken,
    ) -> bool {
        let mut devices = self.lock();
        match devices.get_mut(address) {
            Some(record) if record.generation == generation => {
                record.state = DeviceState::Connected;
                record.session = Some(session);
                record.endpoints = Some(endpoints);
                record.cancel = Some(cancel);
                record.last_error = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_profile(&self, address: &DeviceAddress, profile: u8) {
        if let Some(record) = self.lock().get_mut(address) {
            record.profile = profile;
        }
    }

    /// Returns the per-device cancel token of a connected device.
    pub(crate) fn cancel_token(&self, address: &DeviceAddress) -> Option<CancellationToken> {
        self.lock()
            .get(address)
            .filter(|record| record.state == DeviceState::Connected)
            .and_then(|record| record.cancel.clone())
    }

    /// Resolves the device a command should go to.
    ///
    /// An explicit address must be connected. Without one, exactly one
    /// device must be connected.
    pub(crate) fn resolve_target(
        &self,
        address: Option<&DeviceAddress>,
    ) -> Result<ConnectedTarget, ServiceError> {
        let devices = self.lock();
        let target = |address: &DeviceAddress, record: &DeviceRecord| {
            match (record.state, &record.session, record.endpoints) {
                (DeviceState::Connected, Some(session), Some(endpoints)) => Some(ConnectedTarget {
                    address: address.clone(),
                    session: Arc::clone(session),
                    endpoints,
                }),
                _ => None,
            }
        };

        if let Some(address) = address {
            return devices
                .get(address)
                .and_then(|record| target(address, record))
                .ok_or_else(|| ServiceError::NotConnected {
                    address: address.clone(),
                });
        }

        let mut connected = devices
            .iter()
            .filter_map(|(address, record)| target(address, record));
        match (connected.next(), connected.next()) {
            (None, _) => Err(ServiceError::NoConnectedDevice),
            (Some(target), None) => Ok(target),
            (Some(_first), Some(_second)) => Err(ServiceError::AmbiguousTarget {
                count: 2 + connected.count(),
            }),
        }
    }

    /// Returns every registered device ordered by address.
    pub(crate) fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let devices = self.lock();
        let mut snapshots: Vec<_> = devices
            .iter()
            .map(|(address, record)| record.snapshot(address))
            .collect();
        snapshots.sort_by(|left, right| left.address.cmp(&right.address));
        snapshots
    }

    pub(crate) fn get(&self, address: &DeviceAddress) -> Option<DeviceSnapshot> {
        self.lock()
            .get(address)
            .map(|record| record.snapshot(address))
    }
}
