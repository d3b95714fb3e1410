use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument};

use super::hardware::{BleSession, BleTransport, WriteMode};
use super::model::{CharacteristicInfo, DeviceAddress, FoundDevice, Notification, ServiceInfo};
use crate::error::{FixtureError, InteractionError};
use crate::handlers::{Command, CommandCodec};
use crate::protocol::{self, EndpointId};

/// GATT layout a fake peripheral exposes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum FakePeripheralKind {
    /// Advertises the discovery service and exposes every SPIN characteristic.
    #[default]
    Spin,
    /// SPIN remote without profile or command characteristics.
    SpinActionOnly,
    /// Advertises the discovery service but lacks the SPIN service.
    Mismatch,
    /// Unrelated peripheral.
    Other,
}

impl FromStr for FakePeripheralKind {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "spin" => Ok(Self::Spin),
            "spin-action-only" => Ok(Self::SpinActionOnly),
            "mismatch" => Ok(Self::Mismatch),
            "other" => Ok(Self::Other),
            _ => Err(FixtureError::InvalidPeripheralKind {
                value: value.to_string(),
            }),
        }
    }
}

/// A notification scripted into a fake session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FakeNotification {
    Value(Notification),
    /// Fails the next wait as if the link dropped.
    TransportError,
}

impl FakeNotification {
    /// An action-characteristic notification carrying `code`.
    #[must_use]
    pub fn action(code: u8) -> Self {
        Self::Value(Notification::new(
            EndpointId::ActionCharacteristic,
            vec![code],
        ))
    }

    /// A profile-characteristic notification carrying `profile`.
    #[must_use]
    pub fn profile(profile: u8) -> Self {
        Self::Value(Notification::new(
            EndpointId::ProfileIdCharacteristic,
            vec![profile],
        ))
    }
}

impl FromStr for FakeNotification {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value == "error" {
            return Ok(Self::TransportError);
        }

        let invalid = || FixtureError::InvalidNotification {
            value: value.to_string(),
        };
        let (kind, payload) = value.split_once(':').ok_or_else(invalid)?;
        let endpoint = match kind {
            "action" => EndpointId::ActionCharacteristic,
            "profile" => EndpointId::ProfileIdCharacteristic,
            _ => return Err(invalid()),
        };
        let payload = hex::decode(payload)?;
        Ok(Self::Value(Notification::new(endpoint, payload)))
    }
}

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    peripherals: Vec<FakePeripheral>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }

        let peripherals = value
            .split(';')
            .map(parse_scan_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { peripherals })
    }
}

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, derive_more::Into)]
pub struct NotificationPayloads {
    notifications: Vec<FakeNotification>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self {
                notifications: Vec::new(),
            });
        }
        let notifications = value
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { notifications })
    }
}

/// One scripted peripheral.
#[derive(Debug, Clone, Builder)]
pub struct FakePeripheral {
    #[builder(into)]
    address: DeviceAddress,
    #[builder(into)]
    local_name: Option<String>,
    rssi: Option<i16>,
    #[builder(default)]
    kind: FakePeripheralKind,
    /// Value returned by the first profile read.
    #[builder(default)]
    profile: u8,
    /// Delivered in order once the session opens.
    #[builder(default)]
    notifications: Vec<FakeNotification>,
    /// Number of connection attempts that fail before one succeeds.
    #[builder(default)]
    connect_failures: usize,
    #[builder(default)]
    fail_writes: bool,
}

impl FakePeripheral {
    /// A full SPIN remote with default settings.
    #[must_use]
    pub fn spin(address: &str) -> Self {
        Self::builder()
            .address(address)
            .local_name("SPIN remote")
            .build()
    }

    /// Replaces the initial profile value.
    #[must_use]
    pub fn with_profile(mut self, profile: u8) -> Self {
        self.profile = profile;
        self
    }

    /// Replaces the scripted notifications.
    #[must_use]
    pub fn with_notifications(mut self, notifications: Vec<FakeNotification>) -> Self {
        self.notifications = notifications;
        self
    }

    #[must_use]
    pub fn kind(&self) -> FakePeripheralKind {
        self.kind
    }

    fn found_device(&self) -> FoundDevice {
        let advertised = match self.kind {
            FakePeripheralKind::Other => Vec::new(),
            _ => vec![protocol::endpoint_metadata(EndpointId::DiscoveryService).uuid()],
        };
        FoundDevice::new(
            self.address.clone(),
            self.local_name.clone(),
            self.rssi,
            advertised,
        )
    }

    fn services(&self) -> Vec<ServiceInfo> {
        let characteristics = match self.kind {
            FakePeripheralKind::Spin => vec![
                characteristic(EndpointId::ActionCharacteristic, &["read", "notify"]),
                characteristic(
                    EndpointId::ProfileIdCharacteristic,
                    &["read", "write", "notify"],
                ),
                characteristic(EndpointId::CommandCharacteristic, &["write"]),
            ],
            FakePeripheralKind::SpinActionOnly => vec![characteristic(
                EndpointId::ActionCharacteristic,
                &["read", "notify"],
            )],
            FakePeripheralKind::Mismatch | FakePeripheralKind::Other => return Vec::new(),
        };

        vec![ServiceInfo::new(
            protocol::endpoint_metadata(EndpointId::SpinService).uuid(),
            characteristics,
        )]
    }
}

/// Settings for constructing a fake BLE backend.
#[derive(Debug, Clone, Builder)]
pub struct FakeBackendConfig {
    peripherals: Vec<FakePeripheral>,
    #[builder(default)]
    scan_delay: Duration,
    #[builder(default)]
    connect_delay: Duration,
}

/// One write observed by the fake backend.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedWrite {
    pub characteristic: EndpointId,
    pub descriptor: Option<EndpointId>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct FakeLog {
    scans: usize,
    connects: HashMap<DeviceAddress, usize>,
    disconnects: HashMap<DeviceAddress, usize>,
    writes: HashMap<DeviceAddress, Vec<RecordedWrite>>,
    injectors: HashMap<DeviceAddress, mpsc::UnboundedSender<FakeNotification>>,
}

/// Inspection and injection handle shared with a [`FakeBackend`].
#[derive(Debug, Clone, Default)]
pub struct FakeHandle {
    log: Arc<Mutex<FakeLog>>,
}

impl FakeHandle {
    fn lock(&self) -> MutexGuard<'_, FakeLog> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of scans started so far.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.lock().scans
    }

    /// Number of connection attempts made against `address`.
    #[must_use]
    pub fn connect_count(&self, address: &str) -> usize {
        self.lock()
            .connects
            .get(&DeviceAddress::from(address))
            .copied()
            .unwrap_or(0)
    }

    /// Number of sessions to `address` that were closed.
    #[must_use]
    pub fn disconnect_count(&self, address: &str) -> usize {
        self.lock()
            .disconnects
            .get(&DeviceAddress::from(address))
            .copied()
            .unwrap_or(0)
    }

    /// Every write made against `address`, in order.
    #[must_use]
    pub fn writes(&self, address: &str) -> Vec<RecordedWrite> {
        self.lock()
            .writes
            .get(&DeviceAddress::from(address))
            .cloned()
            .unwrap_or_default()
    }

    /// Writes against `address` decoded back into commands.
    ///
    /// Descriptor writes count only when they enable action notifications.
    #[must_use]
    pub fn commands(&self, address: &str) -> Vec<Command> {
        self.writes(address)
            .into_iter()
            .filter_map(|write| match (write.characteristic, write.descriptor) {
                (EndpointId::ActionCharacteristic, Some(_descriptor))
                    if write.payload == CommandCodec::encode_enable_notifications() =>
                {
                    Some(Command::EnableActionNotifications)
                }
                (_characteristic, Some(_descriptor)) => None,
                (characteristic, None) => CommandCodec::decode_write(characteristic, &write.payload),
            })
            .collect()
    }

    /// Pushes a notification into the open session for `address`.
    ///
    /// Returns `false` when no session is open.
    pub fn push_notification(&self, address: &str, notification: FakeNotification) -> bool {
        self.lock()
            .injectors
            .get(&DeviceAddress::from(address))
            .is_some_and(|sender| sender.send(notification).is_ok())
    }
}

/// Fake backend used in tests and non-hardware environments.
#[derive(Debug)]
pub struct FakeBackend {
    peripherals: Vec<FakePeripheral>,
    scan_delay: Duration,
    connect_delay: Duration,
    remaining_failures: Mutex<HashMap<DeviceAddress, usize>>,
    handle: FakeHandle,
}

impl FakeBackend {
    #[must_use]
    pub fn new(config: FakeBackendConfig) -> Self {
        let remaining_failures = config
            .peripherals
            .iter()
            .map(|peripheral| (peripheral.address.clone(), peripheral.connect_failures))
            .collect();

        Self {
            peripherals: config.peripherals,
            scan_delay: config.scan_delay,
            connect_delay: config.connect_delay,
            remaining_failures: Mutex::new(remaining_failures),
            handle: FakeHandle::default(),
        }
    }

    /// Returns a handle observing this backend.
    #[must_use]
    pub fn handle(&self) -> FakeHandle {
        self.handle.clone()
    }

    fn take_connect_failure(&self, address: &DeviceAddress) -> bool {
        let mut remaining = self
            .remaining_failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match remaining.get_mut(address) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl BleTransport for FakeBackend {
    #[instrument(skip(self), level = "debug")]
    async fn scan(&self, timeout: Duration) -> Result<Vec<FoundDevice>, InteractionError> {
        self.handle.lock().scans += 1;
        let delay = self.scan_delay.min(timeout);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        Ok(self
            .peripherals
            .iter()
            .map(FakePeripheral::found_device)
            .collect())
    }

    #[instrument(skip(self), level = "debug", fields(%address))]
    async fn connect(
        &self,
        address: &DeviceAddress,
    ) -> Result<Arc<dyn BleSession>, InteractionError> {
        *self
            .handle
            .lock()
            .connects
            .entry(address.clone())
            .or_default() += 1;

        if !self.connect_delay.is_zero() {
            sleep(self.connect_delay).await;
        }

        let peripheral = self
            .peripherals
            .iter()
            .find(|peripheral| &peripheral.address == address)
            .ok_or_else(|| InteractionError::UnknownPeripheral {
                address: address.clone(),
            })?;

        if self.take_connect_failure(address) {
            return Err(InteractionError::Fake {
                reason: format!("scripted connect failure for {address}"),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        for notification in &peripheral.notifications {
            let _ = sender.send(notification.clone());
        }
        self.handle.lock().injectors.insert(address.clone(), sender);

        Ok(Arc::new(FakeSession {
            address: address.clone(),
            services: peripheral.services(),
            profile: Mutex::new(peripheral.profile),
            fail_writes: peripheral.fail_writes,
            receiver: tokio::sync::Mutex::new(receiver),
            handle: self.handle.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeSession {
    address: DeviceAddress,
    services: Vec<ServiceInfo>,
    profile: Mutex<u8>,
    fail_writes: bool,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeNotification>>,
    handle: FakeHandle,
}

impl FakeSession {
    fn ensure_endpoint(&self, endpoint: EndpointId) -> Result<(), InteractionError> {
        let uuid = protocol::endpoint_metadata(endpoint).uuid();
        let present = self.services.iter().any(|service| {
            service
                .characteristics()
                .iter()
                .any(|characteristic| characteristic.uuid() == uuid)
        });
        if present {
            Ok(())
        } else {
            Err(InteractionError::MissingEndpoint { endpoint })
        }
    }

    fn set_profile(&self, profile: u8) {
        *self
            .profile
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = profile;
    }

    fn record_write(&self, write: RecordedWrite) -> Result<(), InteractionError> {
        if self.fail_writes {
            return Err(InteractionError::Fake {
                reason: format!("scripted write failure on {}", write.characteristic),
            });
        }
        self.handle
            .lock()
            .writes
            .entry(self.address.clone())
            .or_default()
            .push(write);
        Ok(())
    }
}

#[async_trait]
impl BleSession for FakeSession {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>, InteractionError> {
        Ok(self.services.clone())
    }

    async fn read(&self, endpoint: EndpointId) -> Result<Vec<u8>, InteractionError> {
        self.ensure_endpoint(endpoint)?;
        match endpoint {
            EndpointId::ProfileIdCharacteristic => Ok(vec![
                *self
                    .profile
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
            ]),
            _ => Ok(vec![0x00]),
        }
    }

    async fn write(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        _mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.ensure_endpoint(endpoint)?;
        self.record_write(RecordedWrite {
            characteristic: endpoint,
            descriptor: None,
            payload: payload.to_vec(),
        })?;
        if endpoint == EndpointId::ProfileIdCharacteristic
            && let Some(profile) = CommandCodec::decode_profile_change(payload)
        {
            self.set_profile(profile);
        }
        Ok(())
    }

    async fn write_descriptor(
        &self,
        characteristic: EndpointId,
        descriptor: EndpointId,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.ensure_endpoint(characteristic)?;
        self.record_write(RecordedWrite {
            characteristic,
            descriptor: Some(descriptor),
            payload: payload.to_vec(),
        })
    }

    async fn await_notification(
        &self,
        wait: Duration,
    ) -> Result<Option<Notification>, InteractionError> {
        let mut receiver = self.receiver.lock().await;
        match timeout(wait, receiver.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Err(InteractionError::ConnectionLost),
            Ok(Some(FakeNotification::TransportError)) => Err(InteractionError::ConnectionLost),
            Ok(Some(FakeNotification::Value(notification))) => {
                if notification.endpoint() == EndpointId::ProfileIdCharacteristic
                    && let Some(profile) =
                        CommandCodec::decode_profile_change(notification.payload())
                {
                    self.set_profile(profile);
                }
                Ok(Some(notification))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), InteractionError> {
        let mut log = self.handle.lock();
        log.injectors.remove(&self.address);
        *log.disconnects.entry(self.address.clone()).or_default() += 1;
        debug!(address = %self.address, "fake session closed");
        Ok(())
    }
}

fn characteristic(endpoint: EndpointId, properties: &[&str]) -> CharacteristicInfo {
    CharacteristicInfo::new(
        protocol::endpoint_metadata(endpoint).uuid(),
        properties
            .iter()
            .map(|property| (*property).to_string())
            .collect(),
    )
}

fn parse_scan_record(raw_record: &str) -> Result<FakePeripheral, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = (fields[1] != "-").then(|| fields[1].to_string());
    let rssi = if fields[2] == "-" {
        None
    } else {
        Some(fields[2].parse::<i16>()?)
    };

    Ok(FakePeripheral::builder()
        .address(fields[0])
        .maybe_local_name(local_name)
        .maybe_rssi(rssi)
        .kind(fields[3].parse()?)
        .build())
}
