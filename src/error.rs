use std::time::Duration;

use thiserror::Error;

use crate::hw::DeviceAddress;
use crate::protocol::{EndpointId, endpoint_metadata};

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("BLE adapter index {index} is out of range ({available} available)")]
    AdapterOutOfRange { index: usize, available: usize },
    #[error("peripheral `{address}` has not been seen by a scan")]
    UnknownPeripheral { address: DeviceAddress },
    #[error(
        "required endpoint `{name}` ({uuid}) was not found on the connected device",
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    MissingEndpoint { endpoint: EndpointId },
    #[error("required SPIN endpoints are missing: {missing}")]
    MissingRequiredEndpoints { missing: String },
    #[error(
        "`{name}` returned an empty payload",
        name = endpoint_metadata(*endpoint).name()
    )]
    EmptyPayload { endpoint: EndpointId },
    #[error("the notification stream closed")]
    NotificationStreamClosed,
    #[error("the peripheral is no longer connected")]
    ConnectionLost,
    #[error("{operation} did not complete within {}", humantime::format_duration(*after))]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("fake transport failure: {reason}")]
    Fake { reason: String },
}

impl InteractionError {
    /// Returns whether the error means the device is not a SPIN remote.
    #[must_use]
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            Self::MissingEndpoint { .. } | Self::MissingRequiredEndpoints { .. }
        )
    }
}

/// Errors returned by service calls against connected devices.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no SPIN remote is connected")]
    NoConnectedDevice,
    #[error("{count} SPIN remotes are connected; pass an address")]
    AmbiguousTarget { count: usize },
    #[error("SPIN remote `{address}` is not connected")]
    NotConnected { address: DeviceAddress },
    #[error("invalid profile `{value}`; expected `profile_<0-255>`")]
    InvalidProfileName { value: String },
    #[error(
        "SPIN remote `{address}` has no `{name}` endpoint",
        name = endpoint_metadata(*endpoint).name()
    )]
    EndpointUnavailable {
        address: DeviceAddress,
        endpoint: EndpointId,
    },
    #[error(transparent)]
    Interaction(#[from] InteractionError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("hex payload is invalid")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("unknown fake peripheral kind `{value}`; expected spin, spin-action-only, mismatch or other")]
    InvalidPeripheralKind { value: String },
    #[error("notification fixtures must look like `action:0e` or `profile:02`, got `{value}`")]
    InvalidNotification { value: String },
}

/// Errors returned while loading service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
