use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{self, EndpointId};

/// Stable hardware address of a BLE peripheral.
#[derive(
    Debug,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Creates an address from its textual form.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the textual address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A BLE peripheral seen during a scan.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FoundDevice {
    address: DeviceAddress,
    local_name: Option<String>,
    rssi: Option<i16>,
    service_uuids: Vec<Uuid>,
}

impl FoundDevice {
    pub(crate) fn new(
        address: DeviceAddress,
        local_name: Option<String>,
        rssi: Option<i16>,
        service_uuids: Vec<Uuid>,
    ) -> Self {
        Self {
            address,
            local_name,
            rssi,
            service_uuids,
        }
    }

    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns the advertised service UUIDs.
    #[must_use]
    pub fn service_uuids(&self) -> &[Uuid] {
        &self.service_uuids
    }

    /// Returns whether the advertisement carries the SPIN discovery service.
    #[must_use]
    pub fn advertises_discovery_signature(&self) -> bool {
        let discovery = protocol::endpoint_metadata(EndpointId::DiscoveryService).uuid();
        self.service_uuids.contains(&discovery)
    }
}

/// A characteristic discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicInfo {
    uuid: Uuid,
    properties: Vec<String>,
}

impl CharacteristicInfo {
    pub(crate) fn new(uuid: Uuid, properties: Vec<String>) -> Self {
        Self { uuid, properties }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns property labels such as `read` or `notify`.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

/// A GATT service with discovered characteristics.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServiceInfo {
    uuid: Uuid,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub(crate) fn new(uuid: Uuid, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }
}

/// One value pushed by a peripheral, already routed to its characteristic.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    endpoint: EndpointId,
    payload: Vec<u8>,
}

impl Notification {
    #[must_use]
    pub fn new(endpoint: EndpointId, payload: Vec<u8>) -> Self {
        Self { endpoint, payload }
    }

    #[must_use]
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn discovery_signature_is_detected_from_advertised_services() {
        let discovery = protocol::endpoint_metadata(EndpointId::DiscoveryService).uuid();
        let spin = FoundDevice::new("AA:BB".into(), None, None, vec![discovery]);
        let other = FoundDevice::new("CC:DD".into(), None, None, Vec::new());

        assert_eq!(true, spin.advertises_discovery_signature());
        assert_eq!(false, other.advertises_discovery_signature());
    }
}
