use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use uuid::{Uuid, uuid};

/// Number of slots in the SPIN action code table.
pub(crate) const ACTION_CODE_COUNT: usize = 25;

/// Known SPIN SDC 1 GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Service advertised by SPIN remotes, used to recognise them during a scan.
    #[strum(to_string = "discovery_service")]
    DiscoveryService,
    /// Primary SPIN service holding the control characteristics.
    #[strum(to_string = "spin_service")]
    SpinService,
    /// Characteristic accepting command-channel writes (arm, LED colour).
    #[strum(to_string = "command_characteristic")]
    CommandCharacteristic,
    /// Characteristic notifying single-byte action codes.
    #[strum(to_string = "action_characteristic")]
    ActionCharacteristic,
    /// Characteristic holding the active profile id.
    #[strum(to_string = "profile_id_characteristic")]
    ProfileIdCharacteristic,
    /// Standard client characteristic configuration descriptor.
    #[strum(to_string = "client_characteristic_config")]
    ClientCharacteristicConfig,
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    #[strum(to_string = "service")]
    Service,
    #[strum(to_string = "characteristic")]
    Characteristic,
    #[strum(to_string = "descriptor")]
    Descriptor,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: Uuid,
    kind: EndpointKind,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID.
    pub(crate) fn uuid(self) -> Uuid {
        self.uuid
    }

    /// Endpoint kind.
    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }
}

/// Endpoint metadata keyed by typed endpoint IDs.
pub(crate) static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> =
    LazyLock::new(|| {
        EndpointId::iter()
            .map(|endpoint| (endpoint, metadata_for(endpoint)))
            .collect()
    });

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Resolves a characteristic UUID to a known endpoint.
///
/// Service and descriptor UUIDs are not matched so that notification routing
/// can only ever land on a characteristic.
pub(crate) fn characteristic_for_uuid(uuid: Uuid) -> Option<EndpointId> {
    EndpointId::iter().find(|endpoint| {
        let metadata = endpoint_metadata(*endpoint);
        metadata.kind() == EndpointKind::Characteristic && metadata.uuid() == uuid
    })
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::DiscoveryService => EndpointMetadata {
            name: "SPIN discovery service",
            uuid: uuid!("9dfaca9d-7801-22a0-9540-f0bb65e824fc"),
            kind: EndpointKind::Service,
        },
        EndpointId::SpinService => EndpointMetadata {
            name: "SPIN control service",
            uuid: uuid!("5e5a10d3-6ec7-17af-d743-3cf1679c1cc7"),
            kind: EndpointKind::Service,
        },
        EndpointId::CommandCharacteristic => EndpointMetadata {
            name: "SPIN command",
            uuid: uuid!("92e92b18-fa20-d486-5e43-099387c61a71"),
            kind: EndpointKind::Characteristic,
        },
        EndpointId::ActionCharacteristic => EndpointMetadata {
            name: "SPIN action",
            uuid: uuid!("182bec1f-51a4-458e-4b48-c431ea701a3b"),
            kind: EndpointKind::Characteristic,
        },
        EndpointId::ProfileIdCharacteristic => EndpointMetadata {
            name: "SPIN profile id",
            uuid: uuid!("703fe135-0056-7398-1c4f-42e1636c2fd8"),
            kind: EndpointKind::Characteristic,
        },
        EndpointId::ClientCharacteristicConfig => EndpointMetadata {
            name: "client characteristic configuration",
            uuid: uuid!("00002902-0000-1000-8000-00805f9b34fb"),
            kind: EndpointKind::Descriptor,
        },
    }
}
