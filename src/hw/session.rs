use tracing::instrument;

use super::model::{CharacteristicInfo, ServiceInfo};
use crate::error::InteractionError;
use crate::protocol::{self, EndpointId};

/// Characteristics found on the SPIN service of a connected device.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct SpinEndpoints {
    pub(crate) profile: bool,
    pub(crate) command: bool,
}

/// Confirms the connected device exposes the SPIN service and action characteristic.
///
/// The profile and command characteristics are optional; older firmware
/// omits them.
#[instrument(skip(services), level = "debug", fields(service_count = services.len()))]
pub(crate) fn negotiate_session_endpoints(
    services: &[ServiceInfo],
) -> Result<SpinEndpoints, InteractionError> {
    let service_uuid = protocol::endpoint_metadata(EndpointId::SpinService).uuid();
    let Some(service) = services.iter().find(|service| service.uuid() == service_uuid) else {
        return Err(InteractionError::MissingRequiredEndpoints {
            missing: format_missing_endpoints(&[
                EndpointId::SpinService,
                EndpointId::ActionCharacteristic,
            ]),
        });
    };

    let action = find_characteristic(service, EndpointId::ActionCharacteristic);
    if !action.is_some_and(supports_notify) {
        return Err(InteractionError::MissingEndpoint {
            endpoint: EndpointId::ActionCharacteristic,
        });
    }

    Ok(SpinEndpoints {
        profile: find_characteristic(service, EndpointId::ProfileIdCharacteristic).is_some(),
        command: find_characteristic(service, EndpointId::CommandCharacteristic).is_some(),
    })
}

fn find_characteristic(service: &ServiceInfo, endpoint: EndpointId) -> Option<&CharacteristicInfo> {
    let uuid = protocol::endpoint_metadata(endpoint).uuid();
    service
        .characteristics()
        .iter()
        .find(|characteristic| characteristic.uuid() == uuid)
}

fn supports_notify(characteristic: &CharacteristicInfo) -> bool {
    characteristic.properties().iter().any(|property| {
        property.eq_ignore_ascii_case("notify") || property.eq_ignore_ascii_case("indicate")
    })
}

fn format_missing_endpoints(endpoints: &[EndpointId]) -> String {
    endpoints
        .iter()
        .map(|endpoint| {
            let metadata = protocol::endpoint_metadata(*endpoint);
            format!("{} ({})", metadata.name(), metadata.uuid())
        })
        .collect::<Vec<_>>()
        .join(", ")
}
