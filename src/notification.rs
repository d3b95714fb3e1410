use thiserror::Error;
use tracing::instrument;

use crate::handlers::{ActionCode, CommandCodec, decode_action};
use crate::protocol::EndpointId;

/// Typed notification events emitted by SPIN remotes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NotifyEvent {
    /// A gesture byte from the action characteristic.
    Action { code: u8, action: ActionCode },
    /// The device switched to a new profile.
    ProfileChanged(u8),
}

/// Errors returned while decoding notification payloads.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NotificationDecodeError {
    #[error("notification payload was empty")]
    EmptyPayload,
    #[error("notifications from `{endpoint}` are not routed")]
    UnroutedEndpoint { endpoint: EndpointId },
}

/// Decodes raw characteristic notifications into typed events.
pub struct NotificationHandler;

impl NotificationHandler {
    /// Decodes one notification payload by its source characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is empty or the characteristic does
    /// not carry notifications.
    #[instrument(skip(payload), level = "trace", fields(payload_len = payload.len()))]
    pub fn decode(
        endpoint: EndpointId,
        payload: &[u8],
    ) -> Result<NotifyEvent, NotificationDecodeError> {
        match endpoint {
            EndpointId::ActionCharacteristic => {
                let code = payload
                    .first()
                    .ok_or(NotificationDecodeError::EmptyPayload)?;
                Ok(NotifyEvent::Action {
                    code: *code,
                    action: decode_action(*code),
                })
            }
            EndpointId::ProfileIdCharacteristic => CommandCodec::decode_profile_change(payload)
                .map(NotifyEvent::ProfileChanged)
                .ok_or(NotificationDecodeError::EmptyPayload),
            other => Err(NotificationDecodeError::UnroutedEndpoint { endpoint: other }),
        }
    }
}
