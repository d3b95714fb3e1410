use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::dispatcher::ReceiveLoop;
use super::registry::{ConnectAttempt, DeviceRegistry, DeviceState};
use crate::error::InteractionError;
use crate::events::{ConnectivityEvent, EventSink, ProfileChangeEvent, ServiceEvent};
use crate::handlers::{Command, CommandCodec};
use crate::hw::{
    BleSession, BleTransport, DeviceAddress, SpinEndpoints, WriteMode, bounded,
    negotiate_session_endpoints,
};
use crate::protocol::EndpointId;

/// Result of one connection attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectOutcome {
    /// Subscribed and receiving notifications.
    Connected,
    /// Another attempt or session already owns the device.
    AlreadyActive,
    /// The transport failed; retried on a later discovery pass.
    Failed,
    /// The device does not expose the SPIN service.
    Mismatch,
    /// A discovery pass or another attempt holds the radio.
    RadioBusy,
}

/// Drives devices through the connect and subscribe sequence.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionManager {
    transport: Arc<dyn BleTransport>,
    registry: DeviceRegistry,
    sink: Arc<dyn EventSink>,
    stop: CancellationToken,
    receive_loops: TaskTracker,
    operation_timeout: Duration,
    notification_poll: Duration,
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Arc<dyn BleTransport>,
        registry: DeviceRegistry,
        sink: Arc<dyn EventSink>,
        stop: CancellationToken,
        operation_timeout: Duration,
        notification_poll: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            sink,
            stop,
            receive_loops: TaskTracker::new(),
            operation_timeout,
            notification_poll,
        }
    }

    /// Connects a registered device in its own task and waits for the result.
    #[instrument(skip(self), fields(%address))]
    pub(crate) async fn connect(&self, address: DeviceAddress) -> ConnectOutcome {
        let Some(attempt) = self.registry.try_begin_connect(&address) else {
            debug!("device already has an active attempt or session");
            return ConnectOutcome::AlreadyActive;
        };

        let manager = self.clone();
        let task_address = address.clone();
        let handle = tokio::spawn(async move { manager.attempt(task_address, attempt).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "connection task failed");
                self.registry.finish(
                    &address,
                    attempt.generation,
                    attempt.prior,
                    Some(error.to_string()),
                );
                ConnectOutcome::Failed
            }
        }
    }

    /// Closes the receive-loop tracker and waits for every loop to exit.
    pub(crate) async fn wait_for_receive_loops(&self) {
        self.receive_loops.close();
        self.receive_loops.wait().await;
    }

    async fn attempt(self, address: DeviceAddress, attempt: ConnectAttempt) -> ConnectOutcome {
        let session = match bounded(
            "connect",
            self.operation_timeout,
            self.transport.connect(&address),
        )
        .await
        {
            Ok(session) => session,
            Err(error) => {
                warn!(%error, prior = %attempt.prior, "connect failed");
                self.registry.finish(
                    &address,
                    attempt.generation,
                    attempt.prior,
                    Some(error.to_string()),
                );
                return ConnectOutcome::Failed;
            }
        };

        self.registry
            .advance(&address, attempt.generation, DeviceState::Subscribing);
        match self.subscribe(&address, session.as_ref()).await {
            Ok(endpoints) => {
                self.activate(address, attempt.generation, session, endpoints)
                    .await
            }
            Err(error) => {
                let outcome = if error.is_protocol_mismatch() {
                    warn!(%error, "device is not a SPIN remote");
                    ConnectOutcome::Mismatch
                } else {
                    warn!(%error, "subscribe failed");
                    ConnectOutcome::Failed
                };
                self.registry.finish(
                    &address,
                    attempt.generation,
                    DeviceState::Disconnected,
                    Some(error.to_string()),
                );
                close(session.as_ref()).await;
                outcome
            }
        }
    }

    #[instrument(skip(self, session), level = "debug", fields(%address))]
    async fn subscribe(
        &self,
        address: &DeviceAddress,
        session: &dyn BleSession,
    ) -> Result<SpinEndpoints, InteractionError> {
        let services = bounded("service discovery", self.operation_timeout, session.services()).await?;
        let endpoints = negotiate_session_endpoints(&services)?;
        let enable = CommandCodec::encode_enable_notifications();

        if endpoints.profile {
            let payload = bounded(
                "profile read",
                self.operation_timeout,
                session.read(EndpointId::ProfileIdCharacteristic),
            )
            .await?;
            let profile = CommandCodec::decode_profile_change(&payload).ok_or(
                InteractionError::EmptyPayload {
                    endpoint: EndpointId::ProfileIdCharacteristic,
                },
            )?;
            self.registry.set_profile(address, profile);
            self.sink
                .emit(ServiceEvent::ProfileChanged(ProfileChangeEvent::new(
                    address.clone(),
                    profile,
                    OffsetDateTime::now_utc(),
                )));
            bounded(
                "profile subscribe",
                self.operation_timeout,
                session.write_descriptor(
                    EndpointId::ProfileIdCharacteristic,
                    EndpointId::ClientCharacteristicConfig,
                    &enable,
                ),
            )
            .await?;
        }

        bounded(
            "action subscribe",
            self.operation_timeout,
            session.write_descriptor(
                Command::EnableActionNotifications.endpoint(),
                EndpointId::ClientCharacteristicConfig,
                &enable,
            ),
        )
        .await?;

        if endpoints.command {
            let command = Command::EnableCommandChannel;
            bounded(
                "command channel arm",
                self.operation_timeout,
                session.write(
                    command.endpoint(),
                    &CommandCodec::encode(command),
                    WriteMode::WithResponse,
                ),
            )
            .await?;
        }

        Ok(endpoints)
    }

    async fn activate(
        &self,
        address: DeviceAddress,
        generation: u64,
        session: Arc<dyn BleSession>,
        endpoints: SpinEndpoints,
    ) -> ConnectOutcome {
        if self.stop.is_cancelled() {
            debug!("shutdown began during subscribe");
            self.registry
                .finish(&address, generation, DeviceState::Disconnected, None);
            close(session.as_ref()).await;
            return ConnectOutcome::Failed;
        }

        let cancel = self.stop.child_token();
        if !self.registry.mark_connected(
            &address,
            generation,
            Arc::clone(&session),
            endpoints,
            cancel.clone(),
        ) {
            close(session.as_ref()).await;
            return ConnectOutcome::Failed;
        }

        info!(%address, "SPIN remote connected");
        self.sink.emit(ServiceEvent::Connectivity(ConnectivityEvent::new(
            address.clone(),
            DeviceState::Connected,
            OffsetDateTime::now_utc(),
        )));

        let receive_loop = ReceiveLoop {
            address,
            generation,
            session,
            registry: self.registry.clone(),
            sink: Arc::clone(&self.sink),
            cancel,
            poll: self.notification_poll,
        };
        self.receive_loops.spawn(receive_loop.run());
        ConnectOutcome::Connected
    }
}

async fn close(session: &dyn BleSession) {
    if let Err(error) = session.disconnect().await {
        debug!(%error, "closing session failed");
    }
}
