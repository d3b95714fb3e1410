use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::registry::{DeviceRegistry, DeviceState};
use crate::error::InteractionError;
use crate::events::{ConnectivityEvent, EventSink, GestureEvent, ProfileChangeEvent, ServiceEvent};
use crate::hw::{BleSession, DeviceAddress, Notification};
use crate::notification::{NotificationDecodeError, NotificationHandler, NotifyEvent};

/// Why a receive loop ended.
#[derive(Debug)]
pub(crate) enum LoopExit {
    /// Shutdown or an explicit disconnect.
    Cancelled,
    Transport(InteractionError),
}

/// Receive loop for one connected device.
#[derive(Debug)]
pub(crate) struct ReceiveLoop {
    pub(crate) address: DeviceAddress,
    pub(crate) generation: u64,
    pub(crate) session: Arc<dyn BleSession>,
    pub(crate) registry: DeviceRegistry,
    pub(crate) sink: Arc<dyn EventSink>,
    /// Child of the service stop token, cancelled alone by `disconnect`.
    pub(crate) cancel: CancellationToken,
    pub(crate) poll: Duration,
}

impl ReceiveLoop {
    /// Forwards notifications until cancelled or the transport fails, then
    /// tears the session down.
    #[instrument(skip(self), fields(address = %self.address, generation = self.generation))]
    pub(crate) async fn run(self) -> LoopExit {
        debug!("receive loop started");
        let exit = loop {
            if self.cancel.is_cancelled() {
                break LoopExit::Cancelled;
            }
            match self.session.await_notification(self.poll).await {
                Ok(None) => trace!("poll elapsed without data"),
                Ok(Some(notification)) => self.dispatch(&notification),
                Err(error) => break LoopExit::Transport(error),
            }
        };

        let error = match &exit {
            LoopExit::Cancelled => {
                info!("receive loop cancelled");
                None
            }
            LoopExit::Transport(error) => {
                warn!(error = %error, "receive loop lost its transport");
                Some(error.to_string())
            }
        };

        let current =
            self.registry
                .finish(&self.address, self.generation, DeviceState::Disconnected, error);
        if let Err(error) = self.session.disconnect().await {
            debug!(error = %error, "closing session failed");
        }
        if current {
            self.sink.emit(ServiceEvent::Connectivity(ConnectivityEvent::new(
                self.address.clone(),
                DeviceState::Disconnected,
                OffsetDateTime::now_utc(),
            )));
        }
        exit
    }

    fn dispatch(&self, notification: &Notification) {
        let endpoint = notification.endpoint();
        match NotificationHandler::decode(endpoint, notification.payload()) {
            Ok(NotifyEvent::Action { code, action }) => {
                debug!(code, %action, "gesture");
                self.sink.emit(ServiceEvent::Gesture(GestureEvent::new(
                    self.address.clone(),
                    code,
                    action,
                    OffsetDateTime::now_utc(),
                )));
            }
            Ok(NotifyEvent::ProfileChanged(profile)) => {
                debug!(profile, "profile changed on device");
                self.registry.set_profile(&self.address, profile);
                self.sink.emit(ServiceEvent::ProfileChanged(ProfileChangeEvent::new(
                    self.address.clone(),
                    profile,
                    OffsetDateTime::now_utc(),
                )));
            }
            Err(NotificationDecodeError::EmptyPayload) => {
                debug!(%endpoint, "ignoring empty notification");
            }
            Err(error @ NotificationDecodeError::UnroutedEndpoint { .. }) => {
                debug!(%error, "ignoring notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::events::channel_event_sink;
    use crate::handlers::{ActionCode, Gesture};
    use crate::hw::{
        BleTransport, FakeBackend, FakeBackendConfig, FakeNotification, FakePeripheral,
        FoundDevice, SpinEndpoints,
    };
    use crate::protocol::{self, EndpointId};

    struct Harness {
        receive_loop: ReceiveLoop,
        registry: DeviceRegistry,
        backend: FakeBackend,
        events: tokio::sync::mpsc::UnboundedReceiver<ServiceEvent>,
    }

    async fn harness(notifications: Vec<FakeNotification>) -> Harness {
        let backend = FakeBackend::new(
            FakeBackendConfig::builder()
                .peripherals(vec![
                    FakePeripheral::spin("AA").with_notifications(notifications),
                ])
                .build(),
        );
        let session = backend
            .connect(&"AA".into())
            .await
            .expect("fake peripheral should connect");

        let registry = DeviceRegistry::default();
        let discovery = protocol::endpoint_metadata(EndpointId::DiscoveryService).uuid();
        registry.observe(&FoundDevice::new("AA".into(), None, None, vec![discovery]));
        let attempt = registry
            .try_begin_connect(&"AA".into())
            .expect("attempt should be granted");
        let cancel = CancellationToken::new();
        registry.mark_connected(
            &"AA".into(),
            attempt.generation,
            Arc::clone(&session),
            SpinEndpoints {
                profile: true,
                command: true,
            },
            cancel.clone(),
        );

        let (sink, events) = channel_event_sink();
        Harness {
            receive_loop: ReceiveLoop {
                address: "AA".into(),
                generation: attempt.generation,
                session,
                registry: registry.clone(),
                sink: Arc::new(sink),
                cancel,
                poll: Duration::from_secs(1),
            },
            registry,
            backend,
            events,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_ends_loop_and_reports_disconnect() {
        let mut harness = harness(vec![
            FakeNotification::action(0x0E),
            FakeNotification::action(0x63),
            FakeNotification::TransportError,
        ])
        .await;

        let exit = harness.receive_loop.run().await;

        assert_matches!(exit, LoopExit::Transport(InteractionError::ConnectionLost));
        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::Gesture(event))
                if event.code() == 0x0E
                    && event.action() == ActionCode::Gesture(Gesture::TouchpadPressCenter)
        );
        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::Gesture(event))
                if event.action() == ActionCode::Unknown(0x63)
        );
        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::Connectivity(event))
                if event.state() == DeviceState::Disconnected
        );

        let snapshot = harness
            .registry
            .get(&"AA".into())
            .expect("device should stay registered");
        assert_eq!(DeviceState::Disconnected, snapshot.state());
        assert_eq!(Some("the peripheral is no longer connected"), snapshot.last_error());
        assert_eq!(1, harness.backend.handle().disconnect_count("AA"));
    }

    #[tokio::test(start_paused = true)]
    async fn profile_notification_updates_registry() {
        let mut harness = harness(vec![FakeNotification::profile(4)]).await;
        let cancel = harness.receive_loop.cancel.clone();
        let task = tokio::spawn(harness.receive_loop.run());

        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::ProfileChanged(event)) if event.profile() == 4
        );
        assert_eq!(
            4,
            harness
                .registry
                .get(&"AA".into())
                .expect("device should be registered")
                .profile()
        );

        cancel.cancel();
        let exit = task.await.expect("receive loop should not panic");
        assert_matches!(exit, LoopExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_and_unrouted_notifications_are_ignored() {
        let mut harness = harness(Vec::new()).await;
        let handle = harness.backend.handle();
        handle.push_notification(
            "AA",
            FakeNotification::Value(Notification::new(EndpointId::ActionCharacteristic, Vec::new())),
        );
        handle.push_notification(
            "AA",
            FakeNotification::Value(Notification::new(EndpointId::CommandCharacteristic, vec![1])),
        );
        handle.push_notification("AA", FakeNotification::action(0x18));
        let cancel = harness.receive_loop.cancel.clone();
        let task = tokio::spawn(harness.receive_loop.run());

        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::Gesture(event))
                if event.action() == ActionCode::Gesture(Gesture::SpinWakeUp)
        );
        cancel.cancel();
        task.await.expect("receive loop should not panic");
        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::Connectivity(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_loop_exits_within_one_poll() {
        let mut harness = harness(Vec::new()).await;
        let poll = harness.receive_loop.poll;
        let cancel = harness.receive_loop.cancel.clone();
        let task = tokio::spawn(harness.receive_loop.run());
        tokio::time::sleep(poll * 5 / 2).await;

        let start = tokio::time::Instant::now();
        cancel.cancel();
        let exit = task.await.expect("receive loop should not panic");

        assert_matches!(exit, LoopExit::Cancelled);
        assert_eq!(true, tokio::time::Instant::now() - start <= poll);
        assert_matches!(
            harness.events.recv().await,
            Some(ServiceEvent::Connectivity(event))
                if event.state() == DeviceState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_loop_does_not_report_disconnect() {
        let mut harness = harness(vec![FakeNotification::TransportError]).await;
        harness.registry.finish(&"AA".into(), 1, DeviceState::Disconnected, None);
        harness.registry.try_begin_connect(&"AA".into());

        harness.receive_loop.run().await;

        assert_eq!(true, harness.events.try_recv().is_err());
        assert_eq!(
            DeviceState::Connecting,
            harness
                .registry
                .get(&"AA".into())
                .expect("device should be registered")
                .state()
        );
    }
}
