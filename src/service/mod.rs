mod connection;
mod dispatcher;
mod radio;
mod registry;
mod scan;

use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use self::connection::ConnectionManager;
use self::radio::RadioLock;
use self::registry::DeviceRegistry;
use self::scan::ScanLoop;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::events::{EventSink, ProfileChangeEvent, ServiceEvent};
use crate::handlers::{LedColourHandler, ProfileHandler, Rgb};
use crate::hw::{BleTransport, DeviceAddress, bounded};
use crate::protocol::EndpointId;

pub use self::connection::ConnectOutcome;
pub use self::registry::{DeviceSnapshot, DeviceState};
pub use self::scan::{ScanReport, ScanSummary, SkipReason};

/// Inbound home-automation service call.
///
/// ```
/// use spin_remote::ServiceCall;
///
/// let call: ServiceCall =
///     serde_json::from_str(r#"{"service": "rgb_color", "rgb_color": [255, 0, 0]}"#)?;
/// assert!(matches!(call, ServiceCall::RgbColor { address: None, .. }));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceCall {
    /// Switches to a `profile_N` option.
    Profile {
        #[serde(default)]
        address: Option<DeviceAddress>,
        profile: String,
    },
    /// Forces the LED colour; black clears it.
    RgbColor {
        #[serde(default)]
        address: Option<DeviceAddress>,
        rgb_color: Rgb,
    },
}

/// Bridge between SPIN remotes and an event consumer.
#[derive(Debug, Clone)]
pub struct SpinService {
    registry: DeviceRegistry,
    sink: Arc<dyn EventSink>,
    stop: CancellationToken,
    connections: ConnectionManager,
    scan_loop: ScanLoop,
    radio: RadioLock,
    config: ServiceConfig,
}

impl SpinService {
    /// Creates a service over `transport` reporting to `sink`.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        transport: Arc<dyn BleTransport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let registry = DeviceRegistry::default();
        let stop = CancellationToken::new();
        let connections = ConnectionManager::new(
            Arc::clone(&transport),
            registry.clone(),
            Arc::clone(&sink),
            stop.clone(),
            config.operation_timeout(),
            config.notification_poll(),
        );
        let radio = RadioLock::default();
        let scan_loop = ScanLoop::new(
            transport,
            registry.clone(),
            connections.clone(),
            radio.clone(),
            stop.clone(),
            config.scan_interval(),
            config.scan_timeout(),
        );

        Self {
            registry,
            sink,
            stop,
            connections,
            scan_loop,
            radio,
            config,
        }
    }

    /// Runs discovery passes until [`SpinService::shutdown`] is called.
    pub async fn run_scan_loop(&self) {
        self.scan_loop.run().await;
    }

    /// Runs a single discovery pass.
    pub async fn scan_once(&self) -> ScanReport {
        self.scan_loop.scan_once().await
    }

    /// Connects a registered device outside the scan loop.
    ///
    /// Shares the radio with discovery: returns [`ConnectOutcome::RadioBusy`]
    /// while a pass or another attempt holds it.
    pub async fn connect(&self, address: &DeviceAddress) -> ConnectOutcome {
        let Some(_lease) = self.radio.try_acquire() else {
            debug!(%address, "radio busy; not connecting");
            return ConnectOutcome::RadioBusy;
        };
        self.connections.connect(address.clone()).await
    }

    /// Writes `profile` to the target device and records it.
    ///
    /// # Errors
    ///
    /// Returns an error when no unique connected target exists, the device has
    /// no profile characteristic, or the write fails.
    #[instrument(skip(self))]
    pub async fn set_profile(
        &self,
        address: Option<&DeviceAddress>,
        profile: u8,
    ) -> Result<(), ServiceError> {
        let target = self.registry.resolve_target(address)?;
        if !target.endpoints.profile {
            return Err(ServiceError::EndpointUnavailable {
                address: target.address,
                endpoint: EndpointId::ProfileIdCharacteristic,
            });
        }

        bounded(
            "profile write",
            self.config.operation_timeout(),
            ProfileHandler::set_profile(target.session.as_ref(), profile),
        )
        .await?;
        self.registry.set_profile(&target.address, profile);
        self.sink
            .emit(ServiceEvent::ProfileChanged(ProfileChangeEvent::new(
                target.address,
                profile,
                OffsetDateTime::now_utc(),
            )));
        Ok(())
    }

    /// Forces the LED colour of the target device; black clears it.
    ///
    /// # Errors
    ///
    /// Returns an error when no unique connected target exists, the device has
    /// no command characteristic, or the write fails.
    #[instrument(skip(self))]
    pub async fn set_colour(
        &self,
        address: Option<&DeviceAddress>,
        colour: Rgb,
    ) -> Result<(), ServiceError> {
        let target = self.command_target(address)?;
        bounded(
            "colour write",
            self.config.operation_timeout(),
            LedColourHandler::set_colour(target.session.as_ref(), colour),
        )
        .await?;
        Ok(())
    }

    /// Releases the LED colour of the target device.
    ///
    /// # Errors
    ///
    /// Returns an error when no unique connected target exists, the device has
    /// no command characteristic, or the write fails.
    #[instrument(skip(self))]
    pub async fn clear_colour(&self, address: Option<&DeviceAddress>) -> Result<(), ServiceError> {
        let target = self.command_target(address)?;
        bounded(
            "colour write",
            self.config.operation_timeout(),
            LedColourHandler::clear_colour(target.session.as_ref()),
        )
        .await?;
        Ok(())
    }

    /// Dispatches an inbound service call.
    ///
    /// # Errors
    ///
    /// Returns an error when the profile name is invalid or the underlying
    /// command fails.
    pub async fn handle_call(&self, call: ServiceCall) -> Result<(), ServiceError> {
        match call {
            ServiceCall::Profile { address, profile } => {
                let profile = ProfileHandler::parse_profile_name(&profile)?;
                self.set_profile(address.as_ref(), profile).await
            }
            ServiceCall::RgbColor { address, rgb_color } => {
                self.set_colour(address.as_ref(), rgb_color).await
            }
        }
    }

    /// Ends the receive loop of a connected device.
    ///
    /// The device is reported disconnected once its loop observes the request.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotConnected`] when the device is not connected.
    pub fn disconnect(&self, address: &DeviceAddress) -> Result<(), ServiceError> {
        let token = self
            .registry
            .cancel_token(address)
            .ok_or_else(|| ServiceError::NotConnected {
                address: address.clone(),
            })?;
        info!(%address, "disconnect requested");
        token.cancel();
        Ok(())
    }

    /// Returns every device seen since startup.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.registry.snapshot()
    }

    /// Returns one registered device.
    #[must_use]
    pub fn device(&self, address: &DeviceAddress) -> Option<DeviceSnapshot> {
        self.registry.get(address)
    }

    /// Stops discovery and waits for every receive loop to exit.
    pub async fn shutdown(&self) {
        info!("shutting down SPIN service");
        self.stop.cancel();
        self.connections.wait_for_receive_loops().await;
    }

    fn command_target(
        &self,
        address: Option<&DeviceAddress>,
    ) -> Result<registry::ConnectedTarget, ServiceError> {
        let target = self.registry.resolve_target(address)?;
        if !target.endpoints.command {
            return Err(ServiceError::EndpointUnavailable {
                address: target.address,
                endpoint: EndpointId::CommandCharacteristic,
            });
        }
        Ok(target)
    }
}
