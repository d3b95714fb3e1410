use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackend, FakeBackendConfig};
use super::model::{DeviceAddress, FoundDevice, Notification, ServiceInfo};
use crate::error::InteractionError;
use crate::protocol::EndpointId;

/// Write acknowledgement mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Runtime BLE backend selection.
#[derive(Debug)]
pub(crate) enum HardwareBackend {
    Real { adapter_index: usize },
    Fake(FakeBackendConfig),
}

/// Builds the injected transport for the selected runtime backend.
pub(crate) async fn transport_from_backend(
    backend: HardwareBackend,
) -> Result<Arc<dyn BleTransport>, InteractionError> {
    let transport: Arc<dyn BleTransport> = match backend {
        HardwareBackend::Real { adapter_index } => {
            Arc::new(BtleplugBackend::new(adapter_index).await?)
        }
        HardwareBackend::Fake(config) => {
            info!("using fake BLE backend");
            Arc::new(FakeBackend::new(config))
        }
    };

    Ok(transport)
}

/// Runs one BLE operation, failing with [`InteractionError::Timeout`] after `after`.
pub(crate) async fn bounded<T>(
    operation: &'static str,
    after: Duration,
    future: impl Future<Output = Result<T, InteractionError>>,
) -> Result<T, InteractionError> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_elapsed| InteractionError::Timeout { operation, after })?
}

/// Discovery and connection half of a BLE stack.
#[async_trait]
pub trait BleTransport: Send + Sync + Debug {
    /// Collects advertisements for `timeout` and returns every peripheral seen.
    async fn scan(&self, timeout: Duration) -> Result<Vec<FoundDevice>, InteractionError>;

    /// Opens a session to a previously scanned peripheral.
    async fn connect(
        &self,
        address: &DeviceAddress,
    ) -> Result<Arc<dyn BleSession>, InteractionError>;
}

/// An open connection to one peripheral.
#[async_trait]
pub trait BleSession: Send + Sync + Debug {
    /// Returns the peripheral address.
    fn address(&self) -> &DeviceAddress;

    /// Lists the services and characteristics discovered on connect.
    async fn services(&self) -> Result<Vec<ServiceInfo>, InteractionError>;

    async fn read(&self, endpoint: EndpointId) -> Result<Vec<u8>, InteractionError>;

    async fn write(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;

    /// Writes a descriptor belonging to `characteristic`.
    async fn write_descriptor(
        &self,
        characteristic: EndpointId,
        descriptor: EndpointId,
        payload: &[u8],
    ) -> Result<(), InteractionError>;

    /// Waits up to `timeout` for the next notification.
    ///
    /// `Ok(None)` means the wait elapsed without data.
    async fn await_notification(
        &self,
        timeout: Duration,
    ) -> Result<Option<Notification>, InteractionError>;

    async fn disconnect(&self) -> Result<(), InteractionError>;
}
