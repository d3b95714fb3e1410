use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter, ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, trace, warn};

use super::hardware::{BleSession, BleTransport, WriteMode};
use super::model::{CharacteristicInfo, DeviceAddress, FoundDevice, Notification, ServiceInfo};
use crate::error::InteractionError;
use crate::protocol::{self, EndpointId};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    adapter: Adapter,
    adapter_name: String,
    peripherals: Mutex<HashMap<DeviceAddress, Peripheral>>,
}

impl BtleplugBackend {
    /// Opens the adapter at `adapter_index`.
    pub(crate) async fn new(adapter_index: usize) -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }
        let available = adapters.len();
        if adapter_index >= available {
            return Err(InteractionError::AdapterOutOfRange {
                index: adapter_index,
                available,
            });
        }

        let adapter = adapters.swap_remove(adapter_index);
        let adapter_name = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_error| "unknown".to_string());
        info!(adapter = %adapter_name, "using BLE adapter");

        Ok(Self {
            adapter,
            adapter_name,
            peripherals: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl BleTransport for BtleplugBackend {
    #[instrument(skip(self), level = "debug", fields(adapter = %self.adapter_name))]
    async fn scan(&self, timeout: Duration) -> Result<Vec<FoundDevice>, InteractionError> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(timeout).await;
        if let Err(error) = self.adapter.stop_scan().await {
            debug!(?error, "failed to stop adapter scan cleanly");
        }

        let mut found = Vec::new();
        let mut cache = self.peripherals.lock().await;
        for peripheral in self.adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(properties)) => properties,
                Ok(None) => continue,
                Err(error) => {
                    warn!(?error, "could not query peripheral properties");
                    continue;
                }
            };
            let device = found_device_from_properties(properties);
            trace!(address = %device.address(), name = ?device.local_name(), "peripheral seen");
            cache.insert(device.address().clone(), peripheral);
            found.push(device);
        }

        Ok(found)
    }

    #[instrument(skip(self), level = "debug", fields(%address))]
    async fn connect(
        &self,
        address: &DeviceAddress,
    ) -> Result<Arc<dyn BleSession>, InteractionError> {
        let peripheral = self
            .peripherals
            .lock()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| InteractionError::UnknownPeripheral {
                address: address.clone(),
            })?;

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;

        let (services, characteristics) = collect_services_and_characteristics(&peripheral);
        info!(service_count = services.len(), "connected to peripheral");

        Ok(Arc::new(RealDeviceSession {
            address: address.clone(),
            peripheral,
            services,
            characteristics,
            notifications: Mutex::new(None),
        }))
    }
}

/// Active session bound to a real peripheral.
struct RealDeviceSession {
    address: DeviceAddress,
    peripheral: Peripheral,
    services: Vec<ServiceInfo>,
    characteristics: HashMap<EndpointId, Characteristic>,
    notifications: Mutex<Option<NotificationStream>>,
}

impl std::fmt::Debug for RealDeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealDeviceSession")
            .field("address", &self.address)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl RealDeviceSession {
    fn characteristic_for(
        &self,
        endpoint: EndpointId,
    ) -> Result<&Characteristic, InteractionError> {
        self.characteristics
            .get(&endpoint)
            .ok_or(InteractionError::MissingEndpoint { endpoint })
    }
}

#[async_trait]
impl BleSession for RealDeviceSession {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>, InteractionError> {
        Ok(self.services.clone())
    }

    #[instrument(skip(self), level = "trace", fields(address = %self.address, ?endpoint))]
    async fn read(&self, endpoint: EndpointId) -> Result<Vec<u8>, InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?;
        Ok(self.peripheral.read(characteristic).await?)
    }

    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(address = %self.address, ?endpoint, ?mode, payload_len = payload.len())
    )]
    async fn write(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, payload), level = "trace", fields(address = %self.address, ?characteristic, ?descriptor))]
    async fn write_descriptor(
        &self,
        characteristic: EndpointId,
        descriptor: EndpointId,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        let target = self.characteristic_for(characteristic)?;

        // BlueZ owns the CCCD and only routes notifications after a subscribe,
        // so the notify bit goes through the platform call.
        if descriptor == EndpointId::ClientCharacteristicConfig {
            self.peripheral.subscribe(target).await?;
            return Ok(());
        }

        let descriptor_uuid = protocol::endpoint_metadata(descriptor).uuid();
        let found = target
            .descriptors
            .iter()
            .find(|candidate| candidate.uuid == descriptor_uuid)
            .ok_or(InteractionError::MissingEndpoint {
                endpoint: descriptor,
            })?;
        self.peripheral.write_descriptor(found, payload).await?;
        Ok(())
    }

    async fn await_notification(
        &self,
        wait: Duration,
    ) -> Result<Option<Notification>, InteractionError> {
        let mut guard = self.notifications.lock().await;
        if guard.is_none() {
            *guard = Some(self.peripheral.notifications().await?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(InteractionError::NotificationStreamClosed);
        };

        loop {
            match timeout(wait, stream.next()).await {
                Err(_elapsed) => {
                    if !self.peripheral.is_connected().await? {
                        return Err(InteractionError::ConnectionLost);
                    }
                    return Ok(None);
                }
                Ok(None) => return Err(InteractionError::NotificationStreamClosed),
                Ok(Some(value)) => {
                    let Some(endpoint) = protocol::characteristic_for_uuid(value.uuid) else {
                        trace!(uuid = %value.uuid, "ignoring notification from unknown characteristic");
                        continue;
                    };
                    return Ok(Some(Notification::new(endpoint, value.value)));
                }
            }
        }
    }

    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    async fn disconnect(&self) -> Result<(), InteractionError> {
        self.notifications.lock().await.take();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

fn found_device_from_properties(properties: PeripheralProperties) -> FoundDevice {
    FoundDevice::new(
        DeviceAddress::new(properties.address.to_string()),
        properties.local_name,
        properties.rssi,
        properties.services,
    )
}

fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<EndpointId, Characteristic>) {
    let spin_service = protocol::endpoint_metadata(EndpointId::SpinService).uuid();
    let mut services = Vec::new();
    let mut characteristics = HashMap::new();

    for service in peripheral.services() {
        let mut infos = Vec::with_capacity(service.characteristics.len());
        for characteristic in &service.characteristics {
            infos.push(CharacteristicInfo::new(
                characteristic.uuid,
                property_labels(characteristic.properties),
            ));
            if service.uuid != spin_service {
                continue;
            }
            if let Some(endpoint) = protocol::characteristic_for_uuid(characteristic.uuid) {
                characteristics.insert(endpoint, characteristic.clone());
            }
        }
        services.push(ServiceInfo::new(service.uuid, infos));
    }

    (services, characteristics)
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    [
        (CharPropFlags::READ, "read"),
        (CharPropFlags::WRITE, "write"),
        (CharPropFlags::WRITE_WITHOUT_RESPONSE, "write_without_response"),
        (CharPropFlags::NOTIFY, "notify"),
        (CharPropFlags::INDICATE, "indicate"),
    ]
    .into_iter()
    .filter(|(flag, _label)| flags.contains(*flag))
    .map(|(_flag, label)| label.to_string())
    .collect()
}
