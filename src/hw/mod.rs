mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;
mod session;

pub use self::fake_backend::{
    FakeBackend, FakeBackendConfig, FakeHandle, FakeNotification, FakePeripheral,
    FakePeripheralKind, NotificationPayloads, RecordedWrite, ScanFixture,
};
pub use self::hardware::{BleSession, BleTransport, WriteMode};
pub(crate) use self::hardware::{HardwareBackend, bounded, transport_from_backend};
pub use self::model::{CharacteristicInfo, DeviceAddress, FoundDevice, Notification, ServiceInfo};
pub(crate) use self::session::{SpinEndpoints, negotiate_session_endpoints};
