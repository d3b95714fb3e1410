mod app;
mod cli;
mod config;
mod error;
mod events;
mod handlers;
mod hw;
mod notification;
mod protocol;
mod service;
mod telemetry;
mod terminal;

pub use app::{run, run_with_clients};
pub use cli::{Args, CliCommand, FakeArgs, LogLevel, OutputFormat, RunArgs, ScanArgs};
pub use config::{ConfigOverrides, ServiceConfig};
pub use error::{ConfigError, FixtureError, InteractionError, ServiceError};
pub use events::{
    ChannelEventSink, ConnectivityEvent, EventSink, GestureEvent, ProfileChangeEvent,
    ServiceEvent, channel_event_sink,
};
pub use handlers::{
    ActionCode, Command, CommandCodec, Gesture, LedColourHandler, ProfileHandler, Rgb,
    decode_action,
};
pub use hw::{
    BleSession, BleTransport, CharacteristicInfo, DeviceAddress, FakeBackend, FakeBackendConfig,
    FakeHandle, FakeNotification, FakePeripheral, FakePeripheralKind, FoundDevice, Notification,
    NotificationPayloads, RecordedWrite, ScanFixture, ServiceInfo, WriteMode,
};
pub use notification::{NotificationDecodeError, NotificationHandler, NotifyEvent};
pub use protocol::EndpointId;
pub use service::{
    ConnectOutcome, DeviceSnapshot, DeviceState, ScanReport, ScanSummary, ServiceCall,
    SkipReason, SpinService,
};
pub use terminal::{SystemTerminalClient, TerminalClient};
