use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use spin_remote::{
    ActionCode, Command, ConnectOutcome, DeviceAddress, DeviceState, FakeBackend,
    FakeBackendConfig, FakeHandle, FakeNotification, FakePeripheral, FakePeripheralKind, Gesture,
    Rgb, ScanReport, ScanSummary, ServiceCall, ServiceConfig, ServiceError, ServiceEvent,
    SpinService, channel_event_sink,
};
use tokio::sync::mpsc::UnboundedReceiver;

const FIRST: &str = "AA:BB:CC:DD:EE:01";
const SECOND: &str = "AA:BB:CC:DD:EE:02";

struct Harness {
    service: SpinService,
    events: UnboundedReceiver<ServiceEvent>,
    fake: FakeHandle,
}

impl Harness {
    fn new(peripherals: Vec<FakePeripheral>) -> Self {
        let backend = FakeBackend::new(FakeBackendConfig::builder().peripherals(peripherals).build());
        let fake = backend.handle();
        let (sink, events) = channel_event_sink();
        let service = SpinService::new(
            ServiceConfig::default(),
            Arc::new(backend),
            Arc::new(sink),
        );
        Self {
            service,
            events,
            fake,
        }
    }

    async fn next_event(&mut self) -> ServiceEvent {
        tokio::time::timeout(Duration::from_secs(60), self.events.recv())
            .await
            .expect("event should arrive")
            .expect("event channel should stay open")
    }

    async fn next_connectivity(&mut self) -> (DeviceAddress, DeviceState) {
        loop {
            if let ServiceEvent::Connectivity(event) = self.next_event().await {
                return (event.address().clone(), event.state());
            }
        }
    }
}

fn address(value: &str) -> DeviceAddress {
    DeviceAddress::new(value)
}

#[tokio::test(start_paused = true)]
async fn discovery_connects_and_reports_initial_profile() {
    let mut harness = Harness::new(vec![FakePeripheral::spin(FIRST).with_profile(4)]);

    let report = harness.service.scan_once().await;

    assert_eq!(
        ScanReport::Completed(ScanSummary {
            seen: 1,
            registered: 1,
            attempted: 1,
            connected: 1,
        }),
        report
    );
    assert_matches!(
        harness.next_event().await,
        ServiceEvent::ProfileChanged(event) if event.profile() == 4
    );
    assert_eq!(
        (address(FIRST), DeviceState::Connected),
        harness.next_connectivity().await
    );
    let device = harness
        .service
        .device(&address(FIRST))
        .expect("device should be registered");
    assert_eq!(DeviceState::Connected, device.state());
    assert_eq!(4, device.profile());

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn gestures_and_profile_notifications_reach_the_sink() {
    let mut harness = Harness::new(vec![FakePeripheral::spin(FIRST).with_notifications(vec![
        FakeNotification::action(0x0E),
        FakeNotification::action(0xC8),
        FakeNotification::profile(5),
    ])]);

    harness.service.scan_once().await;
    harness.next_event().await;
    harness.next_connectivity().await;

    assert_matches!(
        harness.next_event().await,
        ServiceEvent::Gesture(event)
            if event.action() == ActionCode::Gesture(Gesture::TouchpadPressCenter)
    );
    assert_matches!(
        harness.next_event().await,
        ServiceEvent::Gesture(event) if event.action() == ActionCode::Unknown(0xC8)
    );
    assert_matches!(
        harness.next_event().await,
        ServiceEvent::ProfileChanged(event) if event.profile() == 5
    );
    assert_eq!(
        Some(5),
        harness
            .service
            .device(&address(FIRST))
            .map(|device| device.profile())
    );

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn service_calls_drive_profile_and_colour_writes() {
    let mut harness = Harness::new(vec![FakePeripheral::spin(FIRST)]);
    harness.service.scan_once().await;
    harness.next_event().await;
    harness.next_connectivity().await;

    harness
        .service
        .handle_call(ServiceCall::Profile {
            address: None,
            profile: "profile_3".to_string(),
        })
        .await
        .expect("profile call should succeed");
    harness
        .service
        .handle_call(ServiceCall::RgbColor {
            address: Some(address(FIRST)),
            rgb_color: Rgb::new(255, 0, 10),
        })
        .await
        .expect("colour call should succeed");
    harness
        .service
        .clear_colour(None)
        .await
        .expect("clear should succeed");

    assert_matches!(
        harness.next_event().await,
        ServiceEvent::ProfileChanged(event) if event.profile() == 3
    );
    let commands = harness.fake.commands(FIRST);
    assert_eq!(
        vec![
            Command::SetProfile(3),
            Command::SetColor {
                r: 255,
                g: 0,
                b: 10,
            },
            Command::ClearColor,
        ],
        commands[commands.len() - 3..].to_vec()
    );

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_profile_names_are_rejected_without_writes() {
    let mut harness = Harness::new(vec![FakePeripheral::spin(FIRST)]);
    harness.service.scan_once().await;
    harness.next_connectivity().await;
    let writes_before = harness.fake.writes(FIRST).len();

    let result = harness
        .service
        .handle_call(ServiceCall::Profile {
            address: None,
            profile: "profile_x".to_string(),
        })
        .await;

    assert_matches!(result, Err(ServiceError::InvalidProfileName { .. }));
    assert_eq!(writes_before, harness.fake.writes(FIRST).len());

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn calls_without_a_connected_device_fail() {
    let harness = Harness::new(vec![FakePeripheral::spin(FIRST)]);

    let result = harness.service.set_profile(None, 1).await;

    assert_matches!(result, Err(ServiceError::NoConnectedDevice));
}

#[tokio::test(start_paused = true)]
async fn untargeted_calls_are_ambiguous_with_two_remotes() {
    let mut harness = Harness::new(vec![
        FakePeripheral::spin(FIRST),
        FakePeripheral::spin(SECOND),
    ]);
    harness.service.scan_once().await;
    harness.next_connectivity().await;
    harness.next_connectivity().await;

    let untargeted = harness.service.set_colour(None, Rgb::new(1, 2, 3)).await;
    let targeted = harness
        .service
        .set_colour(Some(&address(SECOND)), Rgb::new(1, 2, 3))
        .await;

    assert_matches!(untargeted, Err(ServiceError::AmbiguousTarget { count: 2 }));
    assert_matches!(targeted, Ok(()));

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn action_only_remotes_reject_colour_commands() {
    let mut harness = Harness::new(vec![
        FakePeripheral::builder()
            .address(FIRST)
            .kind(FakePeripheralKind::SpinActionOnly)
            .build(),
    ]);
    harness.service.scan_once().await;
    harness.next_connectivity().await;

    let result = harness.service.set_colour(None, Rgb::new(0, 255, 0)).await;

    assert_matches!(result, Err(ServiceError::EndpointUnavailable { .. }));
    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_then_rescan_reconnects_with_new_generation() {
    let mut harness = Harness::new(vec![FakePeripheral::spin(FIRST)]);
    harness.service.scan_once().await;
    harness.next_connectivity().await;
    let first_generation = harness
        .service
        .device(&address(FIRST))
        .map(|device| device.generation());

    harness
        .service
        .disconnect(&address(FIRST))
        .expect("connected device should disconnect");
    assert_eq!(
        (address(FIRST), DeviceState::Disconnected),
        harness.next_connectivity().await
    );
    assert_eq!(1, harness.fake.disconnect_count(FIRST));

    let report = harness.service.scan_once().await;
    assert_matches!(report, ScanReport::Completed(ScanSummary { connected: 1, .. }));
    assert_eq!(
        (address(FIRST), DeviceState::Connected),
        harness.next_connectivity().await
    );
    let second_generation = harness
        .service
        .device(&address(FIRST))
        .map(|device| device.generation());
    assert!(second_generation > first_generation);
    assert_eq!(2, harness.fake.connect_count(FIRST));

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnecting_an_idle_device_is_an_error() {
    let harness = Harness::new(vec![FakePeripheral::spin(FIRST)]);

    let result = harness.service.disconnect(&address(FIRST));

    assert_matches!(result, Err(ServiceError::NotConnected { .. }));
}

#[tokio::test(start_paused = true)]
async fn connected_devices_are_not_reconnected_by_later_scans() {
    let mut harness = Harness::new(vec![FakePeripheral::spin(FIRST)]);
    harness.service.scan_once().await;
    harness.next_connectivity().await;

    let report = harness.service.scan_once().await;

    assert_eq!(
        ScanReport::Completed(ScanSummary {
            seen: 1,
            registered: 0,
            attempted: 0,
            connected: 0,
        }),
        report
    );
    assert_eq!(
        ConnectOutcome::AlreadyActive,
        harness.service.connect(&address(FIRST)).await
    );
    assert_eq!(1, harness.fake.connect_count(FIRST));

    harness.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_every_remote_and_stops_scanning() {
    let mut harness = Harness::new(vec![
        FakePeripheral::spin(FIRST),
        FakePeripheral::spin(SECOND),
    ]);
    harness.service.scan_once().await;
    harness.next_connectivity().await;
    harness.next_connectivity().await;

    harness.service.shutdown().await;

    let mut disconnected = vec![
        harness.next_connectivity().await,
        harness.next_connectivity().await,
    ];
    disconnected.sort_by(|left, right| left.0.as_str().cmp(right.0.as_str()));
    assert_eq!(
        vec![
            (address(FIRST), DeviceState::Disconnected),
            (address(SECOND), DeviceState::Disconnected),
        ],
        disconnected
    );
    assert_eq!(1, harness.fake.disconnect_count(FIRST));
    assert_eq!(1, harness.fake.disconnect_count(SECOND));
    assert_matches!(harness.service.scan_once().await, ScanReport::Skipped { .. });
}
