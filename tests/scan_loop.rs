use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use spin_remote::{
    ConnectOutcome, DeviceAddress, FakeBackend, FakeBackendConfig, FakePeripheral, ScanReport,
    ServiceConfig, SkipReason, SpinService, channel_event_sink,
};

fn service_with(
    peripherals: Vec<FakePeripheral>,
    scan_delay: Duration,
) -> (SpinService, spin_remote::FakeHandle) {
    service_with_backend(
        FakeBackendConfig::builder()
            .peripherals(peripherals)
            .scan_delay(scan_delay)
            .build(),
    )
}

fn service_with_backend(config: FakeBackendConfig) -> (SpinService, spin_remote::FakeHandle) {
    let backend = FakeBackend::new(config);
    let fake = backend.handle();
    let (sink, _events) = channel_event_sink();
    let config = ServiceConfig::builder()
        .scan_interval(Duration::from_secs(30))
        .scan_timeout(Duration::from_secs(10))
        .build();
    (
        SpinService::new(config, Arc::new(backend), Arc::new(sink)),
        fake,
    )
}

#[tokio::test(start_paused = true)]
async fn scan_loop_runs_once_per_interval_until_shutdown() {
    let (service, fake) = service_with(vec![FakePeripheral::spin("AA:BB")], Duration::ZERO);
    let scanner = service.clone();
    let task = tokio::spawn(async move { scanner.run_scan_loop().await });

    tokio::time::sleep(Duration::from_secs(65)).await;
    service.shutdown().await;
    task.await.expect("scan loop should exit cleanly");

    assert_eq!(3, fake.scan_count());
    assert_eq!(1, fake.connect_count("AA:BB"));
}

#[tokio::test(start_paused = true)]
async fn overlapping_pass_is_skipped_while_radio_is_busy() {
    let (service, fake) = service_with(vec![FakePeripheral::spin("AA:BB")], Duration::from_secs(8));
    let scanner = service.clone();
    let task = tokio::spawn(async move { scanner.run_scan_loop().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let report = service.scan_once().await;

    assert_eq!(
        ScanReport::Skipped {
            reason: SkipReason::RadioBusy
        },
        report
    );
    assert_eq!(1, fake.scan_count());

    service.shutdown().await;
    task.await.expect("scan loop should exit cleanly");
}

#[tokio::test(start_paused = true)]
async fn scan_loop_exits_immediately_when_already_stopped() {
    let (service, fake) = service_with(vec![FakePeripheral::spin("AA:BB")], Duration::ZERO);
    service.shutdown().await;

    service.run_scan_loop().await;

    assert_eq!(0, fake.scan_count());
    assert_matches!(
        service.scan_once().await,
        ScanReport::Skipped {
            reason: SkipReason::Stopping
        }
    );
}

#[tokio::test(start_paused = true)]
async fn pass_is_skipped_while_its_connection_attempt_holds_the_radio() {
    let (service, fake) = service_with_backend(
        FakeBackendConfig::builder()
            .peripherals(vec![FakePeripheral::spin("AA:BB")])
            .connect_delay(Duration::from_secs(5))
            .build(),
    );
    let scanner = service.clone();
    let first_pass = tokio::spawn(async move { scanner.scan_once().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let overlapping = service.scan_once().await;
    let manual = service.connect(&DeviceAddress::new("AA:BB")).await;

    assert_eq!(
        ScanReport::Skipped {
            reason: SkipReason::RadioBusy
        },
        overlapping
    );
    assert_eq!(ConnectOutcome::RadioBusy, manual);
    assert_matches!(
        first_pass.await.expect("first pass should finish"),
        ScanReport::Completed(summary) if summary.connected == 1
    );
    assert_eq!(1, fake.scan_count());
    assert_eq!(1, fake.connect_count("AA:BB"));

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_connect_holds_the_radio_against_discovery() {
    let (service, fake) = service_with_backend(
        FakeBackendConfig::builder()
            .peripherals(vec![
                FakePeripheral::builder()
                    .address("AA:BB")
                    .connect_failures(1)
                    .build(),
            ])
            .connect_delay(Duration::from_secs(5))
            .build(),
    );
    assert_matches!(
        service.scan_once().await,
        ScanReport::Completed(summary) if summary.registered == 1 && summary.connected == 0
    );

    let connector = service.clone();
    let connect = tokio::spawn(async move {
        connector.connect(&DeviceAddress::new("AA:BB")).await
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    let overlapping = service.scan_once().await;

    assert_eq!(
        ScanReport::Skipped {
            reason: SkipReason::RadioBusy
        },
        overlapping
    );
    assert_eq!(
        ConnectOutcome::Connected,
        connect.await.expect("connect task should finish")
    );
    assert_eq!(1, fake.scan_count());
    assert_eq!(2, fake.connect_count("AA:BB"));

    service.shutdown().await;
}
