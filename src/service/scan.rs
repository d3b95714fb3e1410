use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ConnectOutcome, ConnectionManager};
use super::radio::RadioLock;
use super::registry::{DeviceRegistry, Observation};
use crate::hw::BleTransport;

/// Why a discovery pass did not run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// The service is shutting down.
    Stopping,
    /// A previous pass or its connection attempts still hold the radio.
    RadioBusy,
}

/// Counts from one discovery pass.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct ScanSummary {
    /// Peripherals reported by the adapter.
    pub seen: usize,
    /// SPIN remotes registered for the first time.
    pub registered: usize,
    /// Connection attempts started.
    pub attempted: usize,
    /// Attempts that ended connected.
    pub connected: usize,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScanReport {
    Skipped { reason: SkipReason },
    Completed(ScanSummary),
    Failed { error: String },
}

/// Periodic discovery that registers new SPIN remotes and reconnects idle ones.
#[derive(Debug, Clone)]
pub(crate) struct ScanLoop {
    transport: Arc<dyn BleTransport>,
    registry: DeviceRegistry,
    connections: ConnectionManager,
    radio: RadioLock,
    stop: CancellationToken,
    scan_interval: Duration,
    scan_timeout: Duration,
}

impl ScanLoop {
    pub(crate) fn new(
        transport: Arc<dyn BleTransport>,
        registry: DeviceRegistry,
        connections: ConnectionManager,
        radio: RadioLock,
        stop: CancellationToken,
        scan_interval: Duration,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            connections,
            radio,
            stop,
            scan_interval,
            scan_timeout,
        }
    }

    /// Runs passes every `scan_interval`, starting immediately, until stopped.
    pub(crate) async fn run(&self) {
        let mut ticker = interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = %humantime::format_duration(self.scan_interval), "scan loop started");

        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                _instant = ticker.tick() => {
                    let report = self.scan_once().await;
                    debug!(?report, "discovery pass finished");
                }
            }
        }
        info!("scan loop stopped");
    }

    /// Runs one discovery pass and the connection attempts it triggers.
    ///
    /// The radio stays held until the last attempt returns.
    #[instrument(skip(self))]
    pub(crate) async fn scan_once(&self) -> ScanReport {
        if self.stop.is_cancelled() {
            return ScanReport::Skipped {
                reason: SkipReason::Stopping,
            };
        }
        let Some(_lease) = self.radio.try_acquire() else {
            debug!("radio busy; skipping discovery pass");
            return ScanReport::Skipped {
                reason: SkipReason::RadioBusy,
            };
        };

        let found = match self.transport.scan(self.scan_timeout).await {
            Ok(found) => found,
            Err(error) => {
                warn!(%error, "discovery pass failed");
                return ScanReport::Failed {
                    error: error.to_string(),
                };
            }
        };

        let mut summary = ScanSummary {
            seen: found.len(),
            ..ScanSummary::default()
        };
        let mut targets = Vec::new();
        for device in &found {
            match self.registry.observe(device) {
                Observation::Registered => {
                    info!(address = %device.address(), name = ?device.local_name(), "discovered SPIN remote");
                    summary.registered += 1;
                    targets.push(device.address().clone());
                }
                Observation::Reconnect => targets.push(device.address().clone()),
                Observation::Active | Observation::Ignored => {}
            }
        }

        for address in targets {
            if self.stop.is_cancelled() {
                break;
            }
            summary.attempted += 1;
            if self.connections.connect(address).await == ConnectOutcome::Connected {
                summary.connected += 1;
            }
        }

        ScanReport::Completed(summary)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::events::channel_event_sink;
    use crate::hw::{FakeBackend, FakeBackendConfig, FakeHandle, FakePeripheral, FakePeripheralKind};

    fn scan_loop(config: FakeBackendConfig) -> (ScanLoop, FakeHandle, RadioLock) {
        let backend = FakeBackend::new(config);
        let handle = backend.handle();
        let transport: Arc<dyn BleTransport> = Arc::new(backend);
        let (sink, _events) = channel_event_sink();
        let registry = DeviceRegistry::default();
        let stop = CancellationToken::new();
        let connections = ConnectionManager::new(
            Arc::clone(&transport),
            registry.clone(),
            Arc::new(sink),
            stop.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        let radio = RadioLock::default();
        let scan_loop = ScanLoop::new(
            transport,
            registry,
            connections,
            radio.clone(),
            stop,
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        (scan_loop, handle, radio)
    }

    #[tokio::test(start_paused = true)]
    async fn pass_connects_new_spin_remotes_only() {
        let other = FakePeripheral::builder()
            .address("CC")
            .kind(FakePeripheralKind::Other)
            .build();
        let (scan_loop, handle, radio) = scan_loop(
            FakeBackendConfig::builder()
                .peripherals(vec![FakePeripheral::spin("AA"), other])
                .build(),
        );

        let report = scan_loop.scan_once().await;

        assert_eq!(
            ScanReport::Completed(ScanSummary {
                seen: 2,
                registered: 1,
                attempted: 1,
                connected: 1,
            }),
            report
        );
        assert_eq!(0, handle.connect_count("CC"));
        assert_eq!(false, radio.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_radio_skips_the_pass() {
        let (scan_loop, handle, radio) = scan_loop(
            FakeBackendConfig::builder()
                .peripherals(vec![FakePeripheral::spin("AA")])
                .build(),
        );
        let _lease = radio.try_acquire().expect("radio should be free");

        assert_eq!(
            ScanReport::Skipped {
                reason: SkipReason::RadioBusy
            },
            scan_loop.scan_once().await
        );
        assert_eq!(0, handle.scan_count());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_loop_skips_the_pass() {
        let (scan_loop, handle, _radio) = scan_loop(
            FakeBackendConfig::builder()
                .peripherals(vec![FakePeripheral::spin("AA")])
                .build(),
        );
        scan_loop.stop.cancel();

        assert_eq!(
            ScanReport::Skipped {
                reason: SkipReason::Stopping
            },
            scan_loop.scan_once().await
        );
        assert_eq!(0, handle.scan_count());
    }

    #[tokio::test(start_paused = true)]
    async fn connected_devices_are_left_alone_and_failures_retried() {
        let flaky = FakePeripheral::builder()
            .address("BB")
            .connect_failures(1)
            .build();
        let (scan_loop, handle, _radio) = scan_loop(
            FakeBackendConfig::builder()
                .peripherals(vec![FakePeripheral::spin("AA"), flaky])
                .build(),
        );

        scan_loop.scan_once().await;
        let second = scan_loop.scan_once().await;

        assert_eq!(
            ScanReport::Completed(ScanSummary {
                seen: 2,
                registered: 0,
                attempted: 1,
                connected: 1,
            }),
            second
        );
        assert_eq!(1, handle.connect_count("AA"));
        assert_eq!(2, handle.connect_count("BB"));
    }
}
