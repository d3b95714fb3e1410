use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::config::ConfigOverrides;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{FakeBackendConfig, FakePeripheral, NotificationPayloads, ScanFixture};

/// Command-line options for the SPIN remote bridge.
#[derive(Debug, Parser)]
#[command(name = "spin-remote", about = "Bridge SPIN SDC 1 BLE remotes to an event stream.")]
pub struct Args {
    /// Log verbosity; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output_format: Option<OutputFormat>,
    /// JSON config file; defaults to `config.json` in the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Uses the fake BLE backend with fixture-driven discovery and notifications.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `address|local_name|rssi|kind;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Initial profile reported by every fake remote.
    #[arg(long, global = true, requires = "fake")]
    fake_profile: Option<u8>,
    /// Fake notifications delivered after connect, e.g. `action:0e,profile:02,error`.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    #[command(subcommand)]
    command: CliCommand,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use spin_remote::{Args, CliCommand, ScanArgs};
    ///
    /// let args = Args::new(CliCommand::Scan(ScanArgs::default()));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: CliCommand) -> Self {
        Self {
            log_level: None,
            output_format: None,
            config: None,
            fake: false,
            fake_scan: None,
            fake_profile: None,
            fake_notifications: None,
            fake_discovery_delay: None,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            profile,
            notifications,
            discovery_delay,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_profile = profile;
        self.fake_notifications = notifications;
        self.fake_discovery_delay = Some(discovery_delay);
        self
    }

    /// Selects the output format instead of detecting it from the terminal.
    #[must_use]
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = Some(output_format);
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Splits parsed CLI arguments into command and optional fake-backend settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(CliCommand, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_profile,
            fake_notifications,
            fake_discovery_delay,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                profile: fake_profile,
                notifications: fake_notifications,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    profile: Option<u8>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    discovery_delay: Duration,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            profile,
            notifications,
            discovery_delay,
        } = self;
        let notifications = notifications.map(Vec::from);

        let peripherals: Vec<FakePeripheral> = Vec::from(scan_fixture)
            .into_iter()
            .map(|peripheral| {
                let peripheral = match profile {
                    Some(profile) => peripheral.with_profile(profile),
                    None => peripheral,
                };
                match &notifications {
                    Some(notifications) => peripheral.with_notifications(notifications.clone()),
                    None => peripheral,
                }
            })
            .collect();

        FakeBackendConfig::builder()
            .peripherals(peripherals)
            .scan_delay(discovery_delay)
            .build()
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering used for command output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, coloured on a terminal.
    Pretty,
    /// One JSON document per line.
    Json,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the bridge until Ctrl+C, printing events and reading JSON service calls from stdin.
    Run(RunArgs),
    /// Run one discovery pass and print the devices found.
    Scan(ScanArgs),
}

impl CliCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Run(_args) => "run",
            Self::Scan(_args) => "scan",
        }
    }

    pub(crate) fn config_overrides(&self) -> ConfigOverrides {
        match self {
            Self::Run(args) => ConfigOverrides::builder()
                .maybe_device(args.device)
                .maybe_scan_interval(args.scan_interval)
                .maybe_scan_timeout(args.scan_timeout)
                .build(),
            Self::Scan(args) => ConfigOverrides::builder()
                .maybe_device(args.device)
                .maybe_scan_timeout(args.scan_timeout)
                .build(),
        }
    }
}

/// Arguments for the `run` command.
#[derive(Debug, Default, clap::Args)]
pub struct RunArgs {
    /// BLE adapter index.
    #[arg(long)]
    device: Option<usize>,
    /// Period between discovery passes (e.g. `30s`).
    #[arg(long, value_parser = parse_duration)]
    scan_interval: Option<Duration>,
    /// Length of one discovery pass (e.g. `10s`).
    #[arg(long, value_parser = parse_duration)]
    scan_timeout: Option<Duration>,
    /// Stop after printing this many events. If omitted, run until Ctrl+C.
    #[arg(long)]
    max_events: Option<usize>,
}

impl RunArgs {
    /// Creates run arguments with an optional event limit.
    #[must_use]
    pub fn new(max_events: Option<usize>) -> Self {
        Self {
            max_events,
            ..Self::default()
        }
    }

    pub(crate) fn max_events(&self) -> Option<usize> {
        self.max_events
    }
}

/// Arguments for the `scan` command.
#[derive(Debug, Default, clap::Args)]
pub struct ScanArgs {
    /// BLE adapter index.
    #[arg(long)]
    device: Option<usize>,
    /// Length of the discovery pass (e.g. `10s`).
    #[arg(long, value_parser = parse_duration)]
    scan_timeout: Option<Duration>,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
