use std::io;

use anyhow::Result;
use tokio::io::AsyncBufRead;
use tracing::{info, instrument};

use crate::cli::ui::Painter;
use crate::cli::{Args, CliCommand, LogLevel, OutputFormat};
use crate::config::ServiceConfig;
use crate::hw::{HardwareBackend, transport_from_backend};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Runs the parsed CLI arguments against the process terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = spin_remote::Args::try_parse_from([
///     "spin-remote",
///     "--output-format",
///     "json",
///     "--fake",
///     "--fake-scan",
///     "AA:BB:CC:DD:EE:FF|SPIN|-43|spin",
///     "scan",
/// ])?;
/// let mut out = Vec::new();
/// spin_remote::run(args, tokio::io::empty(), &mut out).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if configuration or tracing initialisation fails, the BLE
/// backend cannot be opened, or output writing fails.
pub async fn run<R, W>(args: Args, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    run_with_clients(args, input, out, &SystemTerminalClient).await
}

/// Runs the parsed CLI arguments with an injected terminal client.
///
/// # Errors
///
/// Returns an error if configuration or tracing initialisation fails, the BLE
/// backend cannot be opened, or output writing fails.
pub async fn run_with_clients<R, W>(
    args: Args,
    input: R,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    let log_level = args.log_level();
    telemetry::initialise_tracing(
        "spin-remote",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let output_format = args.output_format().unwrap_or(if terminal_client.stdout_is_terminal() {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    let config_path = args.config_path().map(std::path::Path::to_path_buf);
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let config =
        ServiceConfig::load(config_path.as_deref())?.with_overrides(command.config_overrides());

    run_command(
        command,
        config,
        maybe_fake_args.map_or(
            HardwareBackend::Real {
                adapter_index: config.device(),
            },
            |fake_args| HardwareBackend::Fake(fake_args.into_backend_config()),
        ),
        input,
        out,
        output_format,
        &Painter::new(terminal_client.stdout_is_terminal()),
    )
    .await
}

#[instrument(
    skip(config, backend, input, out, painter),
    level = "info",
    fields(command = %command.name(), ?output_format)
)]
async fn run_command<R, W>(
    command: CliCommand,
    config: ServiceConfig,
    backend: HardwareBackend,
    input: R,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    let transport = transport_from_backend(backend).await?;
    info!(?config, "starting");

    match command {
        CliCommand::Run(args) => {
            crate::cli::run::run(transport, config, &args, input, out, output_format, painter)
                .await
        }
        CliCommand::Scan(_args) => {
            crate::cli::scan::run(transport, config, out, output_format, painter).await
        }
    }
}
