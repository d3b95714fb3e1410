use std::io;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::events::{ServiceEvent, channel_event_sink};
use crate::hw::BleTransport;
use crate::service::{ServiceCall, SpinService};

use super::command::{OutputFormat, RunArgs};
use super::ui::{CallErrorView, EventView, Painter};

/// Executes the `run` command.
///
/// Runs until Ctrl+C or until `--max-events` events have been printed.
/// Lines read from `input` are parsed as JSON service calls.
pub(crate) async fn run<R, W>(
    transport: Arc<dyn BleTransport>,
    config: ServiceConfig,
    args: &RunArgs,
    input: R,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    let (sink, mut events) = channel_event_sink();
    let service = SpinService::new(config, transport, Arc::new(sink));
    let scanner = service.clone();
    let scan_task = tokio::spawn(async move { scanner.run_scan_loop().await });

    let mut lines = input.lines();
    let mut input_open = true;
    let mut printed = 0_usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let loop_result: Result<()> = async {
        loop {
            if args.max_events().is_some_and(|limit| printed >= limit) {
                debug!(printed, "event limit reached");
                return Ok(());
            }
            tokio::select! {
                _signal = &mut ctrl_c => {
                    info!("interrupt received");
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Ok(());
                    };
                    write_event(out, &event, output_format, painter)?;
                    printed += 1;
                }
                line = lines.next_line(), if input_open => match line? {
                    Some(line) => handle_line(&service, &line, out, output_format, painter).await?,
                    None => {
                        debug!("service call input closed");
                        input_open = false;
                    }
                },
            }
        }
    }
    .await;

    service.shutdown().await;
    if let Err(error) = scan_task.await {
        warn!(%error, "scan loop task failed");
    }
    while let Ok(event) = events.try_recv() {
        write_event(out, &event, output_format, painter)?;
    }

    loop_result
}

async fn handle_line<W>(
    service: &SpinService,
    line: &str,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let outcome = match serde_json::from_str::<ServiceCall>(line) {
        Ok(call) => service
            .handle_call(call)
            .await
            .map_err(|error| format!("{error:#}")),
        Err(error) => Err(format!("invalid service call: {error}")),
    };
    if let Err(message) = outcome {
        warn!(%message, "service call failed");
        match output_format {
            OutputFormat::Pretty => writeln!(out, "{}", CallErrorView::new(&message, painter))?,
            OutputFormat::Json => writeln!(
                out,
                "{}",
                serde_json::json!({ "event": "call_error", "error": message })
            )?,
        }
    }
    Ok(())
}

fn write_event<W>(
    out: &mut W,
    event: &ServiceEvent,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", EventView::new(event, painter))?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
    }
    Ok(())
}
