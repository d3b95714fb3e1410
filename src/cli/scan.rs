use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use crate::config::ServiceConfig;
use crate::events::channel_event_sink;
use crate::hw::BleTransport;
use crate::service::SpinService;

use super::command::OutputFormat;
use super::ui::{Painter, ScanReportView};

/// Executes the `scan` command: one discovery pass, then a clean shutdown.
pub(crate) async fn run<W>(
    transport: Arc<dyn BleTransport>,
    config: ServiceConfig,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let (sink, _events) = channel_event_sink();
    let service = SpinService::new(config, transport, Arc::new(sink));

    let report = service.scan_once().await;
    let devices = service.devices();
    service.shutdown().await;

    match output_format {
        OutputFormat::Pretty => writeln!(
            out,
            "{}",
            ScanReportView::new(&report, &devices, painter)
        )?,
        OutputFormat::Json => writeln!(
            out,
            "{}",
            json!({ "report": report, "devices": devices })
        )?,
    }
    Ok(())
}
