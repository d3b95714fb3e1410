use std::fmt::{self, Display, Formatter};

use crate::handlers::ProfileHandler;
use crate::service::{DeviceSnapshot, ScanReport};

use super::painter::Painter;
use super::table::Table;

/// Renders a discovery pass and the resulting device table.
pub(crate) struct ScanReportView<'a> {
    report: &'a ScanReport,
    devices: &'a [DeviceSnapshot],
    painter: &'a Painter,
}

impl<'a> ScanReportView<'a> {
    pub(crate) fn new(
        report: &'a ScanReport,
        devices: &'a [DeviceSnapshot],
        painter: &'a Painter,
    ) -> Self {
        Self {
            report,
            devices,
            painter,
        }
    }

    fn summary(&self) -> String {
        match self.report {
            ScanReport::Skipped { reason } => self.painter.warning(format!("skipped ({reason})")),
            ScanReport::Failed { error } => self.painter.warning(format!("failed: {error}")),
            ScanReport::Completed(summary) => format!(
                "{} seen, {} new, {} attempted, {} connected",
                self.painter.value(summary.seen.to_string()),
                self.painter.value(summary.registered.to_string()),
                self.painter.value(summary.attempted.to_string()),
                self.painter.value(summary.connected.to_string()),
            ),
        }
    }

    fn device_row(&self, device: &DeviceSnapshot) -> Vec<String> {
        vec![
            self.painter.value(device.address().as_str()),
            device.local_name().unwrap_or("-").to_string(),
            self.painter.state(device.state()),
            ProfileHandler::profile_name(device.profile()),
            self.painter.muted(device.last_error().unwrap_or("-")),
        ]
    }
}

impl Display for ScanReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.painter.heading("Discovery pass:"),
            self.summary()
        )?;
        if self.devices.is_empty() {
            return write!(f, "\n{}", self.painter.muted("no SPIN remotes found"));
        }

        let rows = self
            .devices
            .iter()
            .map(|device| self.device_row(device))
            .collect();
        let table = Table::grid(["address", "name", "state", "profile", "last_error"], rows);
        write!(f, "\n{table}")
    }
}
