use std::fmt::{self, Display, Formatter};

use time::format_description::well_known::Rfc3339;

use crate::events::ServiceEvent;
use crate::handlers::ProfileHandler;

use super::painter::Painter;

/// Renders one service event as a single line.
pub(crate) struct EventView<'a> {
    event: &'a ServiceEvent,
    painter: &'a Painter,
}

impl<'a> EventView<'a> {
    pub(crate) fn new(event: &'a ServiceEvent, painter: &'a Painter) -> Self {
        Self { event, painter }
    }
}

impl Display for EventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (timestamp, detail) = match self.event {
            ServiceEvent::Gesture(event) => (
                event.timestamp(),
                format!(
                    "gesture {} {}",
                    self.painter.success(event.action().to_string()),
                    self.painter.muted(format!("code=0x{:02X}", event.code()))
                ),
            ),
            ServiceEvent::ProfileChanged(event) => (
                event.timestamp(),
                format!(
                    "profile {}",
                    self.painter.value(ProfileHandler::profile_name(event.profile()))
                ),
            ),
            ServiceEvent::Connectivity(event) => {
                (event.timestamp(), self.painter.state(event.state()))
            }
        };
        let timestamp = timestamp.format(&Rfc3339).map_err(|_error| fmt::Error)?;

        write!(
            f,
            "{} {} {detail}",
            self.painter.muted(timestamp),
            self.painter.value(self.event.address().as_str())
        )
    }
}

/// Renders a rejected or failed service call.
pub(crate) struct CallErrorView<'a> {
    message: &'a str,
    painter: &'a Painter,
}

impl<'a> CallErrorView<'a> {
    pub(crate) fn new(message: &'a str, painter: &'a Painter) -> Self {
        Self { message, painter }
    }
}

impl Display for CallErrorView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.painter.warning("call failed:"), self.message)
    }
}
