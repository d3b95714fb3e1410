mod event_view;
mod painter;
mod scan_view;
mod table;

pub(crate) use self::event_view::{CallErrorView, EventView};
pub(crate) use self::painter::Painter;
pub(crate) use self::scan_view::ScanReportView;
