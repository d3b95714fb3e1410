pub(crate) mod command;
pub(crate) mod run;
pub(crate) mod scan;
pub(crate) mod ui;

pub use self::command::{Args, CliCommand, FakeArgs, LogLevel, OutputFormat, RunArgs, ScanArgs};
