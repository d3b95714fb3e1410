mod action_table;
mod colour;
mod command_codec;
mod profile;

pub use self::action_table::{ActionCode, Gesture, decode_action};
pub use self::colour::{LedColourHandler, Rgb};
pub use self::command_codec::{Command, CommandCodec};
pub use self::profile::ProfileHandler;
