use serde::Deserialize;
use tracing::instrument;

use crate::error::InteractionError;
use crate::hw::{BleSession, WriteMode};

use super::{Command, CommandCodec};

/// RGB colour value.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(from = "[u8; 3]")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates an RGB colour.
    ///
    /// ```
    /// use spin_remote::Rgb;
    ///
    /// let colour = Rgb::new(255, 127, 0);
    /// assert_eq!(255, colour.r);
    /// ```
    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Returns whether every channel is zero.
    #[must_use]
    pub fn is_black(self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// Handler for the forced LED colour.
pub struct LedColourHandler;

impl LedColourHandler {
    /// Maps a requested colour to the command that applies it.
    ///
    /// Black releases the LED back to the firmware rather than forcing it off.
    ///
    /// ```
    /// use spin_remote::{Command, LedColourHandler, Rgb};
    ///
    /// assert_eq!(Command::ClearColor, LedColourHandler::colour_command(Rgb::new(0, 0, 0)));
    /// ```
    #[must_use]
    pub fn colour_command(colour: Rgb) -> Command {
        if colour.is_black() {
            Command::ClearColor
        } else {
            Command::SetColor {
                r: colour.r,
                g: colour.g,
                b: colour.b,
            }
        }
    }

    /// Applies `colour`, clearing the forced colour when it is black.
    ///
    /// # Errors
    ///
    /// Returns an error when the BLE write fails.
    #[instrument(skip(session), level = "debug", fields(address = %session.address()))]
    pub async fn set_colour(session: &dyn BleSession, colour: Rgb) -> Result<(), InteractionError> {
        Self::write(session, Self::colour_command(colour)).await
    }

    /// Removes any forced LED colour.
    ///
    /// # Errors
    ///
    /// Returns an error when the BLE write fails.
    #[instrument(skip(session), level = "debug", fields(address = %session.address()))]
    pub async fn clear_colour(session: &dyn BleSession) -> Result<(), InteractionError> {
        Self::write(session, Command::ClearColor).await
    }

    async fn write(session: &dyn BleSession, command: Command) -> Result<(), InteractionError> {
        session
            .write(
                command.endpoint(),
                &CommandCodec::encode(command),
                WriteMode::WithResponse,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Rgb::new(0, 0, 0), Command::ClearColor)]
    #[case(Rgb::new(0, 0, 1), Command::SetColor { r: 0, g: 0, b: 1 })]
    #[case(Rgb::new(255, 0, 0), Command::SetColor { r: 255, g: 0, b: 0 })]
    fn colour_command_maps_black_to_clear(#[case] colour: Rgb, #[case] expected: Command) {
        assert_eq!(expected, LedColourHandler::colour_command(colour));
    }

    #[test]
    fn rgb_deserialises_from_triplet() {
        let colour: Rgb = serde_json::from_str("[12, 34, 56]").expect("triplet should parse");
        assert_eq!(Rgb::new(12, 34, 56), colour);
    }

    #[test]
    fn rgb_rejects_out_of_range_channels() {
        assert_eq!(true, serde_json::from_str::<Rgb>("[256, 0, 0]").is_err());
    }
}
