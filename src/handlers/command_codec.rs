use crate::protocol::EndpointId;

const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];
const ENABLE_COMMAND_CHANNEL: [u8; 2] = [0x08, 0x01];
const SET_COLOUR_OPCODE: u8 = 0x09;
const CLEAR_COLOUR_OPCODE: u8 = 0x07;

/// Outbound instructions understood by SPIN firmware.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Command {
    /// Client characteristic config "notify" bit, written to a descriptor.
    EnableActionNotifications,
    /// Arms the command channel.
    EnableCommandChannel,
    /// Selects the active profile.
    SetProfile(u8),
    /// Forces the LED to an RGB colour.
    SetColor { r: u8, g: u8, b: u8 },
    /// Removes any forced LED colour.
    ClearColor,
}

impl Command {
    /// Returns the characteristic this command is written to.
    ///
    /// `EnableActionNotifications` targets the action characteristic's client
    /// configuration descriptor rather than the characteristic value.
    #[must_use]
    pub fn endpoint(self) -> EndpointId {
        match self {
            Self::EnableActionNotifications => EndpointId::ActionCharacteristic,
            Self::SetProfile(_profile) => EndpointId::ProfileIdCharacteristic,
            Self::EnableCommandChannel | Self::SetColor { .. } | Self::ClearColor => {
                EndpointId::CommandCharacteristic
            }
        }
    }
}

/// Fixed-layout encoder and decoder for SPIN commands and notifications.
pub struct CommandCodec;

impl CommandCodec {
    /// Encodes a command into its wire bytes.
    ///
    /// ```
    /// use spin_remote::{Command, CommandCodec};
    ///
    /// let bytes = CommandCodec::encode(Command::SetColor { r: 255, g: 0, b: 0 });
    /// assert_eq!(vec![0x09, 0xFF, 0x00, 0x00], bytes);
    /// ```
    #[must_use]
    pub fn encode(command: Command) -> Vec<u8> {
        match command {
            Command::EnableActionNotifications => Self::encode_enable_notifications().to_vec(),
            Command::EnableCommandChannel => Self::encode_enable_command_channel().to_vec(),
            Command::SetProfile(profile) => Self::encode_set_profile(profile).to_vec(),
            Command::SetColor { r, g, b } => Self::encode_set_color(r, g, b).to_vec(),
            Command::ClearColor => Self::encode_clear_color().to_vec(),
        }
    }

    #[must_use]
    pub fn encode_enable_notifications() -> [u8; 2] {
        ENABLE_NOTIFICATIONS
    }

    #[must_use]
    pub fn encode_enable_command_channel() -> [u8; 2] {
        ENABLE_COMMAND_CHANNEL
    }

    /// The profile characteristic takes the bare id byte, no opcode envelope.
    #[must_use]
    pub fn encode_set_profile(profile: u8) -> [u8; 1] {
        [profile]
    }

    #[must_use]
    pub fn encode_set_color(r: u8, g: u8, b: u8) -> [u8; 4] {
        [SET_COLOUR_OPCODE, r, g, b]
    }

    #[must_use]
    pub fn encode_clear_color() -> [u8; 1] {
        [CLEAR_COLOUR_OPCODE]
    }

    /// Decodes bytes written to the command characteristic back into a command.
    ///
    /// Returns `None` for sequences that are not one of the known layouts.
    #[must_use]
    pub fn decode_command(payload: &[u8]) -> Option<Command> {
        match payload {
            payload if payload == ENABLE_COMMAND_CHANNEL => Some(Command::EnableCommandChannel),
            [SET_COLOUR_OPCODE, r, g, b] => Some(Command::SetColor {
                r: *r,
                g: *g,
                b: *b,
            }),
            [CLEAR_COLOUR_OPCODE] => Some(Command::ClearColor),
            _ => None,
        }
    }

    /// Decodes a write to `endpoint` back into a command.
    #[must_use]
    pub fn decode_write(endpoint: EndpointId, payload: &[u8]) -> Option<Command> {
        match endpoint {
            EndpointId::CommandCharacteristic => Self::decode_command(payload),
            EndpointId::ProfileIdCharacteristic => match payload {
                [profile] => Some(Command::SetProfile(*profile)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Decodes a profile id from a read or notification payload.
    ///
    /// Every byte value is a valid profile; only the first byte is significant.
    #[must_use]
    pub fn decode_profile_change(payload: &[u8]) -> Option<u8> {
        payload.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Command::EnableActionNotifications, vec![0x01, 0x00])]
    #[case(Command::EnableCommandChannel, vec![0x08, 0x01])]
    #[case(Command::SetProfile(3), vec![0x03])]
    #[case(Command::SetColor { r: 255, g: 0, b: 0 }, vec![0x09, 0xFF, 0x00, 0x00])]
    #[case(Command::ClearColor, vec![0x07])]
    fn encode_matches_wire_layout(#[case] command: Command, #[case] expected: Vec<u8>) {
        assert_eq!(expected, CommandCodec::encode(command));
    }

    #[rstest]
    #[case(0x12, 0x34, 0x56)]
    #[case(0, 0, 1)]
    #[case(255, 255, 255)]
    fn set_color_decodes_to_same_channels(#[case] r: u8, #[case] g: u8, #[case] b: u8) {
        let bytes = CommandCodec::encode_set_color(r, g, b);
        assert_eq!(
            Some(Command::SetColor { r, g, b }),
            CommandCodec::decode_command(&bytes)
        );
    }

    #[rstest]
    #[case(&[0x08, 0x01], Command::EnableCommandChannel)]
    #[case(&[0x07], Command::ClearColor)]
    fn decode_command_recognises_fixed_sequences(#[case] payload: &[u8], #[case] expected: Command) {
        assert_eq!(Some(expected), CommandCodec::decode_command(payload));
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x09, 0x01])]
    #[case(&[0x42])]
    fn decode_command_rejects_unknown_layouts(#[case] payload: &[u8]) {
        assert_eq!(None, CommandCodec::decode_command(payload));
    }

    #[test]
    fn decode_write_routes_profile_writes() {
        assert_eq!(
            Some(Command::SetProfile(7)),
            CommandCodec::decode_write(EndpointId::ProfileIdCharacteristic, &[7])
        );
    }

    #[rstest]
    #[case(&[0x00], Some(0))]
    #[case(&[0xFF, 0x01], Some(255))]
    #[case(&[], None)]
    fn decode_profile_change_reads_first_byte(#[case] payload: &[u8], #[case] expected: Option<u8>) {
        assert_eq!(expected, CommandCodec::decode_profile_change(payload));
    }

    #[test]
    fn commands_target_expected_endpoints() {
        assert_eq!(
            EndpointId::CommandCharacteristic,
            Command::ClearColor.endpoint()
        );
        assert_eq!(
            EndpointId::ProfileIdCharacteristic,
            Command::SetProfile(1).endpoint()
        );
    }
}
