use serde_with::SerializeDisplay;
use strum_macros::{Display, EnumIter};

use crate::protocol::ACTION_CODE_COUNT;

/// Gestures reported by the SPIN action characteristic.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, SerializeDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum Gesture {
    RotateRightSideUpClockwise,
    RotateRightSideUpCounterclockwise,
    RotateSidewaysClockwise,
    RotateSidewaysCounterclockwise,
    RotateUpsideDownClockwise,
    RotateUpsideDownCounterclockwise,
    TouchpadSwipeUp,
    TouchpadSwipeDown,
    TouchpadSwipeLeft,
    TouchpadSwipeRight,
    TouchpadPressNorth,
    TouchpadPressSouth,
    TouchpadPressEast,
    TouchpadPressWest,
    TouchpadPressCenter,
    TouchpadLongPressNorth,
    TouchpadLongPressSouth,
    TouchpadLongPressEast,
    TouchpadLongPressWest,
    TouchpadLongPressCenter,
    TouchpadScrollClockwise,
    TouchpadScrollCounterclockwise,
    /// Firmware slot with no assigned gesture.
    Reserved,
    SpinWakeUp,
}

/// Action codes indexed by the notified byte.
pub(crate) const ACTION_TABLE: [Gesture; ACTION_CODE_COUNT] = [
    Gesture::RotateRightSideUpClockwise,
    Gesture::RotateRightSideUpCounterclockwise,
    Gesture::RotateSidewaysClockwise,
    Gesture::RotateSidewaysCounterclockwise,
    Gesture::RotateUpsideDownClockwise,
    Gesture::RotateUpsideDownCounterclockwise,
    Gesture::TouchpadSwipeUp,
    Gesture::TouchpadSwipeDown,
    Gesture::TouchpadSwipeLeft,
    Gesture::TouchpadSwipeRight,
    Gesture::TouchpadPressNorth,
    Gesture::TouchpadPressSouth,
    Gesture::TouchpadPressEast,
    Gesture::TouchpadPressWest,
    Gesture::TouchpadPressCenter,
    Gesture::TouchpadLongPressNorth,
    Gesture::TouchpadLongPressSouth,
    Gesture::TouchpadLongPressEast,
    Gesture::TouchpadLongPressWest,
    Gesture::TouchpadLongPressCenter,
    Gesture::TouchpadScrollClockwise,
    Gesture::TouchpadScrollCounterclockwise,
    Gesture::Reserved,
    Gesture::Reserved,
    Gesture::SpinWakeUp,
];

/// Outcome of looking up one action byte.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, derive_more::Display, SerializeDisplay)]
pub enum ActionCode {
    #[display("{_0}")]
    Gesture(Gesture),
    /// Byte outside the action table.
    #[display("unknown")]
    Unknown(u8),
}

impl ActionCode {
    /// Returns the gesture when the code was in range.
    #[must_use]
    pub fn gesture(self) -> Option<Gesture> {
        match self {
            Self::Gesture(gesture) => Some(gesture),
            Self::Unknown(_code) => None,
        }
    }
}

/// Maps an action notification byte to its gesture.
///
/// ```
/// use spin_remote::{ActionCode, Gesture, decode_action};
///
/// assert_eq!(ActionCode::Gesture(Gesture::TouchpadPressCenter), decode_action(14));
/// assert_eq!(ActionCode::Unknown(200), decode_action(200));
/// ```
#[must_use]
pub fn decode_action(code: u8) -> ActionCode {
    ACTION_TABLE
        .get(usize::from(code))
        .map_or(ActionCode::Unknown(code), |gesture| {
            ActionCode::Gesture(*gesture)
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, "rotate_right_side_up_clockwise")]
    #[case(1, "rotate_right_side_up_counterclockwise")]
    #[case(2, "rotate_sideways_clockwise")]
    #[case(3, "rotate_sideways_counterclockwise")]
    #[case(4, "rotate_upside_down_clockwise")]
    #[case(5, "rotate_upside_down_counterclockwise")]
    #[case(6, "touchpad_swipe_up")]
    #[case(7, "touchpad_swipe_down")]
    #[case(8, "touchpad_swipe_left")]
    #[case(9, "touchpad_swipe_right")]
    #[case(10, "touchpad_press_north")]
    #[case(11, "touchpad_press_south")]
    #[case(12, "touchpad_press_east")]
    #[case(13, "touchpad_press_west")]
    #[case(14, "touchpad_press_center")]
    #[case(15, "touchpad_long_press_north")]
    #[case(16, "touchpad_long_press_south")]
    #[case(17, "touchpad_long_press_east")]
    #[case(18, "touchpad_long_press_west")]
    #[case(19, "touchpad_long_press_center")]
    #[case(20, "touchpad_scroll_clockwise")]
    #[case(21, "touchpad_scroll_counterclockwise")]
    #[case(22, "reserved")]
    #[case(23, "reserved")]
    #[case(24, "spin_wake_up")]
    fn decode_action_matches_table(#[case] code: u8, #[case] expected: &str) {
        assert_eq!(expected, decode_action(code).to_string());
    }

    #[rstest]
    #[case(25)]
    #[case(0x80)]
    #[case(u8::MAX)]
    fn out_of_range_codes_are_unknown(#[case] code: u8) {
        let decoded = decode_action(code);
        assert_eq!(ActionCode::Unknown(code), decoded);
        assert_eq!("unknown", decoded.to_string());
        assert_eq!(None, decoded.gesture());
    }
}
