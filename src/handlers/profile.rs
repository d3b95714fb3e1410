use tracing::instrument;

use crate::error::{InteractionError, ServiceError};
use crate::hw::{BleSession, WriteMode};

use super::{Command, CommandCodec};

const PROFILE_PREFIX: &str = "profile_";

/// Handler for reading and switching the active SPIN profile.
pub struct ProfileHandler;

impl ProfileHandler {
    /// Parses a `profile_N` option name into its profile id.
    ///
    /// ```
    /// use spin_remote::ProfileHandler;
    ///
    /// assert_eq!(3, ProfileHandler::parse_profile_name("profile_3")?);
    /// # Ok::<(), spin_remote::ServiceError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidProfileName`] for anything other than
    /// `profile_` followed by a decimal byte.
    pub fn parse_profile_name(value: &str) -> Result<u8, ServiceError> {
        let invalid = || ServiceError::InvalidProfileName {
            value: value.to_string(),
        };
        let digits = value.strip_prefix(PROFILE_PREFIX).ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse().map_err(|_error| invalid())
    }

    /// Formats a profile id as its `profile_N` option name.
    #[must_use]
    pub fn profile_name(profile: u8) -> String {
        format!("{PROFILE_PREFIX}{profile}")
    }

    /// Writes `profile` to the profile characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error when the BLE write fails.
    #[instrument(skip(session), level = "debug", fields(address = %session.address()))]
    pub async fn set_profile(session: &dyn BleSession, profile: u8) -> Result<(), InteractionError> {
        let command = Command::SetProfile(profile);
        session
            .write(
                command.endpoint(),
                &CommandCodec::encode(command),
                WriteMode::WithResponse,
            )
            .await
    }
}
