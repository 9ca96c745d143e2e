//! Text control commands
//!
//! Commands arrive from an external controller as single lines:
//!
//! ```text
//! feature:<name>:<enable|disable|toggle>
//! ```
//!
//! Parts are trimmed of surrounding whitespace. Replies are produced by
//! [`FeatureManager::apply_command`](crate::features::FeatureManager::apply_command).

use thiserror::Error;

/// What to do with the named feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Enable,
    Disable,
    Toggle,
}

impl ControlAction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "enable" => Some(ControlAction::Enable),
            "disable" => Some(ControlAction::Disable),
            "toggle" => Some(ControlAction::Toggle),
            _ => None,
        }
    }
}

/// A parsed control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Feature { name: String, action: ControlAction },
}

/// Why a command line was rejected; `Display` is the reply text
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("ERROR: Invalid format")]
    InvalidFormat,

    #[error("ERROR: Unknown command")]
    UnknownCommand,

    #[error("ERROR: Unknown feature")]
    UnknownFeature,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        let parts: Vec<&str> = line.split(':').map(str::trim).collect();

        match parts.as_slice() {
            ["feature", name, action] => {
                if name.is_empty() {
                    return Err(ControlError::InvalidFormat);
                }
                let action = ControlAction::parse(action).ok_or(ControlError::InvalidFormat)?;
                Ok(ControlCommand::Feature {
                    name: name.to_string(),
                    action,
                })
            }
            ["feature", ..] => Err(ControlError::InvalidFormat),
            _ => Err(ControlError::UnknownCommand),
        }
    }
}
