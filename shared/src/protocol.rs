//! Role tokens and client commands
//!
//! Both are free-form text on the wire and are matched case-insensitively.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while interpreting protocol text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid role token: {0:?}")]
    InvalidRole(String),
}

/// Role a participant registers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    /// Interpret a registration token.
    ///
    /// Anything starting with "doktor" is a doctor, anything starting with
    /// "hasta" is a patient.
    pub fn from_token(token: &str) -> Result<Self, ProtocolError> {
        let normalized = token.trim().to_lowercase();
        if normalized.starts_with("doktor") {
            Ok(Role::Doctor)
        } else if normalized.starts_with("hasta") {
            Ok(Role::Patient)
        } else {
            Err(ProtocolError::InvalidRole(token.trim().to_string()))
        }
    }

    /// The token a client sends to register with this role
    pub fn token(&self) -> &'static str {
        match self {
            Role::Doctor => "Doktor",
            Role::Patient => "Hasta",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Commands sent by registered participants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Doctor asks for the next patient ("hasta kabul")
    RequestNext,
    /// Patient accepts the call ("evet" / "kabul")
    Accept,
    /// Patient rejects the call ("hayır")
    Reject,
}

impl Command {
    /// Decode a command line, returning `None` for unrecognized text
    pub fn parse(line: &str) -> Option<Self> {
        let normalized = line.trim().to_lowercase();
        match normalized.as_str() {
            "hasta kabul" => Some(Command::RequestNext),
            "evet" | "kabul" => Some(Command::Accept),
            // Lowercasing "HAYIR" yields a dotted i
            "hayır" | "hayir" => Some(Command::Reject),
            _ => None,
        }
    }

    /// Canonical wire text for this command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::RequestNext => "Hasta Kabul",
            Command::Accept => "evet",
            Command::Reject => "hayır",
        }
    }

    /// Whether a participant with `role` may send this command
    pub fn allowed_for(&self, role: Role) -> bool {
        match self {
            Command::RequestNext => role == Role::Doctor,
            Command::Accept | Command::Reject => role == Role::Patient,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tokens() {
        assert_eq!(Role::from_token("Doktor"), Ok(Role::Doctor));
        assert_eq!(Role::from_token("doktor ahmet"), Ok(Role::Doctor));
        assert_eq!(Role::from_token("  HASTA\r"), Ok(Role::Patient));
        assert!(matches!(
            Role::from_token("hemşire"),
            Err(ProtocolError::InvalidRole(_))
        ));
        assert!(Role::from_token("").is_err());
    }

    #[test]
    fn test_command_parsing_is_case_insensitive() {
        assert_eq!(Command::parse("Hasta Kabul"), Some(Command::RequestNext));
        assert_eq!(Command::parse("HASTA KABUL"), Some(Command::RequestNext));
        assert_eq!(Command::parse("Evet"), Some(Command::Accept));
        assert_eq!(Command::parse("kabul\n"), Some(Command::Accept));
        assert_eq!(Command::parse("hayır"), Some(Command::Reject));
        assert_eq!(Command::parse("HAYIR"), Some(Command::Reject));
        assert_eq!(Command::parse("belki"), None);
    }

    #[test]
    fn test_command_roles() {
        assert!(Command::RequestNext.allowed_for(Role::Doctor));
        assert!(!Command::RequestNext.allowed_for(Role::Patient));
        assert!(Command::Accept.allowed_for(Role::Patient));
        assert!(!Command::Reject.allowed_for(Role::Doctor));
    }

    #[test]
    fn test_canonical_text_parses_back() {
        for cmd in [Command::RequestNext, Command::Accept, Command::Reject] {
            assert_eq!(Command::parse(cmd.as_str()), Some(cmd));
        }
    }
}
