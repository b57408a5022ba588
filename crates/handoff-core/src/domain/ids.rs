use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

macro_rules! text_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(CoreError::EmptyId($label));
                }
                if trimmed.len() == raw.len() {
                    Ok(Self(raw))
                } else {
                    Ok(Self(trimmed.to_string()))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

text_id!(SessionId, "session id");
text_id!(AgentId, "agent id");

/// Row id of a chat history entry; assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentId, MessageId, SessionId};
    use crate::error::CoreError;

    #[test]
    fn session_id_trims_whitespace() {
        let id = SessionId::new("  5551234567 ").unwrap();
        assert_eq!(id.as_str(), "5551234567");
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert_eq!(
            SessionId::new("   ").unwrap_err(),
            CoreError::EmptyId("session id")
        );
        assert_eq!("".parse::<AgentId>().unwrap_err(), CoreError::EmptyId("agent id"));
    }

    #[test]
    fn ids_serialize_as_plain_values() {
        let id = SessionId::new("5551234567").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"5551234567\"");
        let msg: MessageId = serde_json::from_str("42").unwrap();
        assert_eq!(msg, MessageId(42));
    }

    #[test]
    fn deserialized_ids_are_trimmed_and_checked() {
        let id: SessionId = serde_json::from_str("\" 5551234567 \"").unwrap();
        assert_eq!(id.as_str(), "5551234567");
        assert!(serde_json::from_str::<AgentId>("\"  \"").is_err());
    }
}
