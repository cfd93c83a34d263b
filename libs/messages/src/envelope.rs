//! Endpoint addresses and the addressed message envelope.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::types::Message;

/// The address of a message endpoint: `name@host:port`.
///
/// The name identifies the role behind the address (`master`, `slave`, an
/// executor, a scheduler); the host/port pair is where its inbox lives.
/// Endpoints compare by their full rendered form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    name: String,
    address: String,
}

impl Endpoint {
    /// Creates an endpoint from a role name and a `host:port` address.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Parses an endpoint from its `name@host:port` form.
    pub fn parse(s: &str) -> Result<Self, MessageError> {
        let Some((name, address)) = s.split_once('@') else {
            return Err(MessageError::InvalidEndpoint(format!(
                "missing '@' in {s:?}"
            )));
        };

        if name.is_empty() || address.is_empty() {
            return Err(MessageError::InvalidEndpoint(format!(
                "empty name or address in {s:?}"
            )));
        }

        if !address.contains(':') {
            return Err(MessageError::InvalidEndpoint(format!(
                "missing port in {s:?}"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            address: address.to_string(),
        })
    }

    /// The role name of this endpoint.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `host:port` part of this endpoint.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Endpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An addressed wire message: who sent it, who it is for, and the payload.
///
/// A transport codec frames envelopes however it likes; within a process
/// they are passed around as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending endpoint.
    pub from: Endpoint,

    /// Receiving endpoint.
    pub to: Endpoint,

    /// The protocol message.
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let ep = Endpoint::parse("master@10.0.0.1:5050").unwrap();
        assert_eq!(ep.name(), "master");
        assert_eq!(ep.address(), "10.0.0.1:5050");
        assert_eq!(ep.to_string(), "master@10.0.0.1:5050");
    }

    #[test]
    fn test_endpoint_parse_rejects_malformed() {
        assert!(Endpoint::parse("no-separator").is_err());
        assert!(Endpoint::parse("@host:1").is_err());
        assert!(Endpoint::parse("name@").is_err());
        assert!(Endpoint::parse("name@host-without-port").is_err());
    }

    #[test]
    fn test_endpoint_serde_roundtrip() {
        let ep = Endpoint::parse("slave@127.0.0.1:5051").unwrap();
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"slave@127.0.0.1:5051\"");

        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope {
            from: Endpoint::parse("master@10.0.0.1:5050").unwrap(),
            to: Endpoint::parse("slave@10.0.0.2:5051").unwrap(),
            message: Message::Ping,
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.from, envelope.from);
        assert_eq!(back.to, envelope.to);
        assert!(matches!(back.message, Message::Ping));
    }
}
