//! Routing identity types.
//!
//! A routed client is named by a six-digit, zero-padded identifier and
//! classified as a broker or a market by the listener that accepted it.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use super::error::RouterError;

/// Number of digits in a routing identifier.
pub const CLIENT_ID_WIDTH: usize = 6;

/// Size of the identifier space (`000000` ..= `999999`).
pub const CLIENT_ID_SPACE: u32 = 1_000_000;

/// Routing identifier of a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Build an identifier from its numeric value.
    ///
    /// Values outside the identifier space wrap into it.
    pub fn from_number(value: u32) -> Self {
        Self(format!("{:0width$}", value % CLIENT_ID_SPACE, width = CLIENT_ID_WIDTH))
    }

    /// Draw a uniformly random identifier below `space`.
    pub fn random_below<R: Rng + ?Sized>(rng: &mut R, space: u32) -> Self {
        Self::from_number(rng.gen_range(0..space.clamp(1, CLIENT_ID_SPACE)))
    }

    /// Parse an identifier received from outside the router.
    ///
    /// # Errors
    /// `RouterError::InvalidClientId` unless the input is exactly six ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        if raw.len() == CLIENT_ID_WIDTH && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(RouterError::InvalidClientId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Which side of the router a client belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRole {
    Broker,
    Market,
}

impl ClientRole {
    /// Classify a connection by the local port it arrived on.
    pub const fn from_port(port: u16, broker_port: u16) -> Self {
        if port == broker_port {
            Self::Broker
        } else {
            Self::Market
        }
    }

    /// Capitalized label used in lifecycle notices.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Broker => "Broker",
            Self::Market => "Market",
        }
    }

    /// Lowercase label used for metric dimensions.
    pub const fn metric_label(self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Market => "market",
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker => write!(f, "BROKER"),
            Self::Market => write!(f, "MARKET"),
        }
    }
}
