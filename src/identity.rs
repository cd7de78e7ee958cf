//! Participant identities and their canonical string forms
//!
//! Every account key in the runtime is derived from an identity's canonical
//! string, so parsing and display must be deterministic: addresses are
//! lowercased on entry and agent identifiers only admit lowercase characters.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Grammar for opaque agent identifiers. Colon-free so an identifier can be
/// embedded in a channel key, lowercase so canonical comparison is plain
/// string equality.
static AGENT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^agent-[0-9a-z][0-9a-z_-]{2,63}$").expect("valid regex"));

/// A participant identity: a wallet address or an opaque agent identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    /// EVM wallet address, canonically lowercase `0x` + 40 hex digits
    Address(String),
    /// Platform-assigned agent identifier (`agent-...`)
    Agent(String),
}

impl Identity {
    /// Parse an identity from its string form
    ///
    /// Addresses are accepted in any case and canonicalized to lowercase;
    /// agent identifiers must already be lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the string matches neither
    /// variant's grammar.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(hex_part) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Ok(Self::Address(format!("0x{}", hex_part.to_ascii_lowercase())));
            }
            return Err(Error::InvalidIdentity(s.to_string()));
        }
        if AGENT_ID_REGEX.is_match(s) {
            return Ok(Self::Agent(s.to_string()));
        }
        Err(Error::InvalidIdentity(s.to_string()))
    }

    /// Canonical string form: lowercase, stable, collision-free across
    /// variants (addresses always start `0x`, agent identifiers `agent-`)
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Address(s) | Self::Agent(s) => s,
        }
    }

    /// Whether this identity is a wallet address
    #[must_use]
    pub const fn is_address(&self) -> bool {
        matches!(self, Self::Address(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}
