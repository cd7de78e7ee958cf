//! Channel addressing and the canonical wire encoding
//!
//! Channels are the addressable conversation scopes of the platform: the
//! trading room attached to a coin, or a direct-message pair. The canonical
//! string forms `coin:{chainId}:{address}` and `dm:{low}:{high}` double as
//! pub/sub topic names and as room-key material, so encoding is strictly
//! deterministic: DM pairs are always stored sorted by canonical identity.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identity::Identity;
use crate::{Error, Result};

/// An addressable conversation scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatChannel {
    /// The public room attached to a token
    Coin {
        /// EVM chain id, always positive
        chain_id: u64,
        /// The token's contract address
        token_address: Identity,
    },
    /// A direct-message pair, stored sorted so the channel between X and Y
    /// is identical regardless of who initiated it
    Dm {
        /// Lexicographically smaller identity
        first: Identity,
        /// Lexicographically larger identity
        second: Identity,
    },
}

impl ChatChannel {
    /// Create a coin channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChannel`] if the chain id is zero or the token
    /// address is not a wallet address.
    pub fn coin(chain_id: u64, token_address: Identity) -> Result<Self> {
        if chain_id == 0 {
            return Err(Error::InvalidChannel("chain id must be positive".to_string()));
        }
        if !token_address.is_address() {
            return Err(Error::InvalidChannel(format!(
                "coin channel requires a wallet address, got {token_address}"
            )));
        }
        Ok(Self::Coin { chain_id, token_address })
    }

    /// Create a DM channel; the pair is sorted on construction
    #[must_use]
    pub fn dm(a: Identity, b: Identity) -> Self {
        if a.as_str() <= b.as_str() {
            Self::Dm { first: a, second: b }
        } else {
            Self::Dm { first: b, second: a }
        }
    }

    /// Parse a channel from its canonical wire form
    ///
    /// DM segments may arrive in either order; the decoded value is always
    /// the sorted pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChannel`] on an unknown discriminator prefix,
    /// wrong segment count, or malformed segment.
    pub fn parse(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split(':').collect();
        match segments.as_slice() {
            ["coin", chain, address] => {
                let chain_id: u64 = chain
                    .parse()
                    .map_err(|_| Error::InvalidChannel(format!("bad chain id in {s}")))?;
                let token_address = Identity::parse(address)
                    .map_err(|_| Error::InvalidChannel(format!("bad token address in {s}")))?;
                Self::coin(chain_id, token_address)
            }
            ["dm", a, b] => {
                let first = Identity::parse(a)
                    .map_err(|_| Error::InvalidChannel(format!("bad identity in {s}")))?;
                let second = Identity::parse(b)
                    .map_err(|_| Error::InvalidChannel(format!("bad identity in {s}")))?;
                Ok(Self::dm(first, second))
            }
            _ => Err(Error::InvalidChannel(s.to_string())),
        }
    }

    /// Whether the given identity may author messages in this channel.
    /// Coin rooms are open; DM channels admit only the pair.
    #[must_use]
    pub fn involves(&self, identity: &Identity) -> bool {
        match self {
            Self::Coin { .. } => true,
            Self::Dm { first, second } => first == identity || second == identity,
        }
    }

    /// Whether this is a DM channel
    #[must_use]
    pub const fn is_dm(&self) -> bool {
        matches!(self, Self::Dm { .. })
    }
}

impl fmt::Display for ChatChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coin { chain_id, token_address } => write!(f, "coin:{chain_id}:{token_address}"),
            Self::Dm { first, second } => write!(f, "dm:{first}:{second}"),
        }
    }
}

impl FromStr for ChatChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ChatChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChatChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}
