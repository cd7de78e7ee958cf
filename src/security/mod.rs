//! Operator command verification
//!
//! Privileged commands arrive as signed envelopes. The signature is Ed25519
//! over the SHA-256 digest of the content, base64 encoded, checked against
//! the operator public key configured at startup. The runtime only verifies
//! and parses; applying a command is the embedding application's job.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

/// A signed operator command as received off the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminEnvelope {
    /// JSON-encoded [`AdminCommand`]
    pub content: String,
    /// base64(Ed25519 over SHA-256(content))
    pub signature: String,
}

/// The closed set of operator commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdminCommand {
    /// Rename the agent persona
    SetCharacter {
        /// New display name
        name: String,
    },
    /// Store a knowledge fragment
    SetKnowledge {
        /// Fragment text
        text: String,
        /// Where the fragment came from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Remove a knowledge fragment
    DeleteKnowledge {
        /// Fragment id
        id: Uuid,
    },
    /// Point knowledge ingestion at a document
    SetSource {
        /// Document URL
        url: String,
    },
}

/// Verifies operator envelopes against one configured public key
#[derive(Debug, Clone)]
pub struct AdminGuard {
    key: VerifyingKey,
}

impl AdminGuard {
    /// Build a guard from a hex-encoded Ed25519 public key
    ///
    /// # Errors
    ///
    /// Returns an error if the hex or the key is malformed.
    pub fn from_hex(public_key: &str) -> Result<Self> {
        let bytes = hex::decode(public_key)
            .map_err(|e| Error::Security(format!("invalid operator key hex: {e}")))?;
        let key = VerifyingKey::try_from(bytes.as_slice())
            .map_err(|e| Error::Security(format!("invalid operator key: {e}")))?;
        Ok(Self { key })
    }

    /// Check the envelope's signature and parse its command
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not verify or the content is
    /// not a known command.
    pub fn verify(&self, envelope: &AdminEnvelope) -> Result<AdminCommand> {
        let digest = Sha256::digest(envelope.content.as_bytes());

        let sig_bytes = base64_decode(&envelope.signature)?;
        let signature = Signature::try_from(sig_bytes.as_slice())
            .map_err(|e| Error::Security(format!("invalid signature format: {e}")))?;

        self.key
            .verify(&digest, &signature)
            .map_err(|_| Error::Security("signature verification failed".to_string()))?;

        serde_json::from_str(&envelope.content)
            .map_err(|e| Error::Security(format!("unrecognized admin command: {e}")))
    }
}

fn base64_decode(data: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::Security(format!("invalid base64: {e}")))
}
