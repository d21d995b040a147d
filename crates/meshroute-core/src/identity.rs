//! Agent identity.
//!
//! Every agent in the mesh is named by 16 random bytes. The same type names
//! a route's origin and the neighbor it is forwarded through, since peers are
//! agents too.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of an agent identity in bytes.
pub const AGENT_ID_LEN: usize = 16;

/// Opaque identity of a mesh agent. Displayed as 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AgentId([u8; AGENT_ID_LEN]);

impl AgentId {
    /// Generate a fresh random identity.
    pub fn random() -> Self {
        let mut bytes = [0u8; AGENT_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; AGENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; AGENT_ID_LEN] {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self.short())
    }
}

impl FromStr for AgentId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| IdentityError::NotHex(s.to_string()))?;
        let bytes: [u8; AGENT_ID_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| IdentityError::BadLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for AgentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("agent id is not valid hex: {0:?}")]
    NotHex(String),
    #[error("agent id must be {AGENT_ID_LEN} bytes, got {0}")]
    BadLength(usize),
}
