//! # Client Identity Generator
//!
//! Produces collision-checked client-local identifiers for staged items
//! before they have a server-assigned identity.
//!
//! An id is built from a monotonic time component (milliseconds since epoch,
//! hex) and a random component (32 bits drawn from a v4 UUID, hex):
//! `ci-18f2a3c41d7-9a4b21c3`. The generator checks each candidate against
//! the currently staged ids and regenerates on collision, up to a bounded
//! number of attempts. Repeated collision is negligible in probability but
//! handled, not assumed away.
//!
//! A candidate with an empty or zero component is a defect, never a usable
//! id: construction fails loudly instead of handing back something that
//! looks valid and breaks downstream correlation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::constants::{CLIENT_ID_PREFIX, MAX_ID_ATTEMPTS};
use crate::error::{CoordinatorError, Result};

/// Locally unique identifier for a staged item. Never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Compose an id from its raw components.
    ///
    /// Zero components are rejected: a zero time or random part is the
    /// sentinel-marker defect and must not produce a usable-looking id.
    pub fn compose(millis: u64, random: u32) -> Result<Self> {
        if millis == 0 {
            return Err(CoordinatorError::IdGeneration(
                "time component is zero".to_string(),
            ));
        }
        if random == 0 {
            return Err(CoordinatorError::IdGeneration(
                "random component is zero".to_string(),
            ));
        }
        Ok(Self(format!("{CLIENT_ID_PREFIX}-{millis:x}-{random:08x}")))
    }

    /// The id as a string slice.
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
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('-');
        let (prefix, millis, random) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(p), Some(m), Some(r), None) => (p, m, r),
            _ => {
                return Err(CoordinatorError::IdGeneration(format!(
                    "malformed client id: {s}"
                )))
            }
        };
        if prefix != CLIENT_ID_PREFIX || random.len() != 8 {
            return Err(CoordinatorError::IdGeneration(format!(
                "malformed client id: {s}"
            )));
        }
        let millis = u64::from_str_radix(millis, 16)
            .map_err(|_| CoordinatorError::IdGeneration(format!("malformed client id: {s}")))?;
        let random = u32::from_str_radix(random, 16)
            .map_err(|_| CoordinatorError::IdGeneration(format!("malformed client id: {s}")))?;
        Self::compose(millis, random)
    }
}

/// Generator for [`ClientId`]s with bounded collision regeneration.
#[derive(Debug, Clone)]
pub struct ClientIdGenerator {
    max_attempts: usize,
}

impl Default for ClientIdGenerator {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ID_ATTEMPTS,
        }
    }
}

impl ClientIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator with a custom attempt bound (tests).
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    /// Produce a fresh id that `is_taken` does not report as occupied.
    ///
    /// Candidates that collide are discarded and regenerated. Exhausting the
    /// attempt budget returns [`CoordinatorError::IdGeneration`]; at that
    /// point the randomness source itself is suspect.
    pub fn next_id(&self, is_taken: &dyn Fn(&ClientId) -> bool) -> Result<ClientId> {
        for attempt in 1..=self.max_attempts {
            let candidate = Self::candidate()?;
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
            debug!(attempt, candidate = %candidate, "client id collision, regenerating");
        }
        Err(CoordinatorError::IdGeneration(format!(
            "exhausted {} attempts without an unused id",
            self.max_attempts
        )))
    }

    fn candidate() -> Result<ClientId> {
        let now = chrono::Utc::now().timestamp_millis();
        let millis = u64::try_from(now).map_err(|_| {
            CoordinatorError::IdGeneration(format!("system clock out of range: {now}"))
        })?;
        let bytes = Uuid::new_v4().into_bytes();
        let random = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        ClientId::compose(millis, random)
    }
}
