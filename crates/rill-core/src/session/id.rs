//! Session identifier taxonomy.
//!
//! A session id has exactly two disjoint shapes: a locally generated
//! *placeholder* used before the backend has confirmed a durable session,
//! and a *real* identifier issued by the backend. The two shapes never
//! compare equal, and any wire string classifies as exactly one of them
//! (or is rejected).

use crate::error::{RillError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Wire prefix marking a locally generated, non-durable session id.
pub const PLACEHOLDER_PREFIX: &str = "pending-";

/// A session identifier: locally generated placeholder or backend-confirmed id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SessionId {
    /// Locally generated, monotonic, not durable. Exists only until the
    /// backend confirms a real id for the conversation.
    Placeholder(u64),
    /// Canonical identifier issued by the backend.
    Real(Uuid),
}

impl SessionId {
    /// Returns true if this id is a local placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// Returns true if this id was issued by the backend.
    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }

    /// Returns the backend identifier, if this id is real.
    pub fn as_real(&self) -> Option<&Uuid> {
        match self {
            Self::Real(uuid) => Some(uuid),
            Self::Placeholder(_) => None,
        }
    }

    /// Classifies a wire string as exactly one id shape.
    ///
    /// # Errors
    ///
    /// Returns `RillError::Validation` if the string is neither a
    /// `pending-<n>` placeholder nor a canonical hex-and-dash identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(rest) = raw.strip_prefix(PLACEHOLDER_PREFIX) {
            let sequence = rest.parse::<u64>().map_err(|_| {
                RillError::validation(format!("invalid placeholder session id: '{raw}'"))
            })?;
            return Ok(Self::Placeholder(sequence));
        }

        // Canonical form only: 8-4-4-4-12 hex groups. Uuid::parse_str also
        // accepts braced/simple forms, so check the shape first.
        if raw.len() == 36 {
            if let Ok(uuid) = Uuid::parse_str(raw) {
                return Ok(Self::Real(uuid));
            }
        }

        Err(RillError::validation(format!(
            "unrecognized session id: '{raw}'"
        )))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder(sequence) => write!(f, "{PLACEHOLDER_PREFIX}{sequence}"),
            Self::Real(uuid) => write!(f, "{uuid}"),
        }
    }
}

impl FromStr for SessionId {
    type Err = RillError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SessionId {
    type Error = RillError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

/// Hands out monotonically increasing placeholder ids.
///
/// One allocator lives inside the registry so placeholder sequences are
/// unique for the lifetime of the process.
#[derive(Debug, Default)]
pub struct PlaceholderAllocator {
    next: AtomicU64,
}

impl PlaceholderAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next placeholder id. Never reuses a sequence number.
    pub fn allocate(&self) -> SessionId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        SessionId::Placeholder(sequence)
    }
}
