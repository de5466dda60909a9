//! Domain types shared by the session and memory layers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// A conversational identity that owns one vector collection.
///
/// The collection shares the session id as its name. Ids are UUID v7, so
/// their string order is creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Memories
// ─────────────────────────────────────────────────────────────────────────────

/// Memory kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    #[default]
    Basic,
    Interact,
    Plan,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Interact => "interact",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "interact" => Ok(Self::Interact),
            "plan" => Ok(Self::Plan),
            other => Err(Error::validation(format!("unknown memory kind: {other}"))),
        }
    }
}

/// A stored memory as returned to callers.
///
/// The id is both the vector point id and the document key. The embedding is
/// never part of this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub session_id: String,
    pub content: String,
    #[serde(default)]
    pub kind: MemoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Input for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    #[serde(default)]
    pub kind: MemoryKind,
}

impl NewMemory {
    pub fn new(content: impl Into<String>, kind: MemoryKind) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }
}

impl From<String> for NewMemory {
    fn from(content: String) -> Self {
        Self::new(content, MemoryKind::Basic)
    }
}

impl From<&str> for NewMemory {
    fn from(content: &str) -> Self {
        Self::new(content, MemoryKind::Basic)
    }
}

/// Where memory content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTopology {
    /// Content is written to the document store; the point payload only
    /// carries the document key.
    #[default]
    DualWrite,
    /// Content is carried in the point payload; no memory records are written.
    Payload,
}

/// Point payload, decoded once at the index boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "doc", default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    #[serde(default)]
    pub kind: MemoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl MemoryPayload {
    /// Build the payload for a memory under the given topology.
    pub fn for_memory(memory: &Memory, topology: ContentTopology) -> Self {
        let (content, document_key) = match topology {
            ContentTopology::Payload => (Some(memory.content.clone()), None),
            ContentTopology::DualWrite => (None, Some(memory.id.clone())),
        };
        Self {
            content,
            document_key,
            kind: memory.kind,
            importance: memory.importance,
            created_at: memory.created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a session id, point id or cursor. All of them are UUIDs.
pub fn parse_id(kind: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::validation(format!("malformed {kind}: {raw:?}")))
}
