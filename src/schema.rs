//! Schema sources and URL type mappings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Traffic direction a mapping or lookup applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outbound request bodies
    Request,
    /// Inbound response bodies
    Response,
    /// Either direction (only meaningful on mappings)
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
            Direction::Both => "both",
        }
    }

    /// Whether a mapping declared with `self` applies to a lookup for `requested`
    pub fn applies_to(&self, requested: Direction) -> bool {
        *self == Direction::Both || *self == requested
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request" | "req" => Ok(Direction::Request),
            "response" | "resp" => Ok(Direction::Response),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// One user-provided definition unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSource {
    /// Stable identifier
    pub id: String,
    /// Display name, also used as the compiler filename
    pub name: String,
    /// Raw definition text
    pub content: String,
    /// When this source was loaded
    pub loaded_at: DateTime<Utc>,
}

impl SchemaSource {
    /// Create a new source with a generated id
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let loaded_at = Utc::now();
        Self {
            id: generate_id("src", &name, &loaded_at),
            name,
            content: content.into(),
            loaded_at,
        }
    }

    /// Create a source with a caller-chosen id
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            loaded_at: Utc::now(),
        }
    }
}

/// Association of a URL glob with a message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMapping {
    /// Stable identifier
    pub id: String,
    /// Glob over the full URL; `*` matches any run of characters
    pub url_pattern: String,
    /// Fully qualified message type name
    pub message_type: String,
    /// Which traffic direction this mapping covers
    pub direction: Direction,
    /// Free-text note
    #[serde(default)]
    pub description: String,
}

impl TypeMapping {
    /// Create a new mapping with a generated id
    pub fn new(
        url_pattern: impl Into<String>,
        message_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        let url_pattern = url_pattern.into();
        let id = generate_id("map", &url_pattern, &Utc::now());
        Self {
            id,
            url_pattern,
            message_type: message_type.into(),
            direction,
            description: String::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_id(prefix: &str, seed: &str, at: &DateTime<Utc>) -> String {
    let nanos = at.timestamp_nanos_opt().unwrap_or_default();
    let sequence = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let digest = Sha256::new()
        .chain_update(seed.as_bytes())
        .chain_update(nanos.to_le_bytes())
        .chain_update(std::process::id().to_le_bytes())
        .chain_update(sequence.to_le_bytes())
        .finalize();
    format!("{}-{}", prefix, &hex::encode(digest)[..16])
}
