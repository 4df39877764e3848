//! Binary Decoder
//!
//! Turns wire-format payloads into readable JSON using descriptors from a
//! [`SchemaRegistry`]. Three ways in:
//!
//! - [`Decoder::decode`] / [`Decoder::decode_named`]: the type is known.
//! - [`Decoder::auto_match_decode`]: trial-decode against every message and
//!   keep the most plausible result.
//! - [`Decoder::try_auto_match`]: the same, memoized per endpoint in an
//!   [`AutoMatchCache`].
//!
//! Each call loads one descriptor-set snapshot and works on it lock-free.

pub mod interp;
pub mod score;
pub mod wire;

use std::sync::Arc;
use tracing::debug;

use crate::cache::{auto_cache_key, AutoMatchCache};
use crate::config::DecoderConfig;
use crate::descriptor::{DescriptorSet, MessageDescriptor};
use crate::error::{DecodeError, Result};
use crate::registry::SchemaRegistry;
use crate::schema::Direction;

pub use interp::{DecodeStats, DecodedMessage, UNKNOWN_KEY};

use interp::Interpreter;

/// A decode chosen by auto-match
#[derive(Debug, Clone, PartialEq)]
pub struct AutoMatch {
    pub type_name: String,
    pub decoded: DecodedMessage,
    pub score: i64,
    /// The type came from the cache rather than a full scan
    pub cached: bool,
}

/// How a URL-directed decode picked its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Mapping,
    Cache,
    Scan,
}

pub struct Decoder {
    registry: Arc<SchemaRegistry>,
    cache: AutoMatchCache,
    config: DecoderConfig,
}

impl Decoder {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(registry, DecoderConfig::default())
    }

    pub fn with_config(registry: Arc<SchemaRegistry>, config: DecoderConfig) -> Self {
        Self {
            registry,
            cache: AutoMatchCache::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &AutoMatchCache {
        &self.cache
    }

    /// Decode `bytes` as `descriptor`, resolving nested types in the
    /// currently published set
    pub fn decode(&self, descriptor: &MessageDescriptor, bytes: &[u8]) -> std::result::Result<DecodedMessage, DecodeError> {
        let set = self.registry.descriptors();
        Interpreter::new(&set, self.config.max_depth).decode(descriptor, bytes)
    }

    /// Look up a type by name and decode
    pub fn decode_named(&self, type_name: &str, bytes: &[u8]) -> Result<DecodedMessage> {
        let set = self.registry.descriptors();
        let descriptor = set
            .message(type_name)
            .ok_or_else(|| crate::error::Error::not_found("message type", type_name))?;
        Ok(Interpreter::new(&set, self.config.max_depth).decode(descriptor, bytes)?)
    }

    /// Full scan; `None` when nothing scores above the empty-message floor
    pub fn auto_match_decode(&self, bytes: &[u8]) -> Option<AutoMatch> {
        let set = self.registry.descriptors();
        self.scan(&set, bytes)
    }

    fn scan(&self, set: &DescriptorSet, bytes: &[u8]) -> Option<AutoMatch> {
        score::best_match(set, bytes, self.config.max_depth, self.config.unknown_ratio).map(
            |(decoded, score)| AutoMatch {
                type_name: decoded.type_name.clone(),
                decoded,
                score,
                cached: false,
            },
        )
    }

    /// Auto-match memoized by `direction:url-path`.
    ///
    /// A cached type is decoded directly. Only if it has disappeared or fails
    /// to decode does this fall back to a full scan, whose result is cached.
    pub fn try_auto_match(&self, bytes: &[u8], url: &str, direction: Direction) -> Option<AutoMatch> {
        let key = auto_cache_key(url, direction);
        let set = self.registry.descriptors();
        let generation = set.generation();

        if let Some(type_name) = self.cache.get(&key, generation) {
            let interpreter = Interpreter::new(&set, self.config.max_depth);
            match set.message(&type_name).map(|d| (d, interpreter.decode(d, bytes))) {
                Some((descriptor, Ok(decoded))) => {
                    debug!(key = %key, type_name = %type_name, "auto-match cache hit");
                    let score = score::plausibility(descriptor, &decoded.stats, self.config.unknown_ratio)
                        .unwrap_or_default();
                    return Some(AutoMatch {
                        type_name,
                        decoded,
                        score,
                        cached: true,
                    });
                }
                Some((_, Err(err))) => {
                    debug!(key = %key, type_name = %type_name, error = %err, "cached type failed to decode");
                    self.cache.remove(&key);
                }
                None => {
                    debug!(key = %key, type_name = %type_name, "cached type no longer exists");
                    self.cache.remove(&key);
                }
            }
        } else {
            debug!(key = %key, "auto-match cache miss");
        }

        let found = self.scan(&set, bytes)?;
        self.cache.insert(key, found.type_name.clone(), generation);
        Some(found)
    }

    /// Decode traffic for a URL: an explicit mapping wins, auto-match is the
    /// fallback when enabled. `Ok(None)` means nothing matched.
    pub fn decode_for_url(
        &self,
        bytes: &[u8],
        url: &str,
        direction: Direction,
    ) -> Result<Option<(DecodedMessage, MatchSource)>> {
        if let Some(type_name) = self.registry.find_message_for_url(url, direction) {
            let decoded = self.decode_named(&type_name, bytes)?;
            return Ok(Some((decoded, MatchSource::Mapping)));
        }
        if !self.config.auto_match {
            return Ok(None);
        }
        Ok(self.try_auto_match(bytes, url, direction).map(|found| {
            let source = if found.cached {
                MatchSource::Cache
            } else {
                MatchSource::Scan
            };
            (found.decoded, source)
        }))
    }

    pub fn clear_auto_cache(&self) {
        self.cache.clear();
    }
}
