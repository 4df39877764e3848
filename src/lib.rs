//! protolens
//!
//! A runtime schema registry and binary decoder for captured protobuf traffic.
//! Definition text is compiled while the process runs; payloads are decoded
//! against a named type, a URL mapping, or whatever type auto-match finds
//! most plausible.
//!
//! ## Architecture
//!
//! ```text
//! SchemaSource ──► compiler ──► DescriptorSet ──(ArcSwap)──► SchemaRegistry
//!                                                               │
//!        (bytes, url, direction) ──► Decoder ◄──────────────────┘
//!                                      │  ▲
//!                                      ▼  │
//!                                 AutoMatchCache
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use protolens::{Decoder, SchemaRegistry, SchemaSource};
//!
//! let registry = Arc::new(SchemaRegistry::new());
//! registry
//!     .add_source(SchemaSource::new("user.proto", "message User { int32 id = 1; }"))
//!     .unwrap();
//!
//! let decoder = Decoder::new(registry);
//! let found = decoder.auto_match_decode(&[0x08, 0x07]).unwrap();
//! assert_eq!(found.type_name, "User");
//! assert_eq!(found.decoded.value["id"], 7);
//! ```

pub mod cache;
pub mod checksum;
pub mod compiler;
pub mod config;
pub mod decode;
pub mod descriptor;
pub mod error;
pub mod pattern;
pub mod registry;
pub mod schema;
pub mod store;

pub use cache::{auto_cache_key, AutoMatchCache};
pub use checksum::Fingerprint;
pub use compiler::compile;
pub use config::{DecoderConfig, ProtolensConfig};
pub use decode::{AutoMatch, DecodedMessage, Decoder, MatchSource};
pub use descriptor::{DescriptorSet, EnumDescriptor, FieldDescriptor, MessageDescriptor};
pub use error::{CompileError, DecodeError, Error, Result};
pub use registry::{RestoreReport, SchemaRegistry};
pub use schema::{Direction, SchemaSource, TypeMapping};
pub use store::{RegistrySnapshot, SnapshotStore};
