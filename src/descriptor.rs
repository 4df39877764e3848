//! Compiled message and enum descriptors
//!
//! A [`DescriptorSet`] is produced by the compiler and never mutated after
//! it is published by the registry. Everything the decoder needs to interpret
//! wire bytes lives here.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::checksum::Fingerprint;

// =============================================================================
// Wire & Scalar Types
// =============================================================================

/// Protobuf wire type, the low three bits of a field key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    pub fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            3 => Some(Self::StartGroup),
            4 => Some(Self::EndGroup),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }

    pub fn bits(&self) -> u64 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::StartGroup => 3,
            Self::EndGroup => 4,
            Self::Fixed32 => 5,
        }
    }
}

/// Built-in scalar field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    /// Map a keyword from definition text to a scalar type
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "double" => Some(Self::Double),
            "float" => Some(Self::Float),
            "int32" => Some(Self::Int32),
            "int64" => Some(Self::Int64),
            "uint32" => Some(Self::Uint32),
            "uint64" => Some(Self::Uint64),
            "sint32" => Some(Self::Sint32),
            "sint64" => Some(Self::Sint64),
            "fixed32" => Some(Self::Fixed32),
            "fixed64" => Some(Self::Fixed64),
            "sfixed32" => Some(Self::Sfixed32),
            "sfixed64" => Some(Self::Sfixed64),
            "bool" => Some(Self::Bool),
            "string" => Some(Self::String),
            "bytes" => Some(Self::Bytes),
            _ => None,
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Double | Self::Fixed64 | Self::Sfixed64 => WireType::Fixed64,
            Self::Float | Self::Fixed32 | Self::Sfixed32 => WireType::Fixed32,
            Self::String | Self::Bytes => WireType::LengthDelimited,
            Self::Int32
            | Self::Int64
            | Self::Uint32
            | Self::Uint64
            | Self::Sint32
            | Self::Sint64
            | Self::Bool => WireType::Varint,
        }
    }

    /// Scalars that may appear in a packed repeated encoding
    pub fn is_packable(&self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }

    /// Scalars allowed as map keys
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(self, Self::Double | Self::Float | Self::Bytes)
    }
}

// =============================================================================
// Fields
// =============================================================================

/// What a field holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Fully qualified message name
    Message(String),
    /// Fully qualified enum name
    Enum(String),
}

impl FieldKind {
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Scalar(scalar) => scalar.wire_type(),
            FieldKind::Message(_) => WireType::LengthDelimited,
            FieldKind::Enum(_) => WireType::Varint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cardinality {
    /// Singular field (proto3 implicit presence or explicit `optional`)
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub kind: FieldKind,
    pub cardinality: Cardinality,
    /// Packed encoding is expected on write; the decoder accepts both forms
    pub packed: bool,
    /// Name of the enclosing oneof, if any
    pub oneof: Option<String>,
}

impl FieldDescriptor {
    /// Wire type of a single, unpacked element of this field
    pub fn wire_type(&self) -> WireType {
        self.kind.wire_type()
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }
}

// =============================================================================
// Messages & Enums
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageDescriptor {
    /// Fully qualified name, e.g. `api.v1.UserResponse`
    pub full_name: String,
    /// Unqualified name
    pub name: String,
    /// Source file that declared this message
    pub file: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
    /// Synthesized entry type of a `map<K, V>` field
    pub map_entry: bool,
}

impl MessageDescriptor {
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A message with no declared fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    /// Name after the tolerant rewrite
    pub name: String,
    /// Name as written by the user
    pub original_name: String,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumDescriptor {
    pub full_name: String,
    pub name: String,
    pub file: String,
    pub values: Vec<EnumValue>,
}

impl EnumDescriptor {
    /// First value declared with `number` (aliases share numbers)
    pub fn value_by_number(&self, number: i32) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.number == number)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values
            .iter()
            .find(|v| v.name == name || v.original_name == name)
    }
}

// =============================================================================
// Descriptor Set
// =============================================================================

/// The full output of one compile
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    messages: BTreeMap<String, Arc<MessageDescriptor>>,
    enums: BTreeMap<String, Arc<EnumDescriptor>>,
    fingerprint: Fingerprint,
    generation: u64,
}

impl Default for DescriptorSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl DescriptorSet {
    pub fn empty() -> Self {
        Self {
            messages: BTreeMap::new(),
            enums: BTreeMap::new(),
            fingerprint: Fingerprint::empty(),
            generation: 0,
        }
    }

    pub(crate) fn new(
        messages: BTreeMap<String, Arc<MessageDescriptor>>,
        enums: BTreeMap<String, Arc<EnumDescriptor>>,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            messages,
            enums,
            fingerprint,
            generation: 0,
        }
    }

    /// Stamp the registry's publication counter onto this set
    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Look up a message by fully qualified name; a leading `.` is accepted
    pub fn message(&self, full_name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(full_name.trim_start_matches('.'))
    }

    pub fn enum_type(&self, full_name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.enums.get(full_name.trim_start_matches('.'))
    }

    /// All message names, sorted. Includes nested messages and map entries.
    pub fn message_names(&self) -> Vec<String> {
        self.messages.keys().cloned().collect()
    }

    /// Messages in sorted name order
    pub fn messages(&self) -> impl Iterator<Item = &Arc<MessageDescriptor>> {
        self.messages.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &Arc<EnumDescriptor>> {
        self.enums.values()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.enums.is_empty()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Publication counter assigned by the registry; 0 for unpublished sets
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
