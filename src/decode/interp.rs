//! Descriptor-driven decode interpreter
//!
//! Walks raw wire fields and looks each one up in the message descriptor.
//! Nothing here is generated per type: the same routine handles any
//! descriptor the compiler produced.
//!
//! Best effort by construction. A field number the descriptor does not know,
//! or a known field carrying the wrong wire type, lands in `_unknown` and is
//! counted; only broken framing at the top level is an error.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::fmt;

use crate::descriptor::{DescriptorSet, FieldDescriptor, FieldKind, MessageDescriptor, ScalarType, WireType};
use crate::error::DecodeError;

use super::wire::{self, RawField, RawValue, WireReader};

/// Key under which unmatched fields are reported
pub const UNKNOWN_KEY: &str = "_unknown";

/// Counters gathered while decoding, consumed by auto-match scoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeStats {
    /// Field occurrences decoded cleanly, nested messages included
    pub decoded_fields: usize,
    /// Known field numbers whose payload did not fit the declared type
    pub conflicts: usize,
    /// Field numbers the descriptor does not declare
    pub unknown_fields: usize,
    /// Bytes spent on unknown or conflicting fields
    pub unknown_bytes: usize,
    /// Distinct declared top-level fields that were present
    pub distinct_fields: usize,
    /// Payload length
    pub total_bytes: usize,
}

impl DecodeStats {
    fn absorb(&mut self, nested: &DecodeStats) {
        self.decoded_fields += nested.decoded_fields;
        self.conflicts += nested.conflicts;
        self.unknown_fields += nested.unknown_fields;
        self.unknown_bytes += nested.unknown_bytes;
    }
}

/// Human-readable decode result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedMessage {
    pub type_name: String,
    pub value: Value,
    pub stats: DecodeStats,
}

impl DecodedMessage {
    /// Pretty JSON rendering
    pub fn to_text(&self) -> String {
        format!("{:#}", self.value)
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.value)
    }
}

enum Outcome {
    One(Value),
    Packed(Vec<Value>),
    Conflict,
}

pub(crate) struct Interpreter<'s> {
    set: &'s DescriptorSet,
    max_depth: usize,
}

impl<'s> Interpreter<'s> {
    pub(crate) fn new(set: &'s DescriptorSet, max_depth: usize) -> Self {
        Self { set, max_depth }
    }

    pub(crate) fn decode(
        &self,
        descriptor: &MessageDescriptor,
        bytes: &[u8],
    ) -> Result<DecodedMessage, DecodeError> {
        let fields = wire::read_all(bytes)?;
        self.decode_fields(descriptor, &fields, bytes.len())
    }

    /// Decode already-framed top-level fields; lets auto-match frame once
    pub(crate) fn decode_fields(
        &self,
        descriptor: &MessageDescriptor,
        fields: &[RawField<'_>],
        total_bytes: usize,
    ) -> Result<DecodedMessage, DecodeError> {
        let mut stats = DecodeStats {
            total_bytes,
            ..Default::default()
        };
        let mut present = HashSet::new();
        let value = self.message(descriptor, fields, 0, &mut stats, Some(&mut present))?;
        stats.distinct_fields = present.len();
        Ok(DecodedMessage {
            type_name: descriptor.full_name.clone(),
            value,
            stats,
        })
    }

    fn message(
        &self,
        descriptor: &MessageDescriptor,
        fields: &[RawField<'_>],
        depth: usize,
        stats: &mut DecodeStats,
        mut present: Option<&mut HashSet<u32>>,
    ) -> Result<Value, DecodeError> {
        if depth > self.max_depth {
            return Err(DecodeError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        let mut out = Map::new();
        let mut unknown = Vec::new();

        for raw in fields {
            let Some(field) = descriptor.field_by_number(raw.number) else {
                stats.unknown_fields += 1;
                stats.unknown_bytes += raw.encoded_len;
                unknown.push(render_unknown(raw, None));
                continue;
            };

            match self.field_value(field, &raw.value, depth, stats)? {
                Outcome::One(value) => {
                    stats.decoded_fields += 1;
                    place(&mut out, field, self.is_map_field(field), value);
                }
                Outcome::Packed(values) => {
                    stats.decoded_fields += 1;
                    for value in values {
                        place(&mut out, field, false, value);
                    }
                }
                Outcome::Conflict => {
                    stats.conflicts += 1;
                    stats.unknown_bytes += raw.encoded_len;
                    unknown.push(render_unknown(raw, Some(&field.name)));
                    continue;
                }
            }
            if let Some(present) = present.as_deref_mut() {
                present.insert(field.number);
            }
        }

        if !unknown.is_empty() {
            out.insert(UNKNOWN_KEY.to_string(), Value::Array(unknown));
        }
        Ok(Value::Object(out))
    }

    fn is_map_field(&self, field: &FieldDescriptor) -> bool {
        match &field.kind {
            FieldKind::Message(name) => self.set.message(name).map_or(false, |m| m.map_entry),
            _ => false,
        }
    }

    fn field_value(
        &self,
        field: &FieldDescriptor,
        raw: &RawValue<'_>,
        depth: usize,
        stats: &mut DecodeStats,
    ) -> Result<Outcome, DecodeError> {
        let expected = field.wire_type();

        if let (FieldKind::Message(type_name), RawValue::Bytes(bytes)) = (&field.kind, raw) {
            let Some(nested) = self.set.message(type_name) else {
                return Ok(Outcome::Conflict);
            };
            let Ok(fields) = wire::read_all(bytes) else {
                return Ok(Outcome::Conflict);
            };
            let mut nested_stats = DecodeStats::default();
            let value = self.message(nested, &fields, depth + 1, &mut nested_stats, None)?;
            stats.absorb(&nested_stats);
            return Ok(Outcome::One(value));
        }

        if raw.wire_type() == expected {
            return Ok(self.scalar(field, raw).map_or(Outcome::Conflict, Outcome::One));
        }

        // packed repeated scalars arrive length-delimited
        if let RawValue::Bytes(bytes) = raw {
            if field.is_repeated() && expected != WireType::LengthDelimited {
                return Ok(self
                    .packed(field, expected, bytes)
                    .map_or(Outcome::Conflict, Outcome::Packed));
            }
        }

        Ok(Outcome::Conflict)
    }

    fn packed(&self, field: &FieldDescriptor, expected: WireType, bytes: &[u8]) -> Option<Vec<Value>> {
        match expected {
            WireType::Varint => {
                let mut reader = WireReader::new(bytes);
                let mut values = Vec::new();
                while !reader.is_empty() {
                    let raw = RawValue::Varint(reader.read_varint().ok()?);
                    values.push(self.scalar(field, &raw)?);
                }
                Some(values)
            }
            WireType::Fixed32 => self.packed_fixed(field, expected, 4, bytes),
            WireType::Fixed64 => self.packed_fixed(field, expected, 8, bytes),
            _ => None,
        }
    }

    /// Fixed-width packed elements; the buffer must divide evenly
    fn packed_fixed(
        &self,
        field: &FieldDescriptor,
        expected: WireType,
        width: usize,
        bytes: &[u8],
    ) -> Option<Vec<Value>> {
        if bytes.len() % width != 0 {
            return None;
        }
        bytes
            .chunks_exact(width)
            .map(|chunk| {
                let raw = if expected == WireType::Fixed32 {
                    RawValue::Fixed32(u32::from_le_bytes(chunk.try_into().ok()?))
                } else {
                    RawValue::Fixed64(u64::from_le_bytes(chunk.try_into().ok()?))
                };
                self.scalar(field, &raw)
            })
            .collect()
    }

    /// Render one non-message value; `None` when it does not fit the type
    fn scalar(&self, field: &FieldDescriptor, raw: &RawValue<'_>) -> Option<Value> {
        let scalar = match &field.kind {
            FieldKind::Scalar(scalar) => *scalar,
            FieldKind::Enum(enum_name) => {
                let RawValue::Varint(n) = raw else {
                    return None;
                };
                let number = *n as i64 as i32;
                let symbol = self
                    .set
                    .enum_type(enum_name)
                    .and_then(|e| e.value_by_number(number))
                    .map(|v| Value::String(v.original_name.clone()));
                return Some(symbol.unwrap_or_else(|| Value::from(number)));
            }
            FieldKind::Message(_) => return None,
        };

        let value = match (scalar, raw) {
            (ScalarType::Int32, RawValue::Varint(n)) => Value::from(*n as i64 as i32),
            (ScalarType::Int64, RawValue::Varint(n)) => Value::from(*n as i64),
            (ScalarType::Uint32, RawValue::Varint(n)) => Value::from(*n as u32),
            (ScalarType::Uint64, RawValue::Varint(n)) => Value::from(*n),
            (ScalarType::Sint32, RawValue::Varint(n)) => Value::from(wire::zigzag32(*n)),
            (ScalarType::Sint64, RawValue::Varint(n)) => Value::from(wire::zigzag64(*n)),
            (ScalarType::Bool, RawValue::Varint(n)) => {
                if *n > 1 {
                    return None;
                }
                Value::Bool(*n == 1)
            }
            (ScalarType::Fixed32, RawValue::Fixed32(n)) => Value::from(*n),
            (ScalarType::Sfixed32, RawValue::Fixed32(n)) => Value::from(*n as i32),
            (ScalarType::Float, RawValue::Fixed32(n)) => float_value(f64::from(f32::from_bits(*n))),
            (ScalarType::Fixed64, RawValue::Fixed64(n)) => Value::from(*n),
            (ScalarType::Sfixed64, RawValue::Fixed64(n)) => Value::from(*n as i64),
            (ScalarType::Double, RawValue::Fixed64(n)) => float_value(f64::from_bits(*n)),
            (ScalarType::String, RawValue::Bytes(bytes)) => {
                Value::String(std::str::from_utf8(bytes).ok()?.to_string())
            }
            (ScalarType::Bytes, RawValue::Bytes(bytes)) => Value::String(hex::encode(bytes)),
            _ => return None,
        };
        Some(value)
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

/// Put a decoded value under its field name, honouring repeated and map fields
fn place(out: &mut Map<String, Value>, field: &FieldDescriptor, map_entry: bool, value: Value) {
    if map_entry {
        let (key, entry_value) = match value {
            Value::Object(mut entry) => (
                entry.remove("key").map(map_key).unwrap_or_default(),
                entry.remove("value").unwrap_or(Value::Null),
            ),
            _ => (String::new(), Value::Null),
        };
        let slot = out
            .entry(field.name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = slot {
            map.insert(key, entry_value);
        }
        return;
    }

    if field.is_repeated() {
        let slot = out
            .entry(field.name.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = slot {
            items.push(value);
        }
    } else {
        // last occurrence wins for singular fields
        out.insert(field.name.clone(), value);
    }
}

fn map_key(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn render_unknown(raw: &RawField<'_>, declared: Option<&str>) -> Value {
    let (wire_type, value) = match &raw.value {
        RawValue::Varint(n) => ("varint", Value::from(*n)),
        RawValue::Fixed64(n) => ("fixed64", Value::from(*n)),
        RawValue::Fixed32(n) => ("fixed32", Value::from(*n)),
        RawValue::Bytes(bytes) => ("bytes", printable_or_hex(bytes)),
        RawValue::Group(bytes) => ("group", Value::String(hex::encode(bytes))),
    };
    let mut entry = Map::new();
    entry.insert("field".to_string(), Value::from(raw.number));
    if let Some(name) = declared {
        entry.insert("declared".to_string(), Value::String(name.to_string()));
    }
    entry.insert("wireType".to_string(), Value::String(wire_type.to_string()));
    entry.insert("value".to_string(), value);
    Value::Object(entry)
}

fn printable_or_hex(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c.is_whitespace()) => {
            Value::String(text.to_string())
        }
        _ => Value::String(hex::encode(bytes)),
    }
}
