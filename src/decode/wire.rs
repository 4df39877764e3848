//! Wire-format primitives
//!
//! A cursor over raw bytes that reads keys, varints, fixed-width values and
//! length-delimited slices. Knows nothing about descriptors.

use crate::descriptor::WireType;
use crate::error::DecodeError;

/// One framed field as it appears on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Bytes(&'a [u8]),
    /// Contents of a group, between its start and end keys
    Group(&'a [u8]),
}

impl RawValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            RawValue::Varint(_) => WireType::Varint,
            RawValue::Fixed64(_) => WireType::Fixed64,
            RawValue::Fixed32(_) => WireType::Fixed32,
            RawValue::Bytes(_) => WireType::LengthDelimited,
            RawValue::Group(_) => WireType::StartGroup,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawField<'a> {
    pub number: u32,
    pub value: RawValue<'a>,
    /// Bytes the whole field occupied, key included
    pub encoded_len: usize,
}

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(self.malformed("truncated varint"));
            };
            self.pos += 1;
            if shift == 63 && byte > 1 {
                return Err(self.malformed("varint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.malformed("varint longer than 10 bytes"))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| self.malformed(format!("need {} bytes, {} left", len, self.buf.len() - self.pos)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_key(&mut self) -> Result<(u32, WireType), DecodeError> {
        let key = self.read_varint()?;
        let wire_type = WireType::from_bits(key & 7)
            .ok_or_else(|| self.malformed(format!("invalid wire type {}", key & 7)))?;
        let number = u32::try_from(key >> 3)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| self.malformed(format!("invalid field number {}", key >> 3)))?;
        Ok((number, wire_type))
    }

    /// Read the next complete field
    pub fn read_field(&mut self) -> Result<RawField<'a>, DecodeError> {
        let start = self.pos;
        let (number, wire_type) = self.read_key()?;
        let value = match wire_type {
            WireType::StartGroup => RawValue::Group(self.read_group_body(number)?),
            WireType::EndGroup => return Err(self.malformed(format!("unexpected end of group {}", number))),
            other => self.read_value(other)?,
        };
        Ok(RawField {
            number,
            value,
            encoded_len: self.pos - start,
        })
    }

    fn read_value(&mut self, wire_type: WireType) -> Result<RawValue<'a>, DecodeError> {
        Ok(match wire_type {
            WireType::Varint => RawValue::Varint(self.read_varint()?),
            WireType::Fixed64 => {
                let bytes = self.take(8)?;
                RawValue::Fixed64(u64::from_le_bytes(bytes.try_into().map_err(|_| self.malformed("fixed64"))?))
            }
            WireType::Fixed32 => {
                let bytes = self.take(4)?;
                RawValue::Fixed32(u32::from_le_bytes(bytes.try_into().map_err(|_| self.malformed("fixed32"))?))
            }
            WireType::LengthDelimited => {
                let len = self.read_varint()?;
                let len = usize::try_from(len).map_err(|_| self.malformed("length overflows usize"))?;
                RawValue::Bytes(self.take(len)?)
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(self.malformed("group key where a value was expected"))
            }
        })
    }

    /// Consume fields up to the matching end-group key
    ///
    /// Nested groups are tracked on an explicit stack, so arbitrarily deep
    /// nesting costs heap rather than call frames.
    fn read_group_body(&mut self, number: u32) -> Result<&'a [u8], DecodeError> {
        let body_start = self.pos;
        let mut open = vec![number];
        loop {
            if self.is_empty() {
                return Err(self.malformed(format!("unterminated group {}", open.last().copied().unwrap_or(number))));
            }
            let before = self.pos;
            let (inner, wire_type) = self.read_key()?;
            match wire_type {
                WireType::StartGroup => open.push(inner),
                WireType::EndGroup => {
                    let expected = open.pop().unwrap_or(number);
                    if inner != expected {
                        return Err(self.malformed(format!("group {} closed by {}", expected, inner)));
                    }
                    if open.is_empty() {
                        return Ok(&self.buf[body_start..before]);
                    }
                }
                other => {
                    self.read_value(other)?;
                }
            }
        }
    }
}

/// Split a buffer into fields, failing on the first framing error
pub fn read_all(buf: &[u8]) -> Result<Vec<RawField<'_>>, DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut fields = Vec::new();
    while !reader.is_empty() {
        fields.push(reader.read_field()?);
    }
    Ok(fields)
}

/// ZigZag decoding for `sint32`/`sint64`
pub fn zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

pub fn zigzag32(n: u64) -> i32 {
    let n = n as u32;
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}
