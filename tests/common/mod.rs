//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use protolens::{SchemaRegistry, SchemaSource};

pub fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Load a fixture as a source whose name is the file name
pub fn fixture_source(file: &str) -> SchemaSource {
    let content = std::fs::read_to_string(fixtures_path().join(file)).unwrap();
    SchemaSource::with_id(format!("fx-{}", file), file, content)
}

/// Shop fixtures, imported files first
pub const SHOP_FILES: [&str; 3] = ["shop_status.proto", "shop_orders.proto", "shop_refunds.proto"];

/// Add every shop fixture, requiring each compile to succeed
pub fn load_shop(registry: &SchemaRegistry) {
    for file in SHOP_FILES {
        registry
            .add_source(fixture_source(file))
            .unwrap_or_else(|e| panic!("{} failed to compile: {}", file, e));
    }
}

/// Minimal protobuf writer for building test payloads by hand
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

fn varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(&mut self, field: u32, wire_type: u8) {
        varint(u64::from(field) << 3 | u64::from(wire_type), &mut self.buf);
    }

    pub fn uint(mut self, field: u32, value: u64) -> Self {
        self.key(field, 0);
        varint(value, &mut self.buf);
        self
    }

    pub fn int(self, field: u32, value: i64) -> Self {
        self.uint(field, value as u64)
    }

    pub fn bytes(mut self, field: u32, value: &[u8]) -> Self {
        self.key(field, 2);
        varint(value.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    pub fn message(self, field: u32, nested: Encoder) -> Self {
        let inner = nested.finish();
        self.bytes(field, &inner)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
