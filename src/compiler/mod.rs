//! Schema Compiler
//!
//! Compiles a set of named definition texts into a [`DescriptorSet`].
//!
//! ```text
//! sources ──► rewrite (enum scoping leniency) ──► parse ──► resolve/validate ──► DescriptorSet
//! ```
//!
//! The rewrite is the only lenient step. Everything the validator rejects is
//! surfaced as a [`CompileError`].

pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod rewrite;

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use tracing::debug;

use crate::checksum::Fingerprint;
use crate::descriptor::DescriptorSet;
use crate::error::CompileError;

pub use rewrite::{acronym, rewrite_enum_collisions, Rewrite};

/// Largest field number the wire format can carry
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Field numbers set aside for the protobuf implementation
pub const RESERVED_IMPLEMENTATION_RANGE: RangeInclusive<i64> = 19_000..=19_999;

/// Compile every source together.
///
/// `sources` maps a filename to its text. Files are processed in filename
/// order so results (including which enum value keeps its name) are stable.
pub fn compile(sources: &BTreeMap<String, String>) -> Result<DescriptorSet, CompileError> {
    let rewrite = rewrite_enum_collisions(sources);
    if rewrite.rename_count() > 0 {
        debug!(renamed = rewrite.rename_count(), "tolerant rewrite applied");
    }

    let files = rewrite
        .sources
        .iter()
        .map(|(name, text)| parser::parse_file(name, text))
        .collect::<Result<Vec<_>, _>>()?;

    let resolved = resolve::resolve(&files, &rewrite)?;
    let set = DescriptorSet::new(
        resolved.messages,
        resolved.enums,
        Fingerprint::of_sources(sources),
    );
    debug!(
        files = files.len(),
        messages = set.message_count(),
        fingerprint = %set.fingerprint().short(),
        "compiled sources"
    );
    Ok(set)
}

/// Convenience wrapper for a single source text
pub fn compile_one(name: &str, text: &str) -> Result<DescriptorSet, CompileError> {
    compile(&BTreeMap::from([(name.to_string(), text.to_string())]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Cardinality, FieldKind, ScalarType};

    #[test]
    fn test_compile_message_names_sorted() {
        let set = compile_one(
            "a.proto",
            "syntax = \"proto3\"; package p; message Zeta { int32 a = 1; } message Alpha { Zeta z = 1; }",
        )
        .unwrap();
        assert_eq!(set.message_names(), vec!["p.Alpha", "p.Zeta"]);
        let alpha = set.message("p.Alpha").unwrap();
        assert_eq!(alpha.fields[0].kind, FieldKind::Message("p.Zeta".into()));
    }

    #[test]
    fn test_nested_resolution_prefers_inner_scope() {
        let set = compile_one(
            "a.proto",
            r#"
            message Item { string outer = 1; }
            message Box {
                message Item { int32 inner = 1; }
                Item item = 1;
                .Item top = 2;
            }
            "#,
        )
        .unwrap();
        let boxed = set.message("Box").unwrap();
        assert_eq!(boxed.fields[0].kind, FieldKind::Message("Box.Item".into()));
        assert_eq!(boxed.fields[1].kind, FieldKind::Message("Item".into()));
    }

    #[test]
    fn test_map_field_synthesizes_entry() {
        let set = compile_one("a.proto", "message M { map<string, int32> counts = 1; }").unwrap();
        let entry = set.message("M.CountsEntry").unwrap();
        assert!(entry.map_entry);
        assert_eq!(entry.fields[0].kind, FieldKind::Scalar(ScalarType::String));
        let field = &set.message("M").unwrap().fields[0];
        assert_eq!(field.cardinality, Cardinality::Repeated);
    }

    #[test]
    fn test_proto3_repeated_scalars_packed_by_default() {
        let set = compile_one(
            "a.proto",
            "syntax = \"proto3\"; message M { repeated int32 a = 1; repeated int32 b = 2 [packed = false]; repeated string c = 3; }",
        )
        .unwrap();
        let m = set.message("M").unwrap();
        assert!(m.fields[0].packed);
        assert!(!m.fields[1].packed);
        assert!(!m.fields[2].packed);
    }

    #[test]
    fn test_duplicate_field_number_rejected() {
        let err = compile_one("a.proto", "message M { int32 a = 1; int32 b = 1; }").unwrap_err();
        assert!(matches!(err, CompileError::DuplicateFieldNumber { number: 1, .. }));
    }

    #[test]
    fn test_duplicate_field_name_rejected() {
        let err = compile_one("a.proto", "message M { int32 a = 1; string a = 2; }").unwrap_err();
        assert!(matches!(err, CompileError::DuplicateFieldName { .. }));
    }

    #[test]
    fn test_unresolved_type_rejected() {
        let err = compile_one("a.proto", "message M { Missing m = 1; }").unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedType { ref type_name, .. } if type_name == "Missing"));
    }

    #[test]
    fn test_invalid_and_reserved_numbers_rejected() {
        assert!(matches!(
            compile_one("a.proto", "message M { int32 a = 0; }").unwrap_err(),
            CompileError::InvalidFieldNumber { .. }
        ));
        assert!(matches!(
            compile_one("a.proto", "message M { int32 a = 19500; }").unwrap_err(),
            CompileError::InvalidFieldNumber { .. }
        ));
        assert!(matches!(
            compile_one("a.proto", "message M { reserved 2 to 4; int32 a = 3; }").unwrap_err(),
            CompileError::ReservedField { .. }
        ));
    }

    #[test]
    fn test_duplicate_type_across_files_rejected() {
        let sources = BTreeMap::from([
            ("a.proto".to_string(), "package p; message M {}".to_string()),
            ("b.proto".to_string(), "package p; message M {}".to_string()),
        ]);
        assert!(matches!(compile(&sources).unwrap_err(), CompileError::DuplicateType { .. }));
    }

    #[test]
    fn test_cross_file_reference() {
        let sources = BTreeMap::from([
            ("a.proto".to_string(), "package p; import \"b.proto\"; message A { B b = 1; }".to_string()),
            ("b.proto".to_string(), "package p; message B { int32 x = 1; }".to_string()),
        ]);
        let set = compile(&sources).unwrap();
        assert_eq!(set.message("p.A").unwrap().fields[0].kind, FieldKind::Message("p.B".into()));
    }

    #[test]
    fn test_colliding_enum_values_compile_with_original_names() {
        let set = compile_one(
            "a.proto",
            "enum Status { UNKNOWN = 0; OK = 1; } enum Priority { UNKNOWN = 0; HIGH = 1; }",
        )
        .unwrap();
        let status = set.enum_type("Status").unwrap();
        assert_eq!(status.values[0].name, "UNKNOWN");
        let priority = set.enum_type("Priority").unwrap();
        assert_eq!(priority.values[0].name, "P_UNKNOWN");
        assert_eq!(priority.values[0].original_name, "UNKNOWN");
        assert_eq!(priority.values[1].name, "HIGH");
    }

    #[test]
    fn test_rewrite_does_not_mask_same_enum_duplicate() {
        let err = compile_one("a.proto", "enum E { A = 0; A = 1; }").unwrap_err();
        assert!(matches!(err, CompileError::DuplicateEnumValue { .. }));
    }

    #[test]
    fn test_invalid_map_key() {
        let err = compile_one("a.proto", "message M { map<double, string> m = 1; }").unwrap_err();
        assert!(matches!(err, CompileError::InvalidMapKey { .. }));
    }

    #[test]
    fn test_escaped_multibyte_option_compiles() {
        let set = compile_one("a.proto", "option x = \"\\é\"; message M { int32 a = 1; }").unwrap();
        assert!(set.message("M").is_some());
    }
}
