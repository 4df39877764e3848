//! Name Resolution & Validation
//!
//! Turns parsed files into descriptors. Runs over every file of a compile at
//! once, since a field may reference a type declared in any other file.
//!
//! Order of work:
//! 1. register every type name (messages, enums, synthesized map entries)
//! 2. validate enums and sibling value scoping
//! 3. build message descriptors, resolving field types by scope walk

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::descriptor::{
    Cardinality, EnumDescriptor, EnumValue, FieldDescriptor, FieldKind, MessageDescriptor,
    ScalarType,
};
use crate::error::CompileError;

use super::parser::{EnumAst, FieldAst, FileAst, Label, MessageAst, Syntax, TypeRef};
use super::rewrite::Rewrite;
use super::{MAX_FIELD_NUMBER, RESERVED_IMPLEMENTATION_RANGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKind {
    Message,
    Enum,
}

/// Resolved descriptor maps, keyed by fully qualified name
pub(crate) struct Resolved {
    pub messages: BTreeMap<String, Arc<MessageDescriptor>>,
    pub enums: BTreeMap<String, Arc<EnumDescriptor>>,
}

pub(crate) fn resolve(files: &[FileAst], rewrite: &Rewrite) -> Result<Resolved, CompileError> {
    let mut resolver = Resolver::default();
    for file in files {
        let scope = file.package.clone().unwrap_or_default();
        for message in &file.messages {
            resolver.register_message(&file.name, &scope, message)?;
        }
        for enumeration in &file.enums {
            resolver.register(&file.name, &join(&scope, &enumeration.name), TypeKind::Enum)?;
        }
    }

    let mut enums = BTreeMap::new();
    let mut scoped_values: HashMap<String, HashMap<String, String>> = HashMap::new();
    for file in files {
        let scope = file.package.clone().unwrap_or_default();
        resolver.collect_enums(file, &scope, &file.enums, &file.messages, rewrite, &mut scoped_values, &mut enums)?;
    }

    let mut messages = BTreeMap::new();
    for file in files {
        let scope = file.package.clone().unwrap_or_default();
        for message in &file.messages {
            resolver.build_message(file, &scope, message, &mut messages)?;
        }
    }

    Ok(Resolved { messages, enums })
}

#[derive(Default)]
struct Resolver {
    types: HashMap<String, TypeKind>,
}

impl Resolver {
    fn register(&mut self, file: &str, full_name: &str, kind: TypeKind) -> Result<(), CompileError> {
        if self.types.insert(full_name.to_string(), kind).is_some() {
            return Err(CompileError::DuplicateType {
                file: file.to_string(),
                name: full_name.to_string(),
            });
        }
        Ok(())
    }

    fn register_message(&mut self, file: &str, scope: &str, message: &MessageAst) -> Result<(), CompileError> {
        let full_name = join(scope, &message.name);
        self.register(file, &full_name, TypeKind::Message)?;
        for nested in &message.messages {
            self.register_message(file, &full_name, nested)?;
        }
        for enumeration in &message.enums {
            self.register(file, &join(&full_name, &enumeration.name), TypeKind::Enum)?;
        }
        for field in &message.fields {
            if matches!(field.type_ref, TypeRef::Map { .. }) {
                self.register(file, &join(&full_name, &map_entry_name(&field.name)), TypeKind::Message)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Enums
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn collect_enums(
        &self,
        file: &FileAst,
        scope: &str,
        enum_asts: &[EnumAst],
        message_asts: &[MessageAst],
        rewrite: &Rewrite,
        scoped_values: &mut HashMap<String, HashMap<String, String>>,
        out: &mut BTreeMap<String, Arc<EnumDescriptor>>,
    ) -> Result<(), CompileError> {
        for enum_ast in enum_asts {
            let full_name = join(scope, &enum_ast.name);
            let siblings = scoped_values.entry(scope.to_string()).or_default();
            let mut seen = HashSet::new();
            let mut values = Vec::with_capacity(enum_ast.values.len());

            for value in &enum_ast.values {
                if !seen.insert(value.name.as_str()) {
                    return Err(CompileError::DuplicateEnumValue {
                        file: file.name.clone(),
                        enum_name: full_name.clone(),
                        value: value.name.clone(),
                    });
                }
                if siblings.get(&value.name).map_or(false, |owner| *owner != full_name) {
                    return Err(CompileError::EnumValueConflict {
                        file: file.name.clone(),
                        scope: scope.to_string(),
                        enum_name: full_name.clone(),
                        value: value.name.clone(),
                    });
                }
                siblings.insert(value.name.clone(), full_name.clone());
                let number = i32::try_from(value.number).map_err(|_| CompileError::InvalidEnumNumber {
                    file: file.name.clone(),
                    enum_name: full_name.clone(),
                    value: value.name.clone(),
                    number: value.number,
                })?;
                let original_name = rewrite
                    .original_name(&full_name, &value.name)
                    .unwrap_or(&value.name)
                    .to_string();
                values.push(EnumValue {
                    name: value.name.clone(),
                    original_name,
                    number,
                });
            }

            out.insert(
                full_name.clone(),
                Arc::new(EnumDescriptor {
                    full_name,
                    name: enum_ast.name.clone(),
                    file: file.name.clone(),
                    values,
                }),
            );
        }

        for message in message_asts {
            let nested_scope = join(scope, &message.name);
            self.collect_enums(file, &nested_scope, &message.enums, &message.messages, rewrite, scoped_values, out)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    fn build_message(
        &self,
        file: &FileAst,
        scope: &str,
        message: &MessageAst,
        out: &mut BTreeMap<String, Arc<MessageDescriptor>>,
    ) -> Result<(), CompileError> {
        let full_name = join(scope, &message.name);
        let mut fields = Vec::with_capacity(message.fields.len());
        let mut numbers = HashSet::new();
        let mut names = HashSet::new();

        for field in &message.fields {
            self.check_field_number(file, &full_name, message, field)?;
            if !numbers.insert(field.number) {
                return Err(CompileError::DuplicateFieldNumber {
                    file: file.name.clone(),
                    message: full_name.clone(),
                    number: field.number as u32,
                });
            }
            if !names.insert(field.name.as_str()) {
                return Err(CompileError::DuplicateFieldName {
                    file: file.name.clone(),
                    message: full_name.clone(),
                    field: field.name.clone(),
                });
            }

            let descriptor = match &field.type_ref {
                TypeRef::Map { key, value } => {
                    let entry = self.build_map_entry(file, &full_name, field, key, value)?;
                    let entry_name = entry.full_name.clone();
                    out.insert(entry_name.clone(), Arc::new(entry));
                    FieldDescriptor {
                        name: field.name.clone(),
                        number: field.number as u32,
                        kind: FieldKind::Message(entry_name),
                        cardinality: Cardinality::Repeated,
                        packed: false,
                        oneof: None,
                    }
                }
                type_ref => {
                    let kind = self.resolve_type(file, &full_name, &field.name, type_ref)?;
                    let cardinality = match field.label {
                        Some(Label::Repeated) => Cardinality::Repeated,
                        Some(Label::Required) => Cardinality::Required,
                        Some(Label::Optional) | None => Cardinality::Optional,
                    };
                    let packable = match &kind {
                        FieldKind::Scalar(scalar) => scalar.is_packable(),
                        FieldKind::Enum(_) => true,
                        FieldKind::Message(_) => false,
                    };
                    let packed = cardinality == Cardinality::Repeated
                        && packable
                        && field.packed.unwrap_or(file.syntax == Syntax::Proto3);
                    FieldDescriptor {
                        name: field.name.clone(),
                        number: field.number as u32,
                        kind,
                        cardinality,
                        packed,
                        oneof: field.oneof.clone(),
                    }
                }
            };
            fields.push(descriptor);
        }

        for nested in &message.messages {
            self.build_message(file, &full_name, nested, out)?;
        }

        out.insert(
            full_name.clone(),
            Arc::new(MessageDescriptor {
                full_name,
                name: message.name.clone(),
                file: file.name.clone(),
                fields,
                map_entry: false,
            }),
        );
        Ok(())
    }

    fn check_field_number(
        &self,
        file: &FileAst,
        message_name: &str,
        message: &MessageAst,
        field: &FieldAst,
    ) -> Result<(), CompileError> {
        let in_range = (1..=i64::from(MAX_FIELD_NUMBER)).contains(&field.number);
        if !in_range || RESERVED_IMPLEMENTATION_RANGE.contains(&field.number) {
            return Err(CompileError::InvalidFieldNumber {
                file: file.name.clone(),
                message: message_name.to_string(),
                field: field.name.clone(),
                number: field.number,
            });
        }
        let reserved_number = message
            .reserved_numbers
            .iter()
            .any(|range| range.contains(&field.number));
        if reserved_number || message.reserved_names.contains(&field.name) {
            return Err(CompileError::ReservedField {
                file: file.name.clone(),
                message: message_name.to_string(),
                field: field.name.clone(),
            });
        }
        Ok(())
    }

    fn build_map_entry(
        &self,
        file: &FileAst,
        message_name: &str,
        field: &FieldAst,
        key: &str,
        value: &TypeRef,
    ) -> Result<MessageDescriptor, CompileError> {
        let key_scalar = ScalarType::from_keyword(key)
            .filter(ScalarType::is_valid_map_key)
            .ok_or_else(|| CompileError::InvalidMapKey {
                file: file.name.clone(),
                message: message_name.to_string(),
                field: field.name.clone(),
                key_type: key.to_string(),
            })?;
        let value_kind = self.resolve_type(file, message_name, &field.name, value)?;
        let entry_name = map_entry_name(&field.name);

        Ok(MessageDescriptor {
            full_name: join(message_name, &entry_name),
            name: entry_name,
            file: file.name.clone(),
            fields: vec![
                FieldDescriptor {
                    name: "key".to_string(),
                    number: 1,
                    kind: FieldKind::Scalar(key_scalar),
                    cardinality: Cardinality::Optional,
                    packed: false,
                    oneof: None,
                },
                FieldDescriptor {
                    name: "value".to_string(),
                    number: 2,
                    kind: value_kind,
                    cardinality: Cardinality::Optional,
                    packed: false,
                    oneof: None,
                },
            ],
            map_entry: true,
        })
    }

    /// Resolve a type reference from inside `scope` (a message full name).
    ///
    /// Relative names are tried in the innermost scope first, then each
    /// enclosing scope out to the root, like protoc.
    fn resolve_type(
        &self,
        file: &FileAst,
        scope: &str,
        field_name: &str,
        type_ref: &TypeRef,
    ) -> Result<FieldKind, CompileError> {
        let name = match type_ref {
            TypeRef::Scalar(scalar) => return Ok(FieldKind::Scalar(*scalar)),
            TypeRef::Named(name) => name,
            TypeRef::Map { .. } => unreachable!("map types are expanded before resolution"),
        };

        let found = if let Some(absolute) = name.strip_prefix('.') {
            self.types.get(absolute).map(|kind| (absolute.to_string(), *kind))
        } else {
            let mut prefix = Some(scope);
            let mut hit = None;
            while let Some(current) = prefix {
                let candidate = join(current, name);
                if let Some(kind) = self.types.get(&candidate) {
                    hit = Some((candidate, *kind));
                    break;
                }
                prefix = if current.is_empty() {
                    None
                } else {
                    Some(current.rfind('.').map_or("", |idx| &current[..idx]))
                };
            }
            hit
        };

        match found {
            Some((full_name, TypeKind::Message)) => Ok(FieldKind::Message(full_name)),
            Some((full_name, TypeKind::Enum)) => Ok(FieldKind::Enum(full_name)),
            None => Err(CompileError::UnresolvedType {
                file: file.name.clone(),
                message: scope.to_string(),
                field: field_name.to_string(),
                type_name: name.clone(),
            }),
        }
    }
}

/// `user_tags` -> `UserTagsEntry`
fn map_entry_name(field_name: &str) -> String {
    let mut name = String::with_capacity(field_name.len() + 5);
    let mut upper_next = true;
    for c in field_name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            name.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            name.push(c);
        }
    }
    name.push_str("Entry");
    name
}

fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}
