//! Tolerant Enum Rewrite
//!
//! Enum values follow C++ scoping: they live in the scope that *encloses* the
//! enum, so two sibling enums that both declare `UNKNOWN` collide even though
//! each enum is fine on its own. Real-world corpora do this constantly.
//!
//! This pass renames only those repeats, before parsing:
//! - scope = package + enclosing message path, shared by every file of a package
//! - files are visited in filename order, values in declaration order
//! - the first owner of a name keeps it; a later *different* enum gets
//!   `ACRONYM_NAME` (plus a numeric suffix if that is taken too)
//! - a repeat inside the *same* enum is left alone so the validator rejects it
//!
//! Nothing else in the text changes. If a file fails to tokenize it is passed
//! through untouched and the parser reports the error.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use tracing::debug;

use super::lexer::{tokenize, Token};

/// Result of the rewrite: new texts plus how to map renamed values back
#[derive(Debug, Clone, Default)]
pub struct Rewrite {
    /// filename -> rewritten text
    pub sources: BTreeMap<String, String>,
    /// (enum full name, rewritten value name) -> original value name
    pub renames: HashMap<(String, String), String>,
}

impl Rewrite {
    /// Original spelling of an enum value, if it was renamed
    pub fn original_name(&self, enum_full_name: &str, value: &str) -> Option<&str> {
        self.renames
            .get(&(enum_full_name.to_string(), value.to_string()))
            .map(String::as_str)
    }

    pub fn rename_count(&self) -> usize {
        self.renames.len()
    }
}

/// One enum value occurrence found by the scan
#[derive(Debug, Clone)]
struct ValueSite {
    file: String,
    scope: String,
    enum_full_name: String,
    enum_name: String,
    name: String,
    span: Range<usize>,
}

/// Rewrite colliding sibling enum values across all `sources`
pub fn rewrite_enum_collisions(sources: &BTreeMap<String, String>) -> Rewrite {
    let mut sites = Vec::new();
    for (file, text) in sources {
        if let Ok(tokens) = tokenize(text) {
            scan_file(file, &tokens, &mut sites);
        }
    }

    // Every name written anywhere in a scope, so generated names never
    // collide with a value declared later.
    let mut declared: HashMap<&str, HashSet<&str>> = HashMap::new();
    for site in &sites {
        declared
            .entry(site.scope.as_str())
            .or_default()
            .insert(site.name.as_str());
    }

    let mut owners: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut edits: BTreeMap<String, Vec<(Range<usize>, String)>> = BTreeMap::new();
    let mut renames = HashMap::new();

    for site in &sites {
        let scope_owners = owners.entry(site.scope.clone()).or_default();
        let existing = scope_owners.get(&site.name).cloned();
        match existing {
            None => {
                scope_owners.insert(site.name.clone(), site.enum_full_name.clone());
            }
            Some(owner) if owner == site.enum_full_name => {}
            Some(_) => {
                let prefix = acronym(&site.enum_name);
                let base = format!("{}_{}", prefix, site.name);
                let taken = |candidate: &str| {
                    scope_owners.contains_key(candidate)
                        || declared
                            .get(site.scope.as_str())
                            .map_or(false, |names| names.contains(candidate))
                };
                let mut candidate = base.clone();
                let mut suffix = 2;
                while taken(&candidate) {
                    candidate = format!("{}{}", base, suffix);
                    suffix += 1;
                }

                debug!(
                    file = %site.file,
                    scope = %site.scope,
                    enum_name = %site.enum_full_name,
                    from = %site.name,
                    to = %candidate,
                    "renaming colliding enum value"
                );
                scope_owners.insert(candidate.clone(), site.enum_full_name.clone());
                renames.insert(
                    (site.enum_full_name.clone(), candidate.clone()),
                    site.name.clone(),
                );
                edits
                    .entry(site.file.clone())
                    .or_default()
                    .push((site.span.clone(), candidate));
            }
        }
    }

    let mut rewritten = sources.clone();
    for (file, mut file_edits) in edits {
        if let Some(text) = rewritten.get_mut(&file) {
            file_edits.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));
            for (span, replacement) in file_edits {
                text.replace_range(span, &replacement);
            }
        }
    }

    Rewrite {
        sources: rewritten,
        renames,
    }
}

/// Short prefix derived from an enum type name.
///
/// `HTTP` -> `HTTP`, `StatusCode` -> `SC`, `Color2` -> `C2`, `color` -> `c`.
pub fn acronym(type_name: &str) -> String {
    let has_letter = type_name.chars().any(|c| c.is_ascii_alphabetic());
    if has_letter && !type_name.chars().any(|c| c.is_ascii_lowercase()) {
        return type_name.to_string();
    }
    let capitals: String = type_name
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();
    if type_name.chars().any(|c| c.is_ascii_uppercase()) {
        capitals
    } else {
        type_name.chars().take(1).collect()
    }
}

// =============================================================================
// Structural Scan
// =============================================================================

#[derive(Debug)]
enum Frame {
    Message(String),
    Enum { name: String, full_name: String },
    Oneof,
    Other,
}

fn scan_file(file: &str, tokens: &[Token], sites: &mut Vec<ValueSite>) {
    let package = find_package(tokens);
    let mut stack: Vec<Frame> = Vec::new();
    let mut at_statement_start = true;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];

        if token.is_symbol('}') {
            stack.pop();
            at_statement_start = true;
            i += 1;
            continue;
        }
        if token.is_symbol(';') {
            at_statement_start = true;
            i += 1;
            continue;
        }

        if at_statement_start {
            let next_ident = tokens.get(i + 1).and_then(Token::ident);
            let opens_block = tokens.get(i + 2).map_or(false, |t| t.is_symbol('{'));

            match (token.ident(), next_ident, opens_block) {
                (Some("message"), Some(name), true) => {
                    stack.push(Frame::Message(name.to_string()));
                    i += 3;
                    continue;
                }
                (Some("enum"), Some(name), true) => {
                    let scope = scope_of(&package, &stack);
                    let full_name = join(&scope, name);
                    stack.push(Frame::Enum {
                        name: name.to_string(),
                        full_name,
                    });
                    i += 3;
                    continue;
                }
                _ => {}
            }

            if let (Some(Frame::Enum { name, full_name }), Some(value)) =
                (stack.last(), token.ident())
            {
                if tokens.get(i + 1).map_or(false, |t| t.is_symbol('=')) {
                    sites.push(ValueSite {
                        file: file.to_string(),
                        scope: scope_of(&package, &stack[..stack.len() - 1]),
                        enum_full_name: full_name.clone(),
                        enum_name: name.clone(),
                        name: value.to_string(),
                        span: token.span.clone(),
                    });
                }
            }
        }

        if token.is_symbol('{') {
            let is_oneof = i >= 2 && tokens[i - 2].is_ident("oneof");
            stack.push(if is_oneof { Frame::Oneof } else { Frame::Other });
            at_statement_start = true;
            i += 1;
            continue;
        }

        at_statement_start = false;
        i += 1;
    }
}

fn find_package(tokens: &[Token]) -> String {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_symbol('{') {
            depth += 1;
        } else if token.is_symbol('}') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_ident("package") {
            let mut package = String::new();
            for t in &tokens[i + 1..] {
                if t.is_symbol(';') {
                    break;
                }
                match t.ident() {
                    Some(part) => package.push_str(part),
                    None if t.is_symbol('.') => package.push('.'),
                    None => break,
                }
            }
            return package;
        }
    }
    String::new()
}

/// Dotted scope for the current frame stack; only messages contribute
fn scope_of(package: &str, stack: &[Frame]) -> String {
    stack.iter().fold(package.to_string(), |scope, frame| match frame {
        Frame::Message(name) => join(&scope, name),
        _ => scope,
    })
}

fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("a.proto".to_string(), text.to_string())])
    }

    #[test]
    fn test_acronym_rules() {
        assert_eq!(acronym("StatusCode"), "SC");
        assert_eq!(acronym("HTTP"), "HTTP");
        assert_eq!(acronym("Color2"), "C2");
        assert_eq!(acronym("color"), "c");
        assert_eq!(acronym("V2Kind"), "V2K");
    }

    #[test]
    fn test_sibling_collision_renamed() {
        let text = "enum Color { UNKNOWN = 0; RED = 1; }\nenum Shape { UNKNOWN = 0; SQUARE = 1; }\n";
        let rewrite = rewrite_enum_collisions(&one(text));
        let out = &rewrite.sources["a.proto"];
        assert_eq!(
            out,
            "enum Color { UNKNOWN = 0; RED = 1; }\nenum Shape { S_UNKNOWN = 0; SQUARE = 1; }\n"
        );
        assert_eq!(rewrite.original_name("Shape", "S_UNKNOWN"), Some("UNKNOWN"));
    }

    #[test]
    fn test_nested_scopes_are_independent() {
        let text = "message A { enum X { NONE = 0; } }\nmessage B { enum Y { NONE = 0; } }";
        let rewrite = rewrite_enum_collisions(&one(text));
        assert_eq!(rewrite.rename_count(), 0);
        assert_eq!(rewrite.sources["a.proto"], text);
    }

    #[test]
    fn test_same_enum_duplicate_untouched() {
        let text = "enum E { A = 0; A = 1; }";
        let rewrite = rewrite_enum_collisions(&one(text));
        assert_eq!(rewrite.sources["a.proto"], text);
    }

    #[test]
    fn test_generated_name_avoids_declared_names() {
        let text = "enum Kind { NONE = 0; }\nenum Slot { NONE = 0; S_NONE = 1; }";
        let rewrite = rewrite_enum_collisions(&one(text));
        assert!(rewrite.sources["a.proto"].contains("S_NONE2 = 0"));
        assert!(rewrite.sources["a.proto"].contains("S_NONE = 1"));
    }

    #[test]
    fn test_package_scope_spans_files() {
        let sources = BTreeMap::from([
            ("a.proto".to_string(), "package p; enum A { UNSET = 0; }".to_string()),
            ("b.proto".to_string(), "package p; enum BType { UNSET = 0; }".to_string()),
        ]);
        let rewrite = rewrite_enum_collisions(&sources);
        assert_eq!(rewrite.sources["a.proto"], sources["a.proto"]);
        assert!(rewrite.sources["b.proto"].contains("BT_UNSET = 0"));
        assert_eq!(rewrite.original_name("p.BType", "BT_UNSET"), Some("UNSET"));
    }

    #[test]
    fn test_value_options_do_not_confuse_scan() {
        let text = "enum A { X = 0 [deprecated = true]; option allow_alias = true; }\nenum B { X = 0; }";
        let rewrite = rewrite_enum_collisions(&one(text));
        assert_eq!(rewrite.rename_count(), 1);
        assert!(rewrite.sources["a.proto"].contains("B_X = 0;"));
    }
}
