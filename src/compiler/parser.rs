//! Recursive-descent parser for the supported definition subset
//!
//! Produces a per-file syntax tree. Names are left unresolved; the resolver
//! turns trees into descriptors.

use std::ops::RangeInclusive;

use crate::descriptor::ScalarType;
use crate::error::CompileError;

use super::lexer::{tokenize, Token, TokenKind};

// =============================================================================
// Syntax Tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

#[derive(Debug, Clone)]
pub struct FileAst {
    pub name: String,
    pub syntax: Syntax,
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub messages: Vec<MessageAst>,
    pub enums: Vec<EnumAst>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageAst {
    pub name: String,
    pub fields: Vec<FieldAst>,
    pub messages: Vec<MessageAst>,
    pub enums: Vec<EnumAst>,
    pub reserved_numbers: Vec<RangeInclusive<i64>>,
    pub reserved_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Scalar(ScalarType),
    /// Possibly dotted, possibly absolute (`.pkg.Type`) name
    Named(String),
    Map { key: String, value: Box<TypeRef> },
}

#[derive(Debug, Clone)]
pub struct FieldAst {
    pub name: String,
    pub number: i64,
    pub label: Option<Label>,
    pub type_ref: TypeRef,
    pub packed: Option<bool>,
    pub oneof: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumAst {
    pub name: String,
    pub values: Vec<EnumValueAst>,
}

#[derive(Debug, Clone)]
pub struct EnumValueAst {
    pub name: String,
    pub number: i64,
}

// =============================================================================
// Parser
// =============================================================================

/// Parse one file's text
pub fn parse_file(name: &str, text: &str) -> Result<FileAst, CompileError> {
    let tokens = tokenize(text).map_err(|e| CompileError::Syntax {
        file: name.to_string(),
        line: e.line,
        column: e.column,
        message: e.message,
    })?;
    Parser::new(name, &tokens).file()
}

/// Deepest message nesting accepted in one file
pub const MAX_MESSAGE_NESTING: usize = 64;

struct Parser<'a> {
    file: &'a str,
    tokens: &'a [Token],
    pos: usize,
    nesting: usize,
}

type PResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    fn new(file: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            file,
            tokens,
            pos: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let (line, column) = match self.peek().or_else(|| self.tokens.last()) {
            Some(t) => (t.line, t.column),
            None => (1, 1),
        };
        CompileError::Syntax {
            file: self.file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    fn at_symbol(&self, c: char) -> bool {
        self.peek().map_or(false, |t| t.is_symbol(c))
    }

    fn at_ident(&self, word: &str) -> bool {
        self.peek().map_or(false, |t| t.is_ident(word))
    }

    fn eat_symbol(&mut self, c: char) -> bool {
        if self.at_symbol(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, c: char) -> PResult<()> {
        if self.eat_symbol(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {}", c, self.describe())))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek().and_then(Token::ident) {
            Some(word) => {
                self.pos += 1;
                Ok(word.to_string())
            }
            None => Err(self.error(format!("expected identifier, found {}", self.describe()))),
        }
    }

    fn expect_string(&mut self) -> PResult<String> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Str(s)) => {
                self.pos += 1;
                Ok(s.clone())
            }
            _ => Err(self.error(format!("expected string literal, found {}", self.describe()))),
        }
    }

    fn expect_int(&mut self) -> PResult<i64> {
        let negative = self.eat_symbol('-');
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.pos += 1;
                let value = i64::try_from(n).map_err(|_| self.error("integer out of range"))?;
                Ok(if negative { -value } else { value })
            }
            _ => Err(self.error(format!("expected integer, found {}", self.describe()))),
        }
    }

    fn describe(&self) -> String {
        match self.peek().map(|t| &t.kind) {
            None => "end of input".to_string(),
            Some(TokenKind::Ident(s)) => format!("'{}'", s),
            Some(TokenKind::Int(n)) => format!("'{}'", n),
            Some(TokenKind::Float(f)) => format!("'{}'", f),
            Some(TokenKind::Str(s)) => format!("\"{}\"", s),
            Some(TokenKind::Symbol(c)) => format!("'{}'", c),
        }
    }

    /// Dotted identifier, optionally absolute
    fn full_ident(&mut self) -> PResult<String> {
        let mut name = String::new();
        if self.eat_symbol('.') {
            name.push('.');
        }
        name.push_str(&self.expect_ident()?);
        while self.at_symbol('.') {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    // -------------------------------------------------------------------------
    // File level
    // -------------------------------------------------------------------------

    fn file(mut self) -> PResult<FileAst> {
        let mut file = FileAst {
            name: self.file.to_string(),
            syntax: Syntax::Proto2,
            package: None,
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
        };

        if self.at_ident("syntax") {
            self.pos += 1;
            self.expect_symbol('=')?;
            file.syntax = match self.expect_string()?.as_str() {
                "proto2" => Syntax::Proto2,
                "proto3" => Syntax::Proto3,
                other => return Err(self.error(format!("unsupported syntax \"{}\"", other))),
            };
            self.expect_symbol(';')?;
        }

        while let Some(token) = self.peek() {
            match token.ident() {
                Some("package") => {
                    if file.package.is_some() {
                        return Err(self.error("multiple package declarations"));
                    }
                    self.pos += 1;
                    let package = self.full_ident()?;
                    if package.starts_with('.') {
                        return Err(self.error("package name cannot start with '.'"));
                    }
                    file.package = Some(package);
                    self.expect_symbol(';')?;
                }
                Some("import") => {
                    self.pos += 1;
                    if self.at_ident("public") || self.at_ident("weak") {
                        self.pos += 1;
                    }
                    file.imports.push(self.expect_string()?);
                    self.expect_symbol(';')?;
                }
                Some("option") => self.option_statement()?,
                Some("message") => file.messages.push(self.message()?),
                Some("enum") => file.enums.push(self.enumeration()?),
                Some("service") | Some("extend") => {
                    self.pos += 1;
                    self.full_ident()?;
                    self.skip_block()?;
                }
                _ if token.is_symbol(';') => self.pos += 1,
                _ => return Err(self.error(format!("unexpected {} at top level", self.describe()))),
            }
        }

        Ok(file)
    }

    /// `option name = constant;` discarded
    fn option_statement(&mut self) -> PResult<()> {
        self.pos += 1;
        self.option_name()?;
        self.expect_symbol('=')?;
        self.constant()?;
        self.expect_symbol(';')
    }

    fn option_name(&mut self) -> PResult<String> {
        let mut name = String::new();
        loop {
            if self.eat_symbol('(') {
                name.push('(');
                name.push_str(&self.full_ident()?);
                self.expect_symbol(')')?;
                name.push(')');
            } else {
                name.push_str(&self.expect_ident()?);
            }
            if !self.eat_symbol('.') {
                return Ok(name);
            }
            name.push('.');
        }
    }

    /// Scalar constant, identifier or aggregate `{ ... }`; returns the
    /// identifier/literal text for options the compiler cares about
    fn constant(&mut self) -> PResult<String> {
        if self.at_symbol('{') {
            self.skip_block()?;
            return Ok(String::new());
        }
        self.eat_symbol('-');
        self.eat_symbol('+');
        match self.advance().map(|t| &t.kind) {
            Some(TokenKind::Ident(s)) => {
                let mut value = s.clone();
                while self.eat_symbol('.') {
                    value.push('.');
                    value.push_str(&self.expect_ident()?);
                }
                Ok(value)
            }
            Some(TokenKind::Int(n)) => Ok(n.to_string()),
            Some(TokenKind::Float(f)) => Ok(f.to_string()),
            Some(TokenKind::Str(s)) => {
                let mut value = s.clone();
                // adjacent string literals concatenate
                while let Some(TokenKind::Str(more)) = self.peek().map(|t| &t.kind) {
                    value.push_str(more);
                    self.pos += 1;
                }
                Ok(value)
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected constant, found {}", self.describe())))
            }
        }
    }

    /// Skip a balanced `{ ... }` block
    fn skip_block(&mut self) -> PResult<()> {
        self.expect_symbol('{')?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance() {
                Some(t) if t.is_symbol('{') => depth += 1,
                Some(t) if t.is_symbol('}') => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unterminated block")),
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    fn message(&mut self) -> PResult<MessageAst> {
        if self.nesting >= MAX_MESSAGE_NESTING {
            return Err(self.error(format!("messages nested deeper than {}", MAX_MESSAGE_NESTING)));
        }
        self.nesting += 1;
        let message = self.message_body();
        self.nesting -= 1;
        message
    }

    fn message_body(&mut self) -> PResult<MessageAst> {
        self.pos += 1;
        let mut message = MessageAst {
            name: self.expect_ident()?,
            ..Default::default()
        };
        self.expect_symbol('{')?;

        loop {
            let Some(token) = self.peek() else {
                return Err(self.error(format!("unterminated message {}", message.name)));
            };
            if token.is_symbol('}') {
                self.pos += 1;
                return Ok(message);
            }
            if token.is_symbol(';') {
                self.pos += 1;
                continue;
            }

            let next_is_name = self.peek_at(1).and_then(Token::ident).is_some();
            match token.ident() {
                Some("message") if next_is_name => message.messages.push(self.message()?),
                Some("enum") if next_is_name => message.enums.push(self.enumeration()?),
                Some("oneof") if next_is_name => self.oneof(&mut message)?,
                Some("option") if !self.peek_at(1).map_or(false, |t| t.is_symbol('=')) => {
                    self.option_statement()?
                }
                Some("reserved") if !self.peek_at(1).map_or(false, |t| t.is_symbol('=')) => {
                    self.reserved(&mut message.reserved_numbers, &mut message.reserved_names)?
                }
                Some("extensions") if !self.peek_at(1).map_or(false, |t| t.is_symbol('=')) => {
                    // extension ranges carry no shape; skip to ';'
                    let mut ignored_names = Vec::new();
                    let mut ignored_ranges = Vec::new();
                    self.reserved(&mut ignored_ranges, &mut ignored_names)?;
                }
                Some("extend") if next_is_name => {
                    self.pos += 1;
                    self.full_ident()?;
                    self.skip_block()?;
                }
                _ => {
                    let field = self.field(None)?;
                    message.fields.push(field);
                }
            }
        }
    }

    fn oneof(&mut self, message: &mut MessageAst) -> PResult<()> {
        self.pos += 1;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        loop {
            if self.eat_symbol('}') {
                return Ok(());
            }
            if self.eat_symbol(';') {
                continue;
            }
            if self.peek().is_none() {
                return Err(self.error(format!("unterminated oneof {}", name)));
            }
            if self.at_ident("option") && !self.peek_at(1).map_or(false, |t| t.is_symbol('=')) {
                self.option_statement()?;
                continue;
            }
            let field = self.field(Some(&name))?;
            if field.label.is_some() {
                return Err(self.error(format!("oneof field {} cannot have a label", field.name)));
            }
            if matches!(field.type_ref, TypeRef::Map { .. }) {
                return Err(self.error(format!("map field {} cannot be in a oneof", field.name)));
            }
            message.fields.push(field);
        }
    }

    fn field(&mut self, oneof: Option<&str>) -> PResult<FieldAst> {
        let label = match self.peek().and_then(Token::ident) {
            Some("optional") if self.is_labelled() => Some(Label::Optional),
            Some("required") if self.is_labelled() => Some(Label::Required),
            Some("repeated") if self.is_labelled() => Some(Label::Repeated),
            _ => None,
        };
        if label.is_some() {
            self.pos += 1;
        }

        if self.at_ident("group") {
            return Err(self.error("groups are not supported"));
        }

        let type_ref = if self.at_ident("map") && self.peek_at(1).map_or(false, |t| t.is_symbol('<')) {
            if label.is_some() {
                return Err(self.error("map fields cannot have a label"));
            }
            self.pos += 2;
            let key = self.expect_ident()?;
            self.expect_symbol(',')?;
            let value = self.type_ref()?;
            if matches!(value, TypeRef::Map { .. }) {
                return Err(self.error("map values cannot be maps"));
            }
            self.expect_symbol('>')?;
            TypeRef::Map {
                key,
                value: Box::new(value),
            }
        } else {
            self.type_ref()?
        };

        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let number = self.expect_int()?;
        let packed = self.field_options()?;
        self.expect_symbol(';')?;

        Ok(FieldAst {
            name,
            number,
            label,
            type_ref,
            packed,
            oneof: oneof.map(str::to_string),
        })
    }

    /// `optional` is a label unless it is itself the field type or name
    fn is_labelled(&self) -> bool {
        let next = self.peek_at(1);
        let after = self.peek_at(2);
        match (next, after) {
            (Some(n), Some(a)) => {
                (n.ident().is_some() || n.is_symbol('.')) && !a.is_symbol('=')
            }
            _ => false,
        }
    }

    fn type_ref(&mut self) -> PResult<TypeRef> {
        let name = self.full_ident()?;
        Ok(match ScalarType::from_keyword(&name) {
            Some(scalar) => TypeRef::Scalar(scalar),
            None => TypeRef::Named(name),
        })
    }

    /// `[packed = true, deprecated = true, (custom) = ...]`; returns `packed`
    fn field_options(&mut self) -> PResult<Option<bool>> {
        if !self.eat_symbol('[') {
            return Ok(None);
        }
        let mut packed = None;
        loop {
            let name = self.option_name()?;
            self.expect_symbol('=')?;
            let value = self.constant()?;
            if name == "packed" {
                packed = match value.as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    other => return Err(self.error(format!("invalid packed value '{}'", other))),
                };
            }
            if self.eat_symbol(']') {
                return Ok(packed);
            }
            self.expect_symbol(',')?;
        }
    }

    fn reserved(
        &mut self,
        numbers: &mut Vec<RangeInclusive<i64>>,
        names: &mut Vec<String>,
    ) -> PResult<()> {
        self.pos += 1;
        loop {
            if let Some(TokenKind::Str(_)) = self.peek().map(|t| &t.kind) {
                names.push(self.expect_string()?);
            } else if let Some(TokenKind::Ident(_)) = self.peek().map(|t| &t.kind) {
                // editions-style bare identifiers
                names.push(self.expect_ident()?);
            } else {
                let start = self.expect_int()?;
                let end = if self.at_ident("to") {
                    self.pos += 1;
                    if self.at_ident("max") {
                        self.pos += 1;
                        i64::from(super::MAX_FIELD_NUMBER)
                    } else {
                        self.expect_int()?
                    }
                } else {
                    start
                };
                numbers.push(start..=end);
            }
            if self.eat_symbol(';') {
                return Ok(());
            }
            if self.at_symbol('[') {
                self.field_options()?;
                continue;
            }
            self.expect_symbol(',')?;
        }
    }

    // -------------------------------------------------------------------------
    // Enums
    // -------------------------------------------------------------------------

    fn enumeration(&mut self) -> PResult<EnumAst> {
        self.pos += 1;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        let mut values = Vec::new();

        loop {
            let Some(token) = self.peek() else {
                return Err(self.error(format!("unterminated enum {}", name)));
            };
            if token.is_symbol('}') {
                self.pos += 1;
                break;
            }
            if token.is_symbol(';') {
                self.pos += 1;
                continue;
            }
            let is_value = self.peek_at(1).map_or(false, |t| t.is_symbol('='));
            match token.ident() {
                Some("option") if !is_value => self.option_statement()?,
                Some("reserved") if !is_value => {
                    let mut ranges = Vec::new();
                    let mut names = Vec::new();
                    self.reserved(&mut ranges, &mut names)?;
                }
                Some(_) => {
                    let value_name = self.expect_ident()?;
                    self.expect_symbol('=')?;
                    let number = self.expect_int()?;
                    self.field_options()?;
                    self.expect_symbol(';')?;
                    values.push(EnumValueAst {
                        name: value_name,
                        number,
                    });
                }
                None => return Err(self.error(format!("unexpected {} in enum {}", self.describe(), name))),
            }
        }

        if values.is_empty() {
            return Err(self.error(format!("enum {} must define at least one value", name)));
        }
        Ok(EnumAst { name, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_message() {
        let file = parse_file(
            "user.proto",
            r#"
            syntax = "proto3";
            package api.v1;
            import "other.proto";
            option go_package = "example.com/api";

            message User {
                int32 id = 1;
                string name = 2 [deprecated = true];
                repeated string tags = 3;
                optional Address address = 4;
                map<string, int64> counters = 5;
                oneof contact {
                    string email = 6;
                    string phone = 7;
                }
                reserved 10 to 12, 20;
                reserved "legacy";
                message Address { string city = 1; }
                enum Role { ROLE_UNSPECIFIED = 0; ADMIN = 1; }
            }
            service Users { rpc Get(User) returns (User); }
            "#,
        )
        .unwrap();

        assert_eq!(file.syntax, Syntax::Proto3);
        assert_eq!(file.package.as_deref(), Some("api.v1"));
        assert_eq!(file.imports, vec!["other.proto"]);
        let user = &file.messages[0];
        assert_eq!(user.fields.len(), 7);
        assert_eq!(user.fields[2].label, Some(Label::Repeated));
        assert_eq!(user.fields[3].type_ref, TypeRef::Named("Address".into()));
        assert!(matches!(user.fields[4].type_ref, TypeRef::Map { .. }));
        assert_eq!(user.fields[5].oneof.as_deref(), Some("contact"));
        assert_eq!(user.reserved_numbers, vec![10..=12, 20..=20]);
        assert_eq!(user.reserved_names, vec!["legacy"]);
        assert_eq!(user.messages[0].name, "Address");
        assert_eq!(user.enums[0].values.len(), 2);
    }

    #[test]
    fn test_parse_negative_enum_and_packed() {
        let file = parse_file(
            "a.proto",
            "syntax = \"proto2\";\nenum Level { LOW = -1; HIGH = 1; }\nmessage M { repeated int32 xs = 1 [packed = true]; }",
        )
        .unwrap();
        assert_eq!(file.enums[0].values[0].number, -1);
        assert_eq!(file.messages[0].fields[0].packed, Some(true));
    }

    #[test]
    fn test_field_named_like_keyword() {
        let file = parse_file(
            "a.proto",
            "message M { string message = 1; int32 optional = 2; string enum = 3; }",
        )
        .unwrap();
        let names: Vec<_> = file.messages[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["message", "optional", "enum"]);
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_file("bad.proto", "message M {\n  int32 id 1;\n}").unwrap_err();
        match err {
            CompileError::Syntax { file, line, .. } => {
                assert_eq!(file, "bad.proto");
                assert_eq!(line, 2);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_message_nesting_is_capped() {
        let nested = |depth: usize| {
            let mut text = String::new();
            for i in 0..depth {
                text.push_str(&format!("message M{} {{ ", i));
            }
            text.push_str(&"}".repeat(depth));
            text
        };
        assert!(parse_file("a.proto", &nested(MAX_MESSAGE_NESTING)).is_ok());

        let err = parse_file("a.proto", &nested(100_000)).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }

    #[test]
    fn test_unterminated_message() {
        assert!(parse_file("a.proto", "message M { int32 id = 1;").is_err());
    }
}
