//! Tokenizer for definition text
//!
//! Tokens keep their byte span so the rewrite pass can splice replacement
//! names into the original text without disturbing anything else.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// Integer literal; sign is a separate `Symbol('-')` token
    Int(u64),
    Float(f64),
    Str(String),
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_symbol(&self, c: char) -> bool {
        self.kind == TokenKind::Symbol(c)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s == word)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Split `text` into tokens, dropping whitespace and comments
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(text).run()
}

struct Lexer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            line: self.line,
            column: self.column(),
            message: message.into(),
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek(0)?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(b)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let Some(b) = self.peek(0) else {
                return Ok(tokens);
            };
            let start = self.pos;
            let (line, column) = (self.line, self.column());
            let kind = match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.ident(),
                b'0'..=b'9' => self.number()?,
                b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => self.number()?,
                b'"' | b'\'' => self.string()?,
                _ => {
                    let c = self.text[self.pos..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.error("unexpected end of input"))?;
                    if !c.is_ascii_punctuation() {
                        return Err(self.error(format!("unexpected character '{}'", c)));
                    }
                    self.bump();
                    TokenKind::Symbol(c)
                }
            };
            tokens.push(Token {
                kind,
                span: start..self.pos,
                line,
                column,
            });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.peek(0) {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let err = self.error("unterminated block comment");
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(0), self.peek(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(err),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(0), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.bump();
        }
        TokenKind::Ident(self.text[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        if self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X')) {
            self.bump();
            self.bump();
            let digits = self.pos;
            while matches!(self.peek(0), Some(b) if b.is_ascii_hexdigit()) {
                self.bump();
            }
            return u64::from_str_radix(&self.text[digits..self.pos], 16)
                .map(TokenKind::Int)
                .map_err(|_| self.error("invalid hex literal"));
        }

        let mut is_float = false;
        while let Some(b) = self.peek(0) {
            match b {
                b'0'..=b'9' => {}
                b'.' => is_float = true,
                b'e' | b'E' => {
                    is_float = true;
                    if matches!(self.peek(1), Some(b'+' | b'-')) {
                        self.bump();
                    }
                }
                _ => break,
            }
            self.bump();
        }

        let literal = &self.text[start..self.pos];
        if is_float {
            literal
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", literal)))
        } else if literal.len() > 1 && literal.starts_with('0') {
            u64::from_str_radix(&literal[1..], 8)
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("invalid octal literal '{}'", literal)))
        } else {
            literal
                .parse::<u64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("integer literal '{}' out of range", literal)))
        }
    }

    fn string(&mut self) -> Result<TokenKind, LexError> {
        let err = self.error("unterminated string literal");
        let quote = self.bump().ok_or_else(|| err.clone())?;
        let mut value = String::new();
        loop {
            let rest = &self.text[self.pos..];
            let c = rest.chars().next().ok_or_else(|| err.clone())?;
            if c == '\n' {
                return Err(err);
            }
            for _ in 0..c.len_utf8() {
                self.bump();
            }
            if c as u32 == quote as u32 {
                return Ok(TokenKind::Str(value));
            }
            if c == '\\' {
                let escaped = match self.escape() {
                    Some(escaped) => escaped,
                    None if self.is_at_end() => return Err(err),
                    None => return Err(self.error("invalid escape sequence")),
                };
                value.push(escaped);
            } else {
                value.push(c);
            }
        }
    }

    /// Character after a backslash, consuming the whole escape sequence
    fn escape(&mut self) -> Option<char> {
        let c = self.text[self.pos..].chars().next()?;
        for _ in 0..c.len_utf8() {
            self.bump();
        }
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            'x' | 'X' => char::from(self.digits(16, 2)?),
            '0'..='7' => {
                // the first octal digit is already consumed
                let mut value = c as u32 - '0' as u32;
                for _ in 0..2 {
                    match self.peek(0) {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.bump();
                        }
                        _ => break,
                    }
                }
                char::from(u8::try_from(value).ok()?)
            }
            other => other,
        };
        Some(decoded)
    }

    /// Up to `max` digits in `radix`, at least one
    fn digits(&mut self, radix: u32, max: usize) -> Option<u8> {
        let mut value = 0u32;
        let mut count = 0;
        while count < max {
            let Some(d) = self.peek(0).and_then(|b| char::from(b).to_digit(radix)) else {
                break;
            };
            value = value * radix + d;
            self.bump();
            count += 1;
        }
        if count == 0 {
            return None;
        }
        u8::try_from(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_field_line() {
        assert_eq!(
            kinds("int32 id = 1;"),
            vec![
                TokenKind::Ident("int32".into()),
                TokenKind::Ident("id".into()),
                TokenKind::Symbol('='),
                TokenKind::Int(1),
                TokenKind::Symbol(';'),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("// header\nmessage /* inline */ A {}");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], TokenKind::Ident("message".into()));
    }

    #[test]
    fn test_spans_and_positions() {
        let tokens = tokenize("enum E {\n  NONE = 0;\n}").unwrap();
        let none = tokens.iter().find(|t| t.is_ident("NONE")).unwrap();
        assert_eq!(none.span, 11..15);
        assert_eq!((none.line, none.column), (2, 3));
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(kinds("0x1F"), vec![TokenKind::Int(31)]);
        assert_eq!(kinds("017"), vec![TokenKind::Int(15)]);
        assert_eq!(kinds("1.5"), vec![TokenKind::Float(1.5)]);
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            kinds(r#"syntax = "proto3";"#)[2],
            TokenKind::Str("proto3".into())
        );
    }

    #[test]
    fn test_escapes_before_multibyte_chars() {
        assert_eq!(kinds(r#""\é""#), vec![TokenKind::Str("é".into())]);
        assert_eq!(kinds(r#""a\é\ü b""#), vec![TokenKind::Str("aéü b".into())]);
    }

    #[test]
    fn test_hex_and_octal_escapes() {
        assert_eq!(kinds(r#""\x41\101\0""#), vec![TokenKind::Str("AA\0".into())]);
        assert_eq!(kinds(r#""\"q\"""#), vec![TokenKind::Str("\"q\"".into())]);
        let err = tokenize(r#""\xZZ""#).unwrap_err();
        assert!(err.message.contains("escape"));
    }

    #[test]
    fn test_unterminated_comment_errors() {
        let err = tokenize("message A { /* oops").unwrap_err();
        assert!(err.message.contains("block comment"));
    }
}
