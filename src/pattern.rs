//! URL glob patterns
//!
//! `*` matches any run of characters, `/` included. Everything else is
//! literal. Matching is case-sensitive and covers the whole URL string
//! (scheme, host, path and query).

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled URL glob
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^(?s:{})$", body)).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}
