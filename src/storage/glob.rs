//! Glob matching for object keys.
//!
//! Object stores only support prefix listing, so a glob is split into the
//! literal prefix before its first wildcard (used to narrow the listing) and
//! a regex applied to each listed key.
//!
//! - `*` matches any run of characters except `/`
//! - `?` matches one character except `/`
//! - `**` matches across `/`
//! - `{a,b}` matches either alternative

use regex::Regex;
use snafu::prelude::*;

use crate::error::{InvalidGlobSnafu, StorageError};

/// A compiled glob over `/`-separated keys.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a glob pattern. Leading `/` is ignored.
    pub fn new(pattern: &str) -> Result<Self, StorageError> {
        let pattern = pattern.trim_start_matches('/').to_string();
        let regex = Regex::new(&to_regex(&pattern)).context(InvalidGlobSnafu {
            pattern: pattern.clone(),
        })?;
        Ok(Self { pattern, regex })
    }

    /// The glob as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Directory prefix that every match must start with.
    ///
    /// Only whole path segments are included, since object stores list by
    /// segment boundaries.
    pub fn literal_prefix(&self) -> &str {
        let first_wildcard = self
            .pattern
            .find(['*', '?', '{'])
            .unwrap_or(self.pattern.len());
        match self.pattern[..first_wildcard].rfind('/') {
            Some(idx) => &self.pattern[..idx],
            None => "",
        }
    }

    /// Whether `key` (relative to the listing root) matches.
    pub fn is_match(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

fn to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    let mut in_alternation = false;
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // `**/` also matches zero directories
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' if !in_alternation => {
                in_alternation = true;
                out.push_str("(?:");
            }
            '}' if in_alternation => {
                in_alternation = false;
                out.push(')');
            }
            ',' if in_alternation => out.push('|'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}
