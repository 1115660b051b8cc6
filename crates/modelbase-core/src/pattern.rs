//! Model id match patterns shared by provider exclusions and filter rules.
//!
//! A pattern is either a glob (`*` matches any run of characters, `?` one
//! character) or an explicit regex wrapped in slashes (`/^gpt-4o(-mini)?$/`).
//! Globs are anchored at both ends; regexes are anchored unless they already
//! are. Matching is case-sensitive.

use std::fmt;

use regex::Regex;

#[derive(Debug, Clone)]
pub struct ModelPattern {
    source: String,
    regex: Regex,
}

impl ModelPattern {
    pub fn compile(raw: &str) -> Result<Self, regex::Error> {
        let raw = raw.trim();
        let expr = match explicit_regex(raw) {
            Some(inner) => format!("^(?:{inner})$"),
            None => glob_to_regex(raw),
        };
        Ok(Self {
            source: raw.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    pub fn is_match(&self, model_id: &str) -> bool {
        self.regex.is_match(model_id)
    }
}

impl PartialEq for ModelPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for ModelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn explicit_regex(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    raw.strip_prefix('/')?.strip_suffix('/')
}

fn glob_to_regex(glob: &str) -> String {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    let mut literal = [0u8; 4];
    for c in glob.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');
    expr
}
