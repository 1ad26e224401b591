//! Route pattern compiler.
//!
//! A pattern is a `/`-separated path. Segments are literal text, `:name`
//! (anything up to the next `/`) or `:name#regex#`, where `#` can be any
//! character that is neither a word character nor `/`, used as both opener
//! and closer. Patterns without captures become exact-match keys.

use std::collections::HashSet;

use regex::Regex;

use crate::error::PatternError;

/// Which tier of the route table a pattern should land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteKind {
    /// Simple when the pattern has no captures, regex otherwise.
    #[default]
    Auto,
    /// Always an exact-match key, even if it looks parametric.
    Simple,
    /// Always a regex, even if it is pure literal text.
    Regex,
}

#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Simple(String),
    Regex(Regex),
}

impl CompiledPattern {
    pub fn is_simple(&self) -> bool {
        matches!(self, CompiledPattern::Simple(_))
    }
}

/// Removes surrounding whitespace and leading/trailing `/`, `$` and `^`.
pub fn strip_pattern(raw: &str) -> &str {
    raw.trim().trim_matches(|c: char| c == '/' || c == '$' || c == '^')
}

/// Compiles `raw` into an exact-match key or an anchored regex.
///
/// Any non-word character other than `/` right after a capture name opens an
/// inline regex, so `/files/:name.txt` is an
/// [`PatternError::UnbalancedDelimiter`]. Write `/files/:name#[^/]+#.txt`
/// for a capture followed by literal text.
pub fn compile(raw: &str, kind: RouteKind) -> Result<CompiledPattern, PatternError> {
    let residue = strip_pattern(raw);
    match kind {
        RouteKind::Simple => return Ok(CompiledPattern::Simple(residue.to_string())),
        RouteKind::Auto if is_literal(residue) => {
            return Ok(CompiledPattern::Simple(residue.to_string()));
        }
        _ => {}
    }

    let source = format!("^{}$", translate(residue)?);
    let regex = Regex::new(&source).map_err(|source_err| PatternError::InvalidRegex {
        pattern: raw.to_string(),
        source: source_err,
    })?;
    Ok(CompiledPattern::Regex(regex))
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `^(\w+/)*\w*$`: word segments joined by `/`, only the last may be empty.
fn is_literal(residue: &str) -> bool {
    let segments: Vec<&str> = residue.split('/').collect();
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .all(|(i, seg)| (i == last || !seg.is_empty()) && seg.chars().all(is_word))
}

/// Rewrites `:name#re#` and `:name` captures into named groups. Everything
/// else is passed to the regex engine untouched.
fn translate(residue: &str) -> Result<String, PatternError> {
    let chars: Vec<char> = residue.chars().collect();
    let mut out = String::with_capacity(residue.len() + 16);
    let mut names = HashSet::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let after_group_opener = i >= 1 && chars[i - 1] == '?';
        let starts_name = chars
            .get(i + 1)
            .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_');
        if c != ':' || after_group_opener || !starts_name {
            out.push(c);
            i += 1;
            continue;
        }

        let name_start = i + 1;
        let mut end = name_start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[name_start..end].iter().collect();
        if !names.insert(name.clone()) {
            return Err(PatternError::DuplicateName { name });
        }

        match chars.get(end) {
            Some(&delimiter) if !is_word(delimiter) && delimiter != '/' => {
                let body_start = end + 1;
                let close = chars[body_start..]
                    .iter()
                    .position(|&c| c == delimiter)
                    .map(|p| body_start + p)
                    .ok_or_else(|| PatternError::UnbalancedDelimiter {
                        name: name.clone(),
                        delimiter,
                    })?;
                if close == body_start {
                    return Err(PatternError::EmptyRegex { name });
                }
                let inner: String = chars[body_start..close].iter().collect();
                out.push_str(&format!("(?P<{}>{})", name, inner));
                i = close + 1;
            }
            _ => {
                out.push_str(&format!("(?P<{}>[^/]+)", name));
                i = end;
            }
        }
    }

    Ok(out)
}
