//! Token-scanning rewriter
//!
//! Treats every identifier token as a value reference unless it is an
//! attribute name, a keyword argument name or a string prefix. String
//! contents are not recognised, which is why callers can verify the result
//! against the structural count.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use super::Replacements;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\p{XID_Start}|_)\p{XID_Continue}*").expect("identifier pattern is valid")
});

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "t", "br", "rb", "fr", "rf", "tr", "rt"];

fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Whether the token at `start..end` sits where a value reference can be
fn is_value_position(text: &str, start: usize, end: usize) -> bool {
    let before = &text[..start];
    if before.chars().next_back().is_some_and(is_identifier_char) {
        return false;
    }
    if before.trim_end().ends_with('.') {
        return false;
    }

    let token = &text[start..end];
    let rest = &text[end..];
    if rest.starts_with(['\'', '"'])
        && STRING_PREFIXES.contains(&token.to_ascii_lowercase().as_str())
    {
        return false;
    }

    // `name=` is a keyword argument, `name ==` a comparison
    let after = rest.trim_start();
    !(after.starts_with('=') && !after.starts_with("=="))
}

/// Identifier tokens in value position, in source order
pub fn tokens(text: &str) -> Vec<&str> {
    IDENTIFIER
        .find_iter(text)
        .filter(|m| is_value_position(text, m.start(), m.end()))
        .map(|m| m.as_str())
        .collect()
}

pub fn count_tokens(text: &str, name: &str) -> usize {
    tokens(text).into_iter().filter(|token| *token == name).count()
}

/// Substitute all names in one pass.
///
/// Returns the rewritten text and how many times each old name was replaced.
pub fn rewrite<'r>(
    text: &str,
    replacements: &'r Replacements,
) -> (String, FxHashMap<&'r str, usize>) {
    let mut counts = FxHashMap::default();
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for m in IDENTIFIER.find_iter(text) {
        if !is_value_position(text, m.start(), m.end()) {
            continue;
        }
        if let Some((old, new)) = replacements.get_key_value(m.as_str()) {
            output.push_str(&text[last..m.start()]);
            output.push_str(new);
            last = m.end();
            *counts.entry(old.as_str()).or_insert(0) += 1;
        }
    }
    output.push_str(&text[last..]);

    (output, counts)
}
