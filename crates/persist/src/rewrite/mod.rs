//! Renaming value references inside Python expression source
//!
//! Two strategies are available. [`RewriteStrategy::Structural`] parses the
//! text and replaces exactly the `Name` nodes that are value references.
//! [`RewriteStrategy::Heuristic`] scans identifier tokens and can be verified
//! against the structural reference count.

pub mod heuristic;
pub mod structural;

use std::{fmt, str::FromStr};

use log::{debug, trace};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ArchiveError, Result},
    types::FxIndexMap,
};

/// Old name to new name, applied simultaneously
pub type Replacements = FxIndexMap<String, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteStrategy {
    Heuristic,
    #[default]
    Structural,
}

impl fmt::Display for RewriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Heuristic => "heuristic",
            Self::Structural => "structural",
        })
    }
}

impl FromStr for RewriteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(Self::Heuristic),
            "structural" => Ok(Self::Structural),
            other => Err(format!(
                "unknown rewrite strategy '{other}' (expected 'heuristic' or 'structural')"
            )),
        }
    }
}

/// Applies [`Replacements`] to template source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateRewriter {
    strategy: RewriteStrategy,
    /// Check heuristic replacement counts against the structural reference count
    verify: bool,
    /// Retry with the structural strategy when verification fails
    fallback: bool,
}

impl Default for TemplateRewriter {
    fn default() -> Self {
        Self::new(RewriteStrategy::default())
    }
}

impl TemplateRewriter {
    pub const fn new(strategy: RewriteStrategy) -> Self {
        Self {
            strategy,
            verify: true,
            fallback: true,
        }
    }

    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub const fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub const fn strategy(&self) -> RewriteStrategy {
        self.strategy
    }

    /// Rename every value reference in `text` according to `replacements`.
    ///
    /// Keyword argument names and assignment targets are left alone, and all
    /// names are substituted in one pass so `{a: b, b: a}` swaps them.
    pub fn rewrite(&self, text: &str, replacements: &Replacements) -> Result<String> {
        let effective: Replacements = replacements
            .iter()
            .filter(|(old, new)| old != new)
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect();
        if effective.is_empty() {
            return Ok(text.to_owned());
        }

        match self.strategy {
            RewriteStrategy::Structural => structural::rewrite(text, &effective),
            RewriteStrategy::Heuristic => match self.rewrite_heuristic(text, &effective) {
                Err(err @ ArchiveError::ReplacementMismatch { .. }) if self.fallback => {
                    debug!("Heuristic rewrite of `{text}` rejected ({err}), using structural");
                    structural::rewrite(text, &effective)
                }
                other => other,
            },
        }
    }

    fn rewrite_heuristic(&self, text: &str, replacements: &Replacements) -> Result<String> {
        let (rewritten, counts) = heuristic::rewrite(text, replacements);
        if !self.verify {
            return Ok(rewritten);
        }

        let references = match structural::value_references(text) {
            Ok(references) => references,
            Err(err) => {
                trace!("Cannot verify heuristic rewrite: {err}");
                return Ok(rewritten);
            }
        };
        for (old, new) in replacements {
            let expected = references.iter().filter(|name| *name == old).count();
            let actual = counts.get(old.as_str()).copied().unwrap_or(0);
            if expected != actual {
                return Err(ArchiveError::ReplacementMismatch {
                    old: old.clone(),
                    new: new.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(rewritten)
    }
}

/// Number of value references to `name` in `text`.
///
/// Text that does not parse as an expression falls back to counting
/// identifier tokens.
pub fn count_references(text: &str, name: &str) -> usize {
    structural::count_references(text, name)
        .unwrap_or_else(|_| heuristic::count_tokens(text, name))
}

/// Distinct free value references in `text`, in order of first appearance
pub fn value_references(text: &str) -> Vec<String> {
    let all = structural::value_references(text).unwrap_or_else(|_| {
        heuristic::tokens(text)
            .into_iter()
            .map(str::to_owned)
            .collect()
    });
    let mut seen = FxHashSet::default();
    all.into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacements(pairs: &[(&str, &str)]) -> Replacements {
        pairs
            .iter()
            .map(|(old, new)| ((*old).to_owned(), (*new).to_owned()))
            .collect()
    }

    #[test]
    fn test_no_partial_matches() {
        for strategy in [RewriteStrategy::Heuristic, RewriteStrategy::Structural] {
            let rewriter = TemplateRewriter::new(strategy);
            let result = rewriter
                .rewrite("a + aa", &replacements(&[("a", "c")]))
                .unwrap();
            assert_eq!(result, "c + aa", "{strategy}");
        }
    }

    #[test]
    fn test_keyword_names_untouched() {
        for strategy in [RewriteStrategy::Heuristic, RewriteStrategy::Structural] {
            let rewriter = TemplateRewriter::new(strategy);
            let result = rewriter
                .rewrite("f(a=a, b=a == b)", &replacements(&[("a", "x"), ("b", "y")]))
                .unwrap();
            assert_eq!(result, "f(a=x, b=x == y)", "{strategy}");
        }
    }

    #[test]
    fn test_swap_is_simultaneous() {
        let rewriter = TemplateRewriter::default();
        let result = rewriter
            .rewrite("(a, b)", &replacements(&[("a", "b"), ("b", "a")]))
            .unwrap();
        assert_eq!(result, "(b, a)");
    }

    #[test]
    fn test_heuristic_mismatch_without_fallback() {
        let rewriter = TemplateRewriter::new(RewriteStrategy::Heuristic).with_fallback(false);
        let err = rewriter
            .rewrite("f('a', a)", &replacements(&[("a", "c")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ReplacementMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_heuristic_mismatch_falls_back() {
        let rewriter = TemplateRewriter::new(RewriteStrategy::Heuristic);
        let result = rewriter
            .rewrite("f('a', a)", &replacements(&[("a", "c")]))
            .unwrap();
        assert_eq!(result, "f('a', c)");
    }

    #[test]
    fn test_unverified_heuristic_keeps_its_answer() {
        let rewriter = TemplateRewriter::new(RewriteStrategy::Heuristic).with_verify(false);
        let result = rewriter
            .rewrite("f('a', a)", &replacements(&[("a", "c")]))
            .unwrap();
        assert_eq!(result, "f('c', c)");
    }

    #[test]
    fn test_identity_replacements_skip_parsing() {
        let rewriter = TemplateRewriter::default();
        let result = rewriter
            .rewrite("<object at 0x1>", &replacements(&[("object", "object")]))
            .unwrap();
        assert_eq!(result, "<object at 0x1>");
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "heuristic".parse::<RewriteStrategy>(),
            Ok(RewriteStrategy::Heuristic)
        );
        assert!("fancy".parse::<RewriteStrategy>().is_err());
    }

    #[test]
    fn test_value_references_deduplicated() {
        assert_eq!(
            value_references("array([x, x], dtype=float64)"),
            ["array", "x", "float64"]
        );
    }
}
