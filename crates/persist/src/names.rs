//! Collision-free symbol names with numeric suffixes
//!
//! Names are produced as `base + separator + n`. A per-base counter remembers
//! the next candidate, so repeated allocations for the same base never rescan
//! suffixes that were already handed out.

use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};

/// Separator used between a base name and its numeric suffix
pub const DEFAULT_SEPARATOR: &str = "_";

/// Allocates unique names, skipping everything that was reserved or handed out
#[derive(Debug, Clone)]
pub struct UniqueNameAllocator {
    separator: String,
    used: FxHashSet<String>,
    /// Next suffix candidate per numeric root
    next: FxHashMap<String, u64>,
}

impl Default for UniqueNameAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl UniqueNameAllocator {
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_owned(),
            used: FxHashSet::default(),
            next: FxHashMap::default(),
        }
    }

    /// Create an allocator with every name in `names` already reserved
    pub fn seeded<I, S>(separator: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allocator = Self::new(separator);
        for name in names {
            allocator.reserve(name.as_ref());
        }
        allocator
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Mark `name` as used without allocating it
    pub fn reserve(&mut self, name: &str) {
        if self.used.insert(name.to_owned()) {
            self.advance_past(name);
        }
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Return `base + separator + n` for the smallest free `n` at or past
    /// the base's counter.
    ///
    /// A base that already ends in `separator + digits` continues counting
    /// after that number under its numeric root: `allocate("x_3")` yields
    /// `x_4` (or later), never `x_3_0`. The counter only moves forward, so
    /// suffixes below it are never scanned again.
    pub fn allocate(&mut self, base: &str) -> String {
        let (root, start) = match self.split_numbered(base) {
            Some((root, n)) => (root.to_owned(), n.saturating_add(1)),
            None => (base.to_owned(), 0),
        };

        let next = self.next.get(&root).copied().unwrap_or(0);
        let mut candidate = start.max(next);
        let name = loop {
            let name = format!("{root}{}{candidate}", self.separator);
            if !self.used.contains(&name) {
                break name;
            }
            candidate += 1;
        };
        self.next.insert(root, next.max(candidate + 1));

        trace!("Allocated name '{name}' for base '{base}'");
        self.used.insert(name.clone());
        name
    }

    /// Reserve every name in `extra_avoid`, then allocate from `base`
    pub fn unique<I, S>(&mut self, base: &str, extra_avoid: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in extra_avoid {
            self.reserve(name.as_ref());
        }
        self.allocate(base)
    }

    /// Return `name` itself when it is free, otherwise allocate from it
    pub fn claim(&mut self, name: &str) -> String {
        if !name.is_empty() && self.used.insert(name.to_owned()) {
            self.advance_past(name);
            return name.to_owned();
        }
        self.allocate(name)
    }

    /// Move the counter of `name`'s numeric root past it when `name` is the
    /// counter's current candidate
    fn advance_past(&mut self, name: &str) {
        let Some((root, n)) = self.split_numbered(name) else {
            return;
        };
        let next = self.next.get(root).copied().unwrap_or(0);
        if n == next {
            self.next.insert(root.to_owned(), next + 1);
        }
    }

    #[cfg(test)]
    fn next_suffix(&self, root: &str) -> Option<u64> {
        self.next.get(root).copied()
    }

    /// Split `root + separator + digits` into its root and number
    fn split_numbered<'n>(&self, name: &'n str) -> Option<(&'n str, u64)> {
        let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if stem.len() == name.len() {
            return None;
        }
        let number = name[stem.len()..].parse().ok()?;
        let root = stem.strip_suffix(self.separator.as_str())?;
        Some((root, number))
    }
}
