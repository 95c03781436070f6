//! The `/`-separated prefix tables named in `spec.md` §4.5: publishers
//! and subscribers register full prefixes; matching against a queried
//! path walks ancestors from longest to shortest.

use std::collections::HashMap;
use std::sync::Mutex;

/// A prefix-keyed registry with longest-prefix-first lookup.
///
/// Despite the name used in `spec.md`'s state bullets ("trie-indexed"),
/// registered prefixes are whole strings rather than characters: a
/// lookup for `/a/b/c` walks the literal ancestor strings `/a/b/c`,
/// `/a/b`, `/a`, checking a flat map at each, which gives the same
/// longest-match semantics as a real trie at this scale without the
/// extra node-per-character bookkeeping.
pub struct PrefixTable<T> {
    inner: Mutex<HashMap<String, Vec<T>>>,
}

impl<T> Default for PrefixTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefixTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        PrefixTable {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> PrefixTable<T> {
    /// Registers `value` under the exact prefix string `prefix`.
    pub fn register(&self, prefix: &str, value: T) {
        self.inner
            .lock()
            .unwrap()
            .entry(normalize(prefix))
            .or_default()
            .push(value);
    }

    /// Walks `path`'s ancestors from longest to shortest, returning
    /// every registered prefix that matched alongside its values.
    pub fn matches(&self, path: &str) -> Vec<(String, Vec<T>)> {
        let inner = self.inner.lock().unwrap();
        ancestors(&normalize(path))
            .into_iter()
            .filter_map(|prefix| inner.get(&prefix).map(|values| (prefix, values.clone())))
            .collect()
    }

    /// Number of distinct prefixes with at least one registration.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// `true` if no prefix has any registration.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        format!("/{stripped}")
    } else {
        format!("/{path}")
    }
}

/// `/a/b/c` -> `["/a/b/c", "/a/b", "/a"]`.
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = path;
    loop {
        out.push(cursor.to_string());
        match cursor.rsplit_once('/') {
            Some(("", _)) | None => break,
            Some((head, _)) => cursor = head,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_is_returned_first() {
        let table: PrefixTable<&'static str> = PrefixTable::new();
        table.register("/a", "shallow");
        table.register("/a/b", "deep");
        let matches = table.matches("/a/b/c");
        assert_eq!(matches[0].0, "/a/b");
        assert_eq!(matches[1].0, "/a");
    }

    #[test]
    fn unrelated_prefix_does_not_match() {
        let table: PrefixTable<&'static str> = PrefixTable::new();
        table.register("/x", "nope");
        assert!(table.matches("/a/b").is_empty());
    }
}
