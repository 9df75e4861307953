//! Permanent ignore list.
//!
//! The list is stored as one raw string with entries separated by commas or
//! newlines. It is small and edited rarely, so it is parsed on every read.

use std::sync::OnceLock;

use regex::Regex;

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[,\n]").expect("Invalid separator pattern"))
}

/// Identities that never raise an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    entries: Vec<String>,
}

impl IgnoreList {
    /// Parse a comma/newline-delimited list. Blank entries are dropped and
    /// case-insensitive duplicates collapse to the first spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut list = Self::default();
        for entry in separator().split(raw) {
            list.add(entry);
        }
        list
    }

    /// Case-insensitive exact membership test.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .iter()
            .any(|ignored| same_identity(ignored, id.trim()))
    }

    /// Add an identity. Returns `false` if it was already present or blank.
    pub fn add(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.contains(id) {
            return false;
        }
        self.entries.push(id.to_string());
        true
    }

    /// Remove an identity (case-insensitive). Returns `true` if removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        let id = id.trim();
        self.entries.retain(|e| !same_identity(e, id));
        self.entries.len() != before
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to the stored representation.
    #[must_use]
    pub fn to_raw(&self) -> String {
        self.entries.join(",")
    }
}

/// Unicode-aware case-insensitive comparison.
fn same_identity(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
