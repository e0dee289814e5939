//! In-memory metadata store
//!
//! Header values, hash values and the sector-range tables parsed from an
//! image, plus the values staged for writing. Strings are UTF-8 in memory;
//! encoding happens at the section codec boundary. Lookup is unordered,
//! serialization follows the known-identifier order.

use crate::header::KNOWN_HEADER_IDENTIFIERS;
use ewfkit_core::SectorRange;
use std::collections::HashMap;

/// Well-known hash value identifiers in serialization order
const KNOWN_HASH_IDENTIFIERS: &[&str] = &["MD5", "SHA1"];

/// A string-keyed value collection with known-keys-first serialization
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    values: HashMap<String, String>,
    known_order: &'static [&'static str],
}

impl ValueTable {
    fn with_known_order(known_order: &'static [&'static str]) -> Self {
        Self {
            values: HashMap::new(),
            known_order,
        }
    }

    /// Look up a value by identifier
    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.values.get(identifier).map(String::as_str)
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, identifier: impl Into<String>, value: impl Into<String>) {
        self.values.insert(identifier.into(), value.into());
    }

    /// Set a value only if the identifier is absent or currently empty
    ///
    /// Merge rule for `header` vs `header2`: the first non-empty value for
    /// an identifier wins.
    pub fn set_if_unset(&mut self, identifier: &str, value: &str) {
        match self.values.get(identifier) {
            Some(existing) if !existing.is_empty() => {}
            _ => {
                self.values.insert(identifier.to_string(), value.to_string());
            }
        }
    }

    /// Remove a value
    pub fn remove(&mut self, identifier: &str) -> Option<String> {
        self.values.remove(identifier)
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All (identifier, value) pairs: known identifiers first in their
    /// canonical order, then the rest sorted by identifier
    pub fn iter_ordered(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.values.len());
        for known in self.known_order {
            if let Some(value) = self.values.get(*known) {
                pairs.push((known.to_string(), value.clone()));
            }
        }
        let mut rest: Vec<_> = self
            .values
            .iter()
            .filter(|(id, _)| !self.known_order.contains(&id.as_str()))
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect();
        rest.sort();
        pairs.extend(rest);
        pairs
    }
}

/// Everything an image knows about itself besides the media bytes
#[derive(Debug, Clone)]
pub struct MetadataStore {
    header_values: ValueTable,
    hash_values: ValueTable,
    /// Sector ranges that failed to read during acquisition (`error2`)
    pub acquiry_errors: Vec<SectorRange>,
    /// Session start boundaries on optical media (`session`)
    pub sessions: Vec<SectorRange>,
    /// Sector ranges whose checksums mismatched in tolerant read mode
    pub checksum_errors: Vec<SectorRange>,
}

impl MetadataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            header_values: ValueTable::with_known_order(KNOWN_HEADER_IDENTIFIERS),
            hash_values: ValueTable::with_known_order(KNOWN_HASH_IDENTIFIERS),
            acquiry_errors: Vec::new(),
            sessions: Vec::new(),
            checksum_errors: Vec::new(),
        }
    }

    /// Header values (case number, examiner, dates, ...)
    pub fn header_values(&self) -> &ValueTable {
        &self.header_values
    }

    /// Mutable header values
    pub fn header_values_mut(&mut self) -> &mut ValueTable {
        &mut self.header_values
    }

    /// Hash values (`MD5`, `SHA1`, custom)
    pub fn hash_values(&self) -> &ValueTable {
        &self.hash_values
    }

    /// Mutable hash values
    pub fn hash_values_mut(&mut self) -> &mut ValueTable {
        &mut self.hash_values
    }

    /// Merge parsed header pairs under first-non-empty-wins semantics
    pub fn merge_header_pairs(&mut self, pairs: &[(String, String)]) {
        for (identifier, value) in pairs {
            self.header_values.set_if_unset(identifier, value);
        }
    }

    /// Merge parsed hash pairs under first-non-empty-wins semantics
    pub fn merge_hash_pairs(&mut self, pairs: &[(String, String)]) {
        for (identifier, value) in pairs {
            self.hash_values.set_if_unset(identifier, value);
        }
    }

    /// Record a tolerated checksum mismatch over a sector range
    pub fn record_checksum_error(&mut self, range: SectorRange) {
        self.checksum_errors.push(range);
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}
