//! Per-handle diagnostic counters
//!
//! Recoverable anomalies (unknown section tags, table2 fallbacks, tolerated
//! checksum mismatches, unknown logical-evidence type codes) are skipped
//! locally and tallied here instead of failing the whole operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for locally-recovered anomalies
///
/// All counters are monotonic for the lifetime of the handle. Updates use
/// relaxed ordering: each counter is an independent statistic, not a
/// synchronization point.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Sections with an unrecognized type tag that were skipped
    unknown_sections: AtomicU64,
    /// Chunk tables recovered from the `table2` mirror
    recovered_tables: AtomicU64,
    /// Chunk checksum mismatches tolerated in tolerant read mode
    tolerated_checksum_errors: AtomicU64,
    /// Logical-evidence type codes that were not recognized
    unknown_lef_types: AtomicU64,
}

impl Diagnostics {
    /// Create a zeroed counter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a skipped unknown section
    pub fn count_unknown_section(&self, tag: &str) {
        tracing::debug!(tag, "skipping unknown section");
        self.unknown_sections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk table recovered from its `table2` mirror
    pub fn count_recovered_table(&self) {
        tracing::warn!("table section checksum failed, recovered from table2");
        self.recovered_tables.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk checksum mismatch that tolerant mode let through
    pub fn count_tolerated_checksum_error(&self, chunk_index: u64) {
        tracing::warn!(chunk_index, "tolerating chunk checksum mismatch");
        self.tolerated_checksum_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unrecognized logical-evidence type code
    pub fn count_unknown_lef_type(&self, code: &str) {
        tracing::debug!(code, "ignoring unknown logical evidence type code");
        self.unknown_lef_types.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of unknown sections skipped so far
    pub fn unknown_sections(&self) -> u64 {
        self.unknown_sections.load(Ordering::Relaxed)
    }

    /// Number of table2 recoveries so far
    pub fn recovered_tables(&self) -> u64 {
        self.recovered_tables.load(Ordering::Relaxed)
    }

    /// Number of tolerated chunk checksum mismatches so far
    pub fn tolerated_checksum_errors(&self) -> u64 {
        self.tolerated_checksum_errors.load(Ordering::Relaxed)
    }

    /// Number of unknown logical-evidence type codes so far
    pub fn unknown_lef_types(&self) -> u64 {
        self.unknown_lef_types.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let diagnostics = Diagnostics::new();
        assert_eq!(diagnostics.unknown_sections(), 0);

        diagnostics.count_unknown_section("bogus");
        diagnostics.count_unknown_section("bogus2");
        diagnostics.count_recovered_table();
        diagnostics.count_tolerated_checksum_error(7);
        diagnostics.count_unknown_lef_type("si");

        assert_eq!(diagnostics.unknown_sections(), 2);
        assert_eq!(diagnostics.recovered_tables(), 1);
        assert_eq!(diagnostics.tolerated_checksum_errors(), 1);
        assert_eq!(diagnostics.unknown_lef_types(), 1);
    }
}
