//! ChangeDetector - Snapshot Change Fingerprinting
//!
//! Compares successive fetches within one polling run by byte length. An
//! approximate fingerprint, not a content hash: equal-length content
//! changes go unnoticed, an accepted tradeoff for speed.

/// Per-run change detector
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous_len: Option<usize>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report whether this fetch warrants a detection attempt.
    ///
    /// A failed fetch (None) is never a change. A successful fetch is a
    /// change when its length differs from the previous recorded one; the
    /// length is recorded only then, mirroring that unchanged attempts
    /// leave the fingerprint untouched.
    pub fn observe(&mut self, fetched: Option<usize>) -> bool {
        let Some(len) = fetched else {
            return false;
        };

        let changed = self.previous_len != Some(len);
        if changed {
            self.previous_len = Some(len);
        }
        changed
    }
}
