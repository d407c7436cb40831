use fidem::Fingerprint;
use serde::{Deserialize, Serialize};

/// One certification link: `source` certified `target` in a block minted
/// at `timestamp`.
///
/// Links are never deleted. Once their age passes the configured validity
/// they are flagged obsolete and stop counting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// The certifying member.
    pub source: Fingerprint,
    /// The certified member.
    pub target: Fingerprint,
    /// Timestamp of the block that carried the certification.
    pub timestamp: i64,
    /// Whether the link has outlived its validity.
    pub obsolete: bool,
}
