use fidem::{Fingerprint, KeyId};
use im::OrdSet;
use serde::{Deserialize, Serialize};

/// Per-fingerprint membership flags.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRow {
    /// Whether the key is currently a member.
    pub member: bool,
    /// Whether the key must be excluded by the next block.
    pub kick: bool,
    /// Members this key no longer reaches within the step limit.
    pub distanced: OrdSet<Fingerprint>,
    /// Whether the key fell below the required certification count.
    pub link_shortage: bool,
}

/// The authoritative key material of a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    /// The fingerprint of the primary key.
    pub fingerprint: Fingerprint,
    /// The key id (trailing 16 hex characters of the fingerprint).
    pub key_id: KeyId,
    /// The member's user id.
    pub uid: String,
    /// The armored packets of the key.
    pub packets: String,
}
