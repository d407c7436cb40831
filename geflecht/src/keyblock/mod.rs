//! The `Keyblock` data model and its canonical text form.

mod keychange;
mod membership;
mod merkle;
mod number;

pub use keychange::{Back, Keychange, Leaver, Newcomer, Update};
pub use membership::{signed_hash, Membership, MembershipKind};
pub use merkle::members_root;
pub use number::BlockNumber;

use fidem::{Error as CryptoError, Fingerprint, Signature};
use hex::FromHex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::{fmt, fmt::Write, str::FromStr};

/// The unit of consensus: one block of the keychain.
///
/// A block starts unsealed (no signature, no hash). The proof-of-work
/// search seals it; only sealed blocks can be submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyblock {
    /// Block number, genesis is `0`.
    pub number: BlockNumber,
    /// The chain's currency label, constant across a chain.
    pub currency: String,
    /// Hash of the preceding block. `None` iff genesis.
    pub previous_hash: Option<BlockHash>,
    /// Issuer of the preceding block. `None` iff genesis.
    pub previous_issuer: Option<Fingerprint>,
    /// Block timestamp, UTC seconds.
    pub timestamp: i64,
    /// Nonce, only meaningful to the proof-of-work search.
    pub nonce: u64,
    /// Fingerprint of the signing member.
    pub issuer: Fingerprint,
    /// Merkle root of the member set after this block applies.
    pub members_root: String,
    /// Size of the member set after this block applies.
    pub members_count: u64,
    /// Lexicographically sorted joins (`+FPR`) and exclusions (`-FPR`).
    pub members_changes: Vec<MembersChange>,
    /// Ordered keychange records.
    pub keys_changes: Vec<Keychange>,
    /// The issuer's signature over `raw()`. `None` while unsealed.
    pub signature: Option<Signature>,
    /// SHA-1 of `raw()` followed by the signature. `None` while unsealed.
    pub hash: Option<BlockHash>,
}

impl Keyblock {
    /// The canonical text form of the block, without signature and hash.
    /// This is what the issuer signs and what the hash covers.
    #[must_use]
    pub fn raw(&self) -> String {
        let mut out = String::new();
        writeln!(out, "Version: 1").unwrap();
        writeln!(out, "Type: KeyBlock").unwrap();
        writeln!(out, "Currency: {}", self.currency).unwrap();
        writeln!(out, "Nonce: {}", self.nonce).unwrap();
        writeln!(out, "Number: {}", self.number).unwrap();
        writeln!(out, "Timestamp: {}", self.timestamp).unwrap();
        if let (Some(previous_hash), Some(previous_issuer)) =
            (&self.previous_hash, &self.previous_issuer)
        {
            writeln!(out, "PreviousHash: {}", previous_hash).unwrap();
            writeln!(out, "PreviousIssuer: {}", previous_issuer).unwrap();
        }
        writeln!(out, "MembersCount: {}", self.members_count).unwrap();
        writeln!(out, "MembersRoot: {}", self.members_root).unwrap();
        writeln!(out, "MembersChanges:").unwrap();
        for change in &self.members_changes {
            writeln!(out, "{}", change).unwrap();
        }
        writeln!(out, "KeysChanges:").unwrap();
        for keychange in &self.keys_changes {
            out.push_str(&keychange.raw());
        }
        writeln!(out, "Issuer: {}", self.issuer).unwrap();
        out
    }

    /// Compute the hash a given signature would seal this block with.
    #[must_use]
    pub fn hash_with(&self, signature: &Signature) -> BlockHash {
        let mut hasher = Sha1::new();
        hasher.update(self.raw());
        hasher.update(signature.hex());
        let mut hash = [0; BLOCK_HASH_LEN];
        hash.copy_from_slice(&hasher.finalize());
        BlockHash(hash)
    }

    /// Seal the block with a signature, computing its hash.
    pub fn seal(&mut self, signature: Signature) {
        self.hash = Some(self.hash_with(&signature));
        self.signature = Some(signature);
    }

    /// The fingerprints joining in this block, in `members_changes` order.
    pub fn joiners(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.members_changes.iter().filter_map(|change| match change {
            MembersChange::Join(fpr) => Some(*fpr),
            MembersChange::Leave(_) => None,
        })
    }

    /// The fingerprints excluded in this block, in `members_changes` order.
    pub fn leavers(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.members_changes.iter().filter_map(|change| match change {
            MembersChange::Leave(fpr) => Some(*fpr),
            MembersChange::Join(_) => None,
        })
    }
}

const BLOCK_HASH_LEN: usize = 20;

/// The SHA-1 hash sealing a block. Leading zero hex digits are the proof
/// of work.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct BlockHash([u8; BLOCK_HASH_LEN]);

impl BlockHash {
    /// Create a block hash from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        Ok(Self(FromHex::from_hex(hex)?))
    }

    /// Create a hexadecimal representation.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Count the leading zero hex digits.
    #[must_use]
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for byte in &self.0 {
            if byte >> 4 != 0 {
                break;
            }
            zeros += 1;
            if byte & 0x0f != 0 {
                break;
            }
            zeros += 1;
        }
        zeros
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for BlockHash {
    type Err = CryptoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(de::Error::custom)
    }
}

/// One entry of a block's `MembersChanges` section.
///
/// The derived order matches the order of the text form: all `+FPR` sort
/// before all `-FPR`, fingerprints ascending within each sign.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MembersChange {
    /// `+FPR`: the fingerprint becomes a member.
    Join(Fingerprint),
    /// `-FPR`: the fingerprint is excluded.
    Leave(Fingerprint),
}

impl MembersChange {
    /// The fingerprint the change applies to.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::Join(fpr) | Self::Leave(fpr) => *fpr,
        }
    }
}

impl fmt::Display for MembersChange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Join(fpr) => write!(f, "+{}", fpr),
            Self::Leave(fpr) => write!(f, "-{}", fpr),
        }
    }
}
