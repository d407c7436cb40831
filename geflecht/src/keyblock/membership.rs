use fidem::{Fingerprint, Signable, Signed};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::{fmt, io};

/// A signed membership declaration: a key asking to join (`IN`) or leave
/// (`OUT`) the web of trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The currency the declaration belongs to.
    pub currency: String,
    /// The fingerprint of the declaring key.
    pub issuer: Fingerprint,
    /// Joining or leaving.
    pub membership: MembershipKind,
    /// The declared user id. Must match the key's user id packet.
    pub userid: String,
    /// Declaration timestamp, UTC seconds.
    pub date: i64,
}

impl Membership {
    /// The canonical text form. This is what the issuer signs.
    #[must_use]
    pub fn raw(&self) -> String {
        format!(
            "Version: 1\nCurrency: {}\nIssuer: {}\nMembership: {}\nUserID: {}\nDate: {}\n",
            self.currency, self.issuer, self.membership, self.userid, self.date
        )
    }
}

impl Signable for Membership {
    type SignableData = Vec<u8>;
    type Error = io::Error; // never used
    fn signable_data(&self) -> Result<Self::SignableData, Self::Error> {
        Ok(self.raw().into_bytes())
    }
}

/// The identity of a membership in the pool: SHA-1 over the raw text and
/// the signature.
#[must_use]
pub fn signed_hash(signed: &Signed<Membership>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(signed.unverified_ref().raw());
    hasher.update(signed.signature().hex());
    hex::encode(hasher.finalize())
}

/// Joining or leaving the web of trust.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipKind {
    /// The key wants to be (or stay) a member.
    In,
    /// The key wants to leave the member set.
    Out,
}

impl fmt::Display for MembershipKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::In => f.write_str("IN"),
            Self::Out => f.write_str("OUT"),
        }
    }
}
