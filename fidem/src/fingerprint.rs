use crate::Error;
use hex::FromHex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::{fmt, str::FromStr};

/// The length of a fingerprint in bytes (40 hex characters).
pub const FINGERPRINT_LEN: usize = 20;

/// The length of a key id in bytes (16 hex characters).
pub const KEY_ID_LEN: usize = 8;

/// The fingerprint of a public key: the SHA-1 digest of its key material.
///
/// Fingerprints order lexicographically, byte order and hex order agree.
///
/// ```
/// use fidem::Identity;
///
/// let fpr = Identity::generate().fingerprint();
/// assert_eq!(fpr.hex().len(), 40);
/// assert_eq!(fpr.hex()[24..].parse::<fidem::KeyId>().unwrap(), fpr.key_id());
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Compute the fingerprint of raw public key material.
    #[must_use]
    pub fn of_key_bytes(bytes: &[u8]) -> Self {
        let digest = Sha1::digest(bytes);
        let mut fingerprint = [0; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(&digest);
        Self(fingerprint)
    }

    /// Create a fingerprint from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        Ok(Self(FromHex::from_hex(hex)?))
    }

    /// Create a hexadecimal representation.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The key id: the trailing 8 bytes (16 hex characters) of the fingerprint.
    #[must_use]
    pub fn key_id(&self) -> KeyId {
        let mut id = [0; KEY_ID_LEN];
        id.copy_from_slice(&self.0[FINGERPRINT_LEN - KEY_ID_LEN..]);
        KeyId(id)
    }

    /// Get a reference to a binary representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Fingerprint {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// The short identifier of a key, used by signatures to name their issuer.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(pub(crate) [u8; KEY_ID_LEN]);

impl KeyId {
    /// Create a key id from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        Ok(Self(FromHex::from_hex(hex)?))
    }

    /// Create a hexadecimal representation.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for KeyId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// identifiers serialize as hex text, matching the chain's wire form
macro_rules! impl_hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let hex = String::deserialize(deserializer)?;
                hex.parse().map_err(de::Error::custom)
            }
        }
    };
}

impl_hex_serde!(Fingerprint);
impl_hex_serde!(KeyId);
