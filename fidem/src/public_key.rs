use crate::{Error, Fingerprint, KeyId, Signature};
use ed25519_dalek::Verifier;
use hex::FromHex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

const PUBLIC_LEN: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// An ed25519 public key, the primary or a subkey of some key material.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub(crate) ed25519_dalek::PublicKey);

#[allow(clippy::derive_hash_xor_eq)]
impl Hash for PublicKey {
    fn hash<H>(&self, h: &mut H)
    where
        H: Hasher,
    {
        self.0.as_bytes().hash(h)
    }
}

impl PublicKey {
    /// Create a public key from its raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(ed25519_dalek::PublicKey::from_bytes(bytes)?))
    }

    /// Create a public key from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes: [u8; PUBLIC_LEN] = FromHex::from_hex(hex)?;
        Self::from_bytes(&bytes)
    }

    /// Create a hexadecimal representation.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// The fingerprint of this key.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_key_bytes(self.0.as_bytes())
    }

    /// The key id of this key.
    #[must_use]
    pub fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    /// Verify a detached `signature` over raw `data`.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> Result<(), Error> {
        Ok(self.0.verify(data, &signature.sig)?)
    }

    /// Get a reference to a binary representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for PublicKey {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(de::Error::custom)
    }
}
