use crate::{fingerprint::KEY_ID_LEN, Error, KeyId};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

const SIG_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// A detached signature, carrying the key id of its issuer.
///
/// The issuer field is what certifier discovery reads; it is a claim, the
/// signature still has to verify against the claimed key.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    pub(crate) issuer: KeyId,
    pub(crate) sig: ed25519_dalek::Signature,
}

impl Signature {
    /// The key id of the key that issued this signature.
    #[must_use]
    pub fn issuer(&self) -> KeyId {
        self.issuer
    }

    /// Create a signature from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != KEY_ID_LEN + SIG_LEN {
            return Err(hex::FromHexError::InvalidStringLength.into());
        }
        let mut issuer = [0; KEY_ID_LEN];
        issuer.copy_from_slice(&bytes[..KEY_ID_LEN]);
        let sig = ed25519_dalek::Signature::from_bytes(&bytes[KEY_ID_LEN..])?;
        Ok(Self {
            issuer: KeyId(issuer),
            sig,
        })
    }

    /// Create a hexadecimal representation.
    #[must_use]
    pub fn hex(&self) -> String {
        let mut bytes = Vec::with_capacity(KEY_ID_LEN + SIG_LEN);
        bytes.extend_from_slice(&self.issuer.0);
        bytes.extend_from_slice(&self.sig.to_bytes());
        hex::encode(bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Signature {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(de::Error::custom)
    }
}
