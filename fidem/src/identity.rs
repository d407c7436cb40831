use crate::{
    key_material::certified_message, Error, Fingerprint, PublicKey, Signable, Signature,
};
use ed25519_dalek::{ExpandedSecretKey, SecretKey};
use hex::FromHex;
use std::fmt;

const SECRET_LEN: usize = ed25519_dalek::SECRET_KEY_LENGTH;

/// A cryptographic identity: a public and a private key used to sign data,
/// memberships, certifications and blocks.
pub struct Identity {
    public: PublicKey,
    secret: SecretKey,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Identity")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            public: self.public.clone(),
            secret: SecretKey::from_bytes(self.secret.as_bytes()).unwrap(),
        }
    }
}

impl Identity {
    pub(crate) fn from_secret_key(secret: SecretKey) -> Self {
        let public = PublicKey((&secret).into());
        Self { public, secret }
    }

    /// Create an identity from its hexadecimal representation.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes: [u8; SECRET_LEN] = FromHex::from_hex(hex)?;
        let secret = SecretKey::from_bytes(&bytes).unwrap();
        Ok(Self::from_secret_key(secret))
    }

    /// Generate a new random identity.
    #[must_use]
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut rand::rngs::OsRng {});
        Self::from_secret_key(secret)
    }

    /// Get the public key of the identity.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the fingerprint of the identity.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }

    /// Create a hexadecimal representation of the secret key.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.secret.as_bytes())
    }

    /// Create a detached signature over raw `data`.
    #[must_use]
    pub fn sign_data(&self, data: &[u8]) -> Signature {
        let expanded = ExpandedSecretKey::from(&self.secret);
        let sig = expanded.sign(data, &self.public.0);
        Signature {
            issuer: self.public.key_id(),
            sig,
        }
    }

    /// Create a signature of a `message` that implements `Signable`.
    pub fn sign<S>(&self, message: S) -> Result<Signature, Error>
    where
        S: Signable,
    {
        let data = message.signable_data().map_err(Error::signable_error)?;
        Ok(self.sign_data(data.as_ref()))
    }

    /// Certify a `(user id, primary key)` pair with this identity.
    #[must_use]
    pub fn certify(&self, user_id: &str, key: &PublicKey) -> Signature {
        self.sign_data(&certified_message(key, user_id))
    }

    /// Self-certify this identity's own `user_id`.
    #[must_use]
    pub fn self_certify(&self, user_id: &str) -> Signature {
        self.sign_data(&certified_message(&self.public, user_id))
    }
}
