#![allow(clippy::use_self)]

use crate::{Error, Identity, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::{error::Error as StdError, ops::Deref};

/// A `Signable` is something that can be signed.
///
/// ```
/// use fidem::{Identity, Signable};
/// use std::io;
///
/// struct Declaration(String);
///
/// impl<'a> Signable for &'a Declaration {
///     type SignableData = &'a str;
///     type Error = io::Error; // never used
///     fn signable_data(&self) -> Result<Self::SignableData, Self::Error> {
///         Ok(&self.0)
///     }
/// }
///
/// let identity = Identity::generate();
/// let declaration = Declaration("IN".to_string());
///
/// let signed = (&declaration).sign(&identity).unwrap();
/// let verified = signed.verify_ref().unwrap();
/// assert_eq!(verified.signer(), identity.public_key());
/// ```
pub trait Signable: Sized {
    /// The type for representing signable data.
    type SignableData: AsRef<[u8]>;

    /// The type of error that can occur while creating the signable data.
    type Error: StdError + Send + Sync + 'static;

    /// Create a signable representation from self.
    fn signable_data(&self) -> Result<Self::SignableData, Self::Error>;

    /// Sign a `Signable` message with an `identity`.
    fn sign(self, identity: &Identity) -> Result<Signed<Self>, Error> {
        let signer = identity.public_key().clone();
        let signature = identity.sign(&self)?;
        Ok(Signed {
            signer,
            body: self,
            signature,
        })
    }
}

impl<'a, S> Signable for &'a S
where
    S: Signable,
{
    type SignableData = S::SignableData;
    type Error = S::Error;
    fn signable_data(&self) -> Result<Self::SignableData, Self::Error> {
        S::signable_data(self)
    }
}

/// Wraps a message with its signer's public key and signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    signer: PublicKey,
    body: T,
    signature: Signature,
}

impl<T> Signed<T> {
    /// Get the signer of the signature.
    pub const fn signer(&self) -> &PublicKey {
        &self.signer
    }

    /// Get the signature of the message.
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the unverified body.
    pub fn unverified_ref(&self) -> &T {
        &self.body
    }
}

impl<T> Signed<T>
where
    T: Signable,
{
    /// Verify the signature of a signed message.
    pub fn verify(self) -> Result<Verified<T>, Error> {
        self.verify_ref()?;
        Ok(Verified(self))
    }

    /// Verify the signature of a signed message without consuming it.
    pub fn verify_ref(&self) -> Result<VerifiedRef<T>, Error> {
        let data = self.body.signable_data().map_err(Error::signable_error)?;
        self.signer.verify(data.as_ref(), &self.signature)?;
        Ok(VerifiedRef(self))
    }
}

impl<T> Eq for Signed<T> {}

impl<T> PartialEq for Signed<T> {
    fn eq(&self, other: &Self) -> bool {
        // Comparing the signatures should be enough.
        self.signature == other.signature
    }
}

/// A verified signed message.
pub struct Verified<T>(Signed<T>);

impl<T> Verified<T> {
    /// Get the signer of the signature.
    pub const fn signer(&self) -> &PublicKey {
        self.0.signer()
    }

    /// Get the signature of the message.
    pub const fn signature(&self) -> &Signature {
        &self.0.signature
    }

    /// Extract the message.
    #[allow(clippy::missing_const_for_fn)]
    pub fn into_inner(self) -> T {
        self.0.body
    }
}

impl<T> Deref for Verified<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0.body
    }
}

impl<T> From<Verified<T>> for Signed<T> {
    fn from(v: Verified<T>) -> Self {
        v.0
    }
}

/// A verified reference to a signed message.
pub struct VerifiedRef<'a, T>(&'a Signed<T>);

impl<'a, T> Copy for VerifiedRef<'a, T> {}

impl<'a, T> Clone for VerifiedRef<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> VerifiedRef<'a, T> {
    /// Get the signer of the signature.
    #[must_use]
    pub const fn signer(self) -> &'a PublicKey {
        self.0.signer()
    }

    /// Get the signature of the message.
    #[must_use]
    pub const fn signature(self) -> &'a Signature {
        &self.0.signature
    }
}

impl<'a, T> Deref for VerifiedRef<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0.body
    }
}
