//! The error surface of block submission and generation.

use crate::{block_storage, keychange_checker::KeychangeError};
use err_derive::Error;
use fidem::Fingerprint;

/// Why a block does not chain onto the current tip.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainingFault {
    /// There is no tip yet, only a root block (number 0) is accepted.
    #[error(display = "a root block is required first")]
    RequiresRoot,

    /// The block number is at or behind the current tip.
    #[error(display = "block number is behind the current tip")]
    TooLate,

    /// The block number skips ahead of the next expected number.
    #[error(display = "block number is ahead of the next expected block")]
    TooEarly,

    /// The previous hash does not match the tip's hash.
    #[error(display = "previous hash does not match the tip")]
    BadPrevHash,

    /// The previous issuer does not match the tip's issuer.
    #[error(display = "previous issuer does not match the tip")]
    BadPrevIssuer,
}

/// An error of block validation, application or generation.
///
/// Every validation error is terminal for the submitted block: nothing is
/// mutated, nothing is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The block does not chain onto the current tip.
    #[error(display = "bad chaining: {}", 0)]
    BadChaining(ChainingFault),

    /// The block timestamp is outside the accepted clock window.
    #[error(display = "block timestamp is outside the accepted window")]
    BadTimestamp,

    /// The block hash does not carry the required leading zeros, or does
    /// not match its own raw form and signature.
    #[error(display = "insufficient or inconsistent proof of work")]
    BadPoW,

    /// The block is not sealed with a signature and hash.
    #[error(display = "block is not sealed")]
    UnsealedBlock,

    /// The block issuer is not eligible.
    #[error(display = "issuer {} is not an eligible member", 0)]
    BadIssuer(Fingerprint),

    /// A keychange inside the block is invalid.
    #[error(display = "bad keychange: {}", 0)]
    BadKeychange(KeychangeError),

    /// The block contains a keychange kind that carries no validation
    /// rules yet (`Leaver`, `Back`).
    #[error(display = "keychange kind is not implemented")]
    NotImplementedKeychange,

    /// Malformed or unverifiable cryptographic material.
    #[error(display = "bad crypto: {}", 0)]
    BadCrypto(fidem::Error),

    /// Applying the block would leave the web of trust unstable.
    #[error(display = "web of trust would become unstable around {}", 0)]
    WoTUnstable(Fingerprint),

    /// The block's exclusions do not match the computed kicked set.
    #[error(display = "exclusions do not match the kicked set ({})", 0)]
    BadKickSet(Fingerprint),

    /// The members changes are unsorted, unbacked or inconsistent.
    #[error(display = "members changes are incoherent")]
    BadMembersChanges,

    /// The exact block is already part of the chain.
    #[error(display = "block was already applied")]
    AlreadySeen,

    /// The proof-of-work search was cancelled by an incoming block.
    #[error(display = "proof of work was cancelled")]
    PowCancelled,

    /// The block store failed.
    #[error(display = "{}", 0)]
    Storage(#[error(from)] block_storage::Error),
}

impl From<KeychangeError> for Error {
    fn from(err: KeychangeError) -> Self {
        match err {
            KeychangeError::NotImplemented => Self::NotImplementedKeychange,
            KeychangeError::Crypto(err) => Self::BadCrypto(err),
            other => Self::BadKeychange(other),
        }
    }
}

impl From<fidem::Error> for Error {
    fn from(err: fidem::Error) -> Self {
        Self::BadCrypto(err)
    }
}
