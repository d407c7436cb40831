//! The pool of pending, signature-verified membership declarations.
//!
//! The pool is write-behind: it lives outside the block commit transaction
//! and every write is idempotent under the `(issuer, hash)` identity.

use crate::keyblock::{signed_hash, Membership};
use err_derive::Error;
use fidem::{Fingerprint, Signed};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

/// An error of the `membership_pool` module.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The declaration's signature does not verify.
    #[error(display = "invalid membership signature: {}", 0)]
    BadSignature(#[error(from)] fidem::Error),

    /// The signing key's fingerprint is not the declared issuer.
    #[error(display = "membership signer is not the declared issuer")]
    WrongIssuer,

    /// The declaration names another currency.
    #[error(display = "membership is for another currency")]
    WrongCurrency,
}

/// A pending membership with its pool flags.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    /// The signed declaration.
    pub membership: Signed<Membership>,
    /// Armored key material submitted along with the declaration, if any.
    pub key: Option<String>,
    /// Whether the entry is a candidate for the next block.
    pub eligible: bool,
    /// Whether the entry was forwarded to peers.
    pub propagated: bool,
}

#[derive(Debug, Default)]
struct Inner {
    // keyed by (issuer, membership hash)
    entries: BTreeMap<(Fingerprint, String), PoolEntry>,
    // armored key material waiting to be folded into an update keychange
    pending_keys: BTreeMap<Fingerprint, String>,
}

/// The shared membership pool.
#[derive(Debug, Clone)]
pub struct MembershipPool {
    currency: String,
    inner: Arc<Mutex<Inner>>,
}

impl MembershipPool {
    /// Create an empty pool for a given currency.
    #[must_use]
    pub fn new(currency: String) -> Self {
        Self {
            currency,
            inner: Arc::default(),
        }
    }

    /// Store a signed membership declaration.
    ///
    /// The signature is verified here; resubmitting the same declaration
    /// returns the stored entry unchanged. A newer declaration supersedes
    /// older ones of the same issuer.
    pub fn submit(
        &self,
        membership: Signed<Membership>,
        key: Option<String>,
    ) -> Result<PoolEntry, PoolError> {
        membership.verify_ref()?;
        let declaration = membership.unverified_ref();
        if declaration.currency != self.currency {
            return Err(PoolError::WrongCurrency);
        }
        if membership.signer().fingerprint() != declaration.issuer {
            return Err(PoolError::WrongIssuer);
        }

        let issuer = declaration.issuer;
        let hash = signed_hash(&membership);
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.entries.get(&(issuer, hash.clone())) {
            return Ok(existing.clone());
        }

        for ((entry_issuer, _), entry) in inner.entries.iter_mut() {
            if *entry_issuer == issuer {
                entry.eligible = false;
            }
        }

        let entry = PoolEntry {
            membership,
            key,
            eligible: true,
            propagated: false,
        };
        inner.entries.insert((issuer, hash), entry.clone());
        Ok(entry)
    }

    /// All entries that are candidates for the next block.
    #[must_use]
    pub fn find_eligible(&self) -> Vec<PoolEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|entry| entry.eligible)
            .cloned()
            .collect()
    }

    /// Look a pending membership up by its hash and issuer.
    #[must_use]
    pub fn get_for_hash_and_issuer(&self, hash: &str, issuer: Fingerprint) -> Option<PoolEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(&(issuer, hash.to_string()))
            .cloned()
    }

    /// Drop every pending entry of a fingerprint. Called after a block
    /// materialized (or excluded) the fingerprint.
    pub fn remove_for(&self, fingerprint: Fingerprint) {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<(Fingerprint, String)> = inner
            .entries
            .keys()
            .filter(|(issuer, _)| *issuer == fingerprint)
            .cloned()
            .collect();
        for key in keys {
            inner.entries.remove(&key);
        }
        inner.pending_keys.remove(&fingerprint);
    }

    /// Store fresh armored key material for an existing member, feeding
    /// the next updates-only block.
    pub fn submit_key_material(&self, fingerprint: Fingerprint, armored: String) {
        self.inner
            .lock()
            .unwrap()
            .pending_keys
            .insert(fingerprint, armored);
    }

    /// The pending key material, sorted by fingerprint.
    #[must_use]
    pub fn pending_key_material(&self) -> Vec<(Fingerprint, String)> {
        self.inner
            .lock()
            .unwrap()
            .pending_keys
            .iter()
            .map(|(fingerprint, armored)| (*fingerprint, armored.clone()))
            .collect()
    }
}
