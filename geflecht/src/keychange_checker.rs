//! Validation of the keychanges inside a candidate block.
//!
//! A `KeychangeChecker` first indexes the decoded keys of every newcomer
//! declared in the block, then checks each keychange against the current
//! state and that index. Certifier discovery resolves a certification's
//! issuer key id either to a co-newcomer of the same block or to the
//! trusted key of a current member.

use crate::{
    keyblock::{Keychange, MembershipKind, Newcomer, Update},
    world_state::WorldState,
};
use err_derive::Error;
use fidem::{
    armor, dearmor, is_valid_udid2, normalize_dos, verify_certification, Fingerprint, KeyId,
    KeyMaterial, Packet, PublicKey,
};
use std::collections::BTreeMap;

/// An error of the `keychange_checker` module.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeychangeError {
    /// Malformed or undecodable cryptographic material.
    #[error(display = "{}", 0)]
    Crypto(#[error(from)] fidem::Error),

    /// `Leaver` and `Back` keychanges carry no validation rules yet.
    #[error(display = "keychange kind is not implemented")]
    NotImplemented,

    /// A newcomer keychange without key packets.
    #[error(display = "newcomer without key packets")]
    MissingKeypackets,

    /// The declared fingerprint is not the fingerprint of the key.
    #[error(display = "fingerprint does not match the key packets")]
    FingerprintMismatch,

    /// The newcomer's user id is not a valid `udid2`.
    #[error(display = "user id is not a valid udid2")]
    NotUdid2,

    /// The membership's user id differs from the key's user id packet.
    #[error(display = "membership user id does not match the key")]
    UserIdMismatch,

    /// A newcomer whose membership is not a JOIN.
    #[error(display = "newcomer membership is not a join")]
    NotAJoin,

    /// The membership was not issued by the newcomer key.
    #[error(display = "membership is not signed by the newcomer key")]
    BadMembershipSignature,

    /// The key packets do not recompose to the enumerated packet subset.
    #[error(display = "key packets carry foreign or reordered packets")]
    SmuggledPackets,

    /// Update key packets may only carry subkeys and subkey bindings.
    #[error(display = "update key packets carry more than subkeys")]
    ForeignKeypackets,

    /// Certification packets may only carry certifications.
    #[error(display = "certification packets carry foreign packets")]
    ForeignCertpackets,

    /// A certification whose issuer is neither a co-newcomer nor a
    /// trusted key.
    #[error(display = "unknown certifier {}", 0)]
    UnknownCertifier(KeyId),

    /// A certification issued by a known key that is not a member.
    #[error(display = "certifier {} is not a member", 0)]
    CertifierNotMember(Fingerprint),

    /// A key certifying itself.
    #[error(display = "{} certifies itself", 0)]
    SelfCertifier(Fingerprint),

    /// A certification that does not verify against the certified key.
    #[error(display = "invalid certification by {}", 0)]
    BadCertification(Fingerprint),

    /// An update keychange for a key that is not a member.
    #[error(display = "update for non-member {}", 0)]
    NotAMember(Fingerprint),

    /// An update keychange changing nothing.
    #[error(display = "update without subkeys or certifications")]
    EmptyUpdate,
}

/// Checks the keychanges of one candidate block against a state snapshot.
pub struct KeychangeChecker<'a> {
    state: &'a WorldState,
    new_keys: BTreeMap<Fingerprint, KeyMaterial>,
}

impl<'a> KeychangeChecker<'a> {
    /// Create a checker over a state snapshot.
    #[must_use]
    pub fn new(state: &'a WorldState) -> Self {
        Self {
            state,
            new_keys: BTreeMap::new(),
        }
    }

    /// Decode and index the key material of every newcomer in the block.
    ///
    /// Must run before any `check` call, certifier discovery relies on it.
    pub fn index_newcomers(&mut self, keys_changes: &[Keychange]) -> Result<(), KeychangeError> {
        for keychange in keys_changes {
            if let Keychange::Newcomer(newcomer) = keychange {
                if newcomer.keypackets.is_empty() {
                    return Err(KeychangeError::MissingKeypackets);
                }
                let material = KeyMaterial::from_armored(&newcomer.keypackets)?;
                if material.fingerprint() != newcomer.fingerprint {
                    return Err(KeychangeError::FingerprintMismatch);
                }
                self.new_keys.insert(newcomer.fingerprint, material);
            }
        }
        Ok(())
    }

    /// The decoded key of a newcomer declared in this block.
    #[must_use]
    pub fn new_key(&self, fingerprint: Fingerprint) -> Option<&KeyMaterial> {
        self.new_keys.get(&fingerprint)
    }

    /// Check one keychange. Returns the certifier fingerprints discovered
    /// in its certification packets.
    pub fn check(&self, keychange: &Keychange) -> Result<Vec<Fingerprint>, KeychangeError> {
        match keychange {
            Keychange::Newcomer(newcomer) => self.check_newcomer(newcomer),
            Keychange::Update(update) => self.check_update(update),
            Keychange::Leaver(_) | Keychange::Back(_) => Err(KeychangeError::NotImplemented),
        }
    }

    fn check_newcomer(&self, newcomer: &Newcomer) -> Result<Vec<Fingerprint>, KeychangeError> {
        // indexed by index_newcomers, so decoding already succeeded
        let material = self
            .new_keys
            .get(&newcomer.fingerprint)
            .ok_or(KeychangeError::MissingKeypackets)?;

        if !is_valid_udid2(&material.user_id) {
            return Err(KeychangeError::NotUdid2);
        }
        material.verify_self_certified()?;

        let declaration = newcomer.membership.unverified_ref();
        if declaration.membership != MembershipKind::In {
            return Err(KeychangeError::NotAJoin);
        }
        if declaration.userid != material.user_id {
            return Err(KeychangeError::UserIdMismatch);
        }
        if declaration.issuer != newcomer.fingerprint
            || newcomer.membership.signer() != &material.primary
            || newcomer.membership.verify_ref().is_err()
        {
            return Err(KeychangeError::BadMembershipSignature);
        }

        // The key packets may carry nothing but the enumerated subset in
        // canonical order. Third-party certifications travel separately.
        if !material.certifications.is_empty() {
            return Err(KeychangeError::SmuggledPackets);
        }
        let recomposed = armor(fidem::KEY_LABEL, &material.recompose())?;
        if normalize_dos(&recomposed) != normalize_dos(&newcomer.keypackets) {
            return Err(KeychangeError::SmuggledPackets);
        }

        self.check_certifications(
            &newcomer.certpackets,
            newcomer.fingerprint,
            &material.user_id,
            &material.primary,
        )
    }

    fn check_update(&self, update: &Update) -> Result<Vec<Fingerprint>, KeychangeError> {
        if !self.state.is_member(update.fingerprint) {
            return Err(KeychangeError::NotAMember(update.fingerprint));
        }
        let trusted = self
            .state
            .trusted_key(update.fingerprint)
            .ok_or(KeychangeError::NotAMember(update.fingerprint))?;
        if update.keypackets.is_empty() && update.certpackets.is_empty() {
            return Err(KeychangeError::EmptyUpdate);
        }

        if !update.keypackets.is_empty() {
            for packet in dearmor(&update.keypackets)? {
                match packet {
                    Packet::Subkey(_) | Packet::SubkeyBinding(_) => {}
                    _ => return Err(KeychangeError::ForeignKeypackets),
                }
            }
        }

        if update.certpackets.is_empty() {
            return Ok(Vec::new());
        }
        let material = KeyMaterial::from_armored(&trusted.packets)?;
        self.check_certifications(
            &update.certpackets,
            update.fingerprint,
            &material.user_id,
            &material.primary,
        )
    }

    // Validate armored certification packets over a certified key and
    // resolve every issuer to a fingerprint.
    fn check_certifications(
        &self,
        certpackets: &str,
        certified: Fingerprint,
        certified_uid: &str,
        certified_key: &PublicKey,
    ) -> Result<Vec<Fingerprint>, KeychangeError> {
        if certpackets.is_empty() {
            return Ok(Vec::new());
        }

        let mut certifiers = Vec::new();
        for packet in dearmor(certpackets)? {
            let cert = match packet {
                Packet::Certification(cert) => cert,
                _ => return Err(KeychangeError::ForeignCertpackets),
            };
            let (certifier, certifier_key) = self.resolve_certifier(cert.issuer())?;
            if certifier == certified {
                return Err(KeychangeError::SelfCertifier(certifier));
            }
            verify_certification(&certifier_key, certified_uid, certified_key, &cert)
                .map_err(|_| KeychangeError::BadCertification(certifier))?;
            if !certifiers.contains(&certifier) {
                certifiers.push(certifier);
            }
        }
        Ok(certifiers)
    }

    // A certifier is a co-newcomer of this block or a current member with
    // a trusted key.
    fn resolve_certifier(
        &self,
        issuer: KeyId,
    ) -> Result<(Fingerprint, PublicKey), KeychangeError> {
        for (fingerprint, material) in &self.new_keys {
            if material.key_id() == issuer {
                return Ok((*fingerprint, material.primary.clone()));
            }
        }
        if let Some(trusted) = self.state.trusted_key_by_key_id(issuer) {
            if !self.state.is_member(trusted.fingerprint) {
                return Err(KeychangeError::CertifierNotMember(trusted.fingerprint));
            }
            let material = KeyMaterial::from_armored(&trusted.packets)?;
            return Ok((trusted.fingerprint, material.primary));
        }
        Err(KeychangeError::UnknownCertifier(issuer))
    }
}

/// Run the checker over a whole block: newcomers first, then updates.
/// Returns the links the block adds, keyed by target.
pub fn collect_new_links(
    checker: &KeychangeChecker,
    keys_changes: &[Keychange],
) -> Result<crate::wot::ExtraLinks, KeychangeError> {
    let mut new_links = crate::wot::ExtraLinks::new();
    let newcomers_first = keys_changes
        .iter()
        .filter(|kc| matches!(kc, Keychange::Newcomer(_)))
        .chain(
            keys_changes
                .iter()
                .filter(|kc| !matches!(kc, Keychange::Newcomer(_))),
        );
    for keychange in newcomers_first {
        let certifiers = checker.check(keychange)?;
        let target = keychange.fingerprint();
        for certifier in certifiers {
            new_links.entry(target).or_default().insert(certifier);
        }
    }
    Ok(new_links)
}
