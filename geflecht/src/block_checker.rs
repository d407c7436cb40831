//! Orchestrated validation of one candidate block.
//!
//! A `BlockChecker` hands out `BlockCheck`s: a consistent snapshot of the
//! world state and the tip. `verify_and_apply` runs every check against
//! the snapshot and, on success, applies the block to it. The caller
//! commits the snapshot as a whole; a failed check leaves no trace.

use crate::{
    block_storage::BlockStorage,
    config::Protocol,
    error::{ChainingFault, Error},
    keyblock::{members_root, BlockNumber, Keyblock, Keychange, MembersChange},
    keychange_checker::{collect_new_links, KeychangeChecker},
    world_state::{Link, TrustedKey, WorldState, WorldStateService},
    wot::{check_stability, still_failing, ExtraLinks, Reachability, MAX_STEPS},
};
use chrono::Utc;
use fidem::{dearmor, Fingerprint, KeyMaterial, Packet, PublicKey, Signature};
use im::OrdSet;
use std::collections::BTreeSet;

/// Validates candidate blocks against the current state.
#[derive(Debug, Clone)]
pub struct BlockChecker {
    world_state: WorldStateService,
    block_storage: BlockStorage,
    protocol: Protocol,
}

impl BlockChecker {
    /// Create a new `BlockChecker` instance.
    #[must_use]
    pub fn new(
        world_state: WorldStateService,
        block_storage: BlockStorage,
        protocol: Protocol,
    ) -> Self {
        Self {
            world_state,
            block_storage,
            protocol,
        }
    }

    /// Take a consistent snapshot to validate one block against.
    pub fn check(&self) -> Result<BlockCheck, Error> {
        Ok(BlockCheck {
            state: self.world_state.get(),
            tip: self.block_storage.current()?,
            block_storage: self.block_storage.clone(),
            protocol: self.protocol.clone(),
        })
    }
}

/// One validation pass over a snapshot of the world state.
#[derive(Debug)]
pub struct BlockCheck {
    state: WorldState,
    tip: Option<Keyblock>,
    block_storage: BlockStorage,
    protocol: Protocol,
}

impl BlockCheck {
    /// Start a check from an explicit state and tip, without storage
    /// lookups beyond the issuer index. Used by chain replay.
    #[must_use]
    pub fn resume(
        state: WorldState,
        tip: Option<Keyblock>,
        block_storage: BlockStorage,
        protocol: Protocol,
    ) -> Self {
        Self {
            state,
            tip,
            block_storage,
            protocol,
        }
    }

    /// The snapshot's tip.
    #[must_use]
    pub const fn tip(&self) -> &Option<Keyblock> {
        &self.tip
    }

    /// The snapshot's state (the post-block state once a block applied).
    #[must_use]
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// Extract the state.
    #[allow(clippy::missing_const_for_fn)]
    #[must_use]
    pub fn into_state(self) -> WorldState {
        self.state
    }

    /// Verify a block against the snapshot and apply it on success.
    ///
    /// `online` enables the wall clock window check; replayed blocks skip
    /// it. Any error leaves the snapshot in its pre-block state.
    pub fn verify_and_apply(&mut self, block: &Keyblock, online: bool) -> Result<(), Error> {
        self.check_chaining(block)?;
        if online {
            self.check_timestamp(block)?;
        }
        self.check_pow(block)?;
        self.check_issuer(block)?;

        let new_links = {
            let mut checker = KeychangeChecker::new(&self.state);
            checker.index_newcomers(&block.keys_changes)?;
            self.check_signature(block, &checker)?;
            collect_new_links(&checker, &block.keys_changes)?
        };

        self.check_wot_stability(block, &new_links)?;
        self.check_kick_set(block, &new_links)?;
        self.check_members_changes(block)?;

        self.apply(block, &new_links)
    }

    fn check_chaining(&self, block: &Keyblock) -> Result<(), Error> {
        let tip = match &self.tip {
            None => {
                return if block.number.is_root() {
                    Ok(())
                } else {
                    Err(Error::BadChaining(ChainingFault::RequiresRoot))
                };
            }
            Some(tip) => tip,
        };

        if block.number <= tip.number {
            if let Some(stored) = self.block_storage.find_by_number(block.number)? {
                if stored.hash == block.hash {
                    return Err(Error::AlreadySeen);
                }
            }
            return Err(Error::BadChaining(ChainingFault::TooLate));
        }
        if block.number > tip.number + 1 {
            return Err(Error::BadChaining(ChainingFault::TooEarly));
        }
        if block.previous_hash != tip.hash {
            return Err(Error::BadChaining(ChainingFault::BadPrevHash));
        }
        if block.previous_issuer != Some(tip.issuer) {
            return Err(Error::BadChaining(ChainingFault::BadPrevIssuer));
        }
        Ok(())
    }

    fn check_timestamp(&self, block: &Keyblock) -> Result<(), Error> {
        if (Utc::now().timestamp() - block.timestamp).abs() > self.protocol.ts_interval {
            return Err(Error::BadTimestamp);
        }
        Ok(())
    }

    fn check_pow(&self, block: &Keyblock) -> Result<(), Error> {
        let signature = block.signature.as_ref().ok_or(Error::UnsealedBlock)?;
        let hash = block.hash.ok_or(Error::UnsealedBlock)?;
        if block.hash_with(signature) != hash {
            return Err(Error::BadPoW);
        }

        let issuer_last = self
            .block_storage
            .last_of_issuer_before(block.issuer, block.number)?;
        let zeros = expected_zeros(
            &self.protocol,
            issuer_last.as_ref(),
            block.number,
            self.state.members.len(),
        );
        if hash.leading_zeros() < zeros {
            return Err(Error::BadPoW);
        }
        Ok(())
    }

    fn check_issuer(&self, block: &Keyblock) -> Result<(), Error> {
        if block.number.is_root() {
            // the root block's issuer must be among its own joiners
            if !block.joiners().any(|joiner| joiner == block.issuer) {
                return Err(Error::BadIssuer(block.issuer));
            }
        } else if !self.state.is_member(block.issuer) {
            return Err(Error::BadIssuer(block.issuer));
        }
        Ok(())
    }

    // The block signature must verify against the issuer's primary key,
    // which for a root block may be declared in the block itself.
    fn check_signature(
        &self,
        block: &Keyblock,
        checker: &KeychangeChecker,
    ) -> Result<(), Error> {
        let signature = block.signature.as_ref().ok_or(Error::UnsealedBlock)?;
        let issuer_key = self.issuer_key(block, checker)?;
        issuer_key.verify(block.raw().as_bytes(), signature)?;
        Ok(())
    }

    fn issuer_key(
        &self,
        block: &Keyblock,
        checker: &KeychangeChecker,
    ) -> Result<PublicKey, Error> {
        if let Some(material) = checker.new_key(block.issuer) {
            return Ok(material.primary.clone());
        }
        match self.state.trusted_key(block.issuer) {
            Some(trusted) => Ok(KeyMaterial::from_armored(&trusted.packets)?.primary),
            None => Err(Error::BadIssuer(block.issuer)),
        }
    }

    fn check_wot_stability(&self, block: &Keyblock, new_links: &ExtraLinks) -> Result<(), Error> {
        let after = self.members_after(block);
        let joiners: Vec<Fingerprint> = block.joiners().collect();
        check_stability(&self.state, new_links, &joiners, &after, self.protocol.sig_qty)
            .map_err(Error::WoTUnstable)
    }

    fn check_kick_set(&self, block: &Keyblock, new_links: &ExtraLinks) -> Result<(), Error> {
        let leavers: BTreeSet<Fingerprint> = block.leavers().collect();
        let after = self.members_after(block);

        for member in self.state.members() {
            let row = self.state.key_row(member);
            let flagged = row.kick || !row.distanced.is_empty();
            let excluded = leavers.contains(&member);

            if !flagged {
                if excluded {
                    return Err(Error::BadKickSet(member));
                }
                continue;
            }

            // recompute with the block's links: does the member still fail?
            let mut candidates = after.clone();
            candidates.remove(&member);
            let failing = still_failing(
                &self.state,
                member,
                new_links,
                &candidates,
                self.protocol.sig_qty,
            );
            if failing != excluded {
                return Err(Error::BadKickSet(member));
            }
        }
        Ok(())
    }

    fn check_members_changes(&self, block: &Keyblock) -> Result<(), Error> {
        for pair in block.members_changes.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::BadMembersChanges);
            }
        }

        let joiners: BTreeSet<Fingerprint> = block.joiners().collect();
        let leavers: BTreeSet<Fingerprint> = block.leavers().collect();

        let mut newcomers = BTreeSet::new();
        for keychange in &block.keys_changes {
            if let Keychange::Newcomer(newcomer) = keychange {
                if !newcomers.insert(newcomer.fingerprint) {
                    return Err(Error::BadMembersChanges);
                }
            }
        }
        if joiners != newcomers {
            return Err(Error::BadMembersChanges);
        }

        for joiner in &joiners {
            if self.state.is_member(*joiner) {
                return Err(Error::BadMembersChanges);
            }
        }
        for leaver in &leavers {
            if !self.state.is_member(*leaver) {
                return Err(Error::BadMembersChanges);
            }
        }

        let after = self.members_after(block);
        if block.members_count != after.len() as u64
            || block.members_root != members_root(after.iter())
        {
            return Err(Error::BadMembersChanges);
        }
        Ok(())
    }

    // C6 on the snapshot: flip members, store keys, append links, expire
    // links, recompute the kicked set.
    fn apply(&mut self, block: &Keyblock, new_links: &ExtraLinks) -> Result<(), Error> {
        for change in &block.members_changes {
            match change {
                MembersChange::Join(fpr) => self.state.add_member(*fpr),
                MembersChange::Leave(fpr) => self.state.remove_member(*fpr),
            }
        }

        for keychange in &block.keys_changes {
            match keychange {
                Keychange::Newcomer(newcomer) => {
                    let mut material = KeyMaterial::from_armored(&newcomer.keypackets)?;
                    material.certifications =
                        certification_packets(&newcomer.certpackets)?;
                    self.state.save_trusted_key(TrustedKey {
                        fingerprint: newcomer.fingerprint,
                        key_id: newcomer.fingerprint.key_id(),
                        uid: material.user_id.clone(),
                        packets: material.armored()?,
                    });
                }
                Keychange::Update(update) => {
                    let trusted = match self.state.trusted_key(update.fingerprint) {
                        Some(trusted) => trusted.clone(),
                        None => continue,
                    };
                    let mut material = KeyMaterial::from_armored(&trusted.packets)?;

                    // new subkeys merge behind the existing ones
                    if !update.keypackets.is_empty() {
                        for packet in dearmor(&update.keypackets)? {
                            match packet {
                                Packet::Subkey(key) => material.subkeys.push(key),
                                Packet::SubkeyBinding(sig) => {
                                    material.subkey_bindings.push(sig);
                                }
                                _ => {}
                            }
                        }
                    }

                    // new certifications splice in right after the self
                    // certification, before everything already there
                    let mut certifications =
                        certification_packets(&update.certpackets)?;
                    certifications.append(&mut material.certifications);
                    material.certifications = certifications;

                    self.state.save_trusted_key(TrustedKey {
                        packets: material.armored()?,
                        ..trusted
                    });
                }
                Keychange::Leaver(_) | Keychange::Back(_) => {}
            }
        }

        for (target, sources) in new_links {
            for source in sources {
                self.state.add_link(Link {
                    source: *source,
                    target: *target,
                    timestamp: block.timestamp,
                    obsolete: false,
                });
            }
        }

        self.state
            .obsolete_links(block.timestamp - self.protocol.sig_validity);
        self.recompute_kicked();

        self.tip = Some(block.clone());
        Ok(())
    }

    fn recompute_kicked(&mut self) {
        let reach = Reachability::new(&self.state, &ExtraLinks::new());
        let members = self.state.members();
        for member in &members {
            let distanced = reach.not_reached_within(*member, members.iter(), MAX_STEPS);
            let shortage = self.state.valid_link_count(*member) < self.protocol.sig_qty;
            if distanced.is_empty() && !shortage {
                self.state.unset_kicked(*member);
            } else {
                self.state.set_kicked(
                    *member,
                    distanced.into_iter().collect::<OrdSet<Fingerprint>>(),
                    shortage,
                );
            }
        }
    }

    fn members_after(&self, block: &Keyblock) -> BTreeSet<Fingerprint> {
        let mut after: BTreeSet<Fingerprint> = self.state.members.iter().copied().collect();
        for joiner in block.joiners() {
            after.insert(joiner);
        }
        for leaver in block.leavers() {
            after.remove(&leaver);
        }
        after
    }
}

fn certification_packets(certpackets: &str) -> Result<Vec<Signature>, Error> {
    if certpackets.is_empty() {
        return Ok(Vec::new());
    }
    let mut certifications = Vec::new();
    for packet in dearmor(certpackets)? {
        if let Packet::Certification(cert) = packet {
            certifications.push(cert);
        }
    }
    Ok(certifications)
}

/// The number of leading zero hex digits a block of `number` by this
/// issuer must carry.
///
/// An issuer who signed the previous block pays a penalty of one zero per
/// zero above the floor it last produced, decaying by one for every
/// period waited since.
#[must_use]
pub fn expected_zeros(
    protocol: &Protocol,
    issuer_last: Option<&Keyblock>,
    number: BlockNumber,
    members_count: usize,
) -> u32 {
    let floor = i64::from(protocol.pow_zero_min);
    let (last_number, last_hash) = match issuer_last {
        Some(last) => match last.hash {
            Some(hash) => (last.number, hash),
            None => return protocol.pow_zero_min,
        },
        None => return protocol.pow_zero_min,
    };

    let penalty = i64::from(last_hash.leading_zeros()) - floor + 1;
    let period = if protocol.pow_period_c {
        protocol.pow_period
    } else {
        protocol.pow_period * members_count as u64 / 100
    }
    .max(1);
    let waited = (number - last_number) / period;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        (floor + penalty - waited as i64).max(floor) as u32
    }
}
