//! Produces candidate blocks from the current state and the pending pool.
//!
//! Newcomer admission is iterated: candidates enter one by one and stay
//! only if the web of trust remains stable around them. Which candidates
//! are considered at all is a pluggable choice (`NewcomerFilter`).

use crate::{
    block_storage::BlockStorage,
    config::Protocol,
    error::Error,
    keyblock::{
        members_root, BlockNumber, Keyblock, Keychange, Membership, MembershipKind,
        MembersChange, Newcomer, Update,
    },
    membership_pool::MembershipPool,
    world_state::{WorldState, WorldStateService},
    wot::{check_stability, still_failing, ExtraLinks},
};
use chrono::Utc;
use dialoguer::{theme::ColorfulTheme, MultiSelect};
use fidem::{
    armor, is_valid_udid2, verify_certification, Fingerprint, KeyId, KeyMaterial, Packet,
    PublicKey, Signed, CERT_LABEL, KEY_LABEL,
};
use std::collections::BTreeSet;

/// A pending join that decodes cleanly and could enter the next block.
#[derive(Debug, Clone)]
pub struct NewcomerCandidate {
    /// The fingerprint of the joining key.
    pub fingerprint: Fingerprint,
    /// The candidate's user id.
    pub user_id: String,
    membership: Signed<Membership>,
    material: KeyMaterial,
}

/// Chooses which pending candidates to consider for the next block.
pub trait NewcomerFilter {
    /// Return the fingerprints to consider, a subset of `candidates`.
    fn select(&self, candidates: &[NewcomerCandidate]) -> Vec<Fingerprint>;
}

/// Considers every pending candidate.
#[derive(Debug, Default)]
pub struct PassThroughFilter;

impl NewcomerFilter for PassThroughFilter {
    fn select(&self, candidates: &[NewcomerCandidate]) -> Vec<Fingerprint> {
        candidates.iter().map(|c| c.fingerprint).collect()
    }
}

/// Asks the operator which candidates to include.
#[derive(Debug, Default)]
pub struct InteractiveFilter;

impl NewcomerFilter for InteractiveFilter {
    fn select(&self, candidates: &[NewcomerCandidate]) -> Vec<Fingerprint> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let labels: Vec<String> = candidates
            .iter()
            .map(|c| format!("{} ({})", c.user_id, c.fingerprint))
            .collect();
        let theme = ColorfulTheme::default();
        let mut newcomer_select = MultiSelect::with_theme(&theme);
        newcomer_select
            .with_prompt("Select newcomers to include:")
            .items(&labels);
        match newcomer_select.interact() {
            Ok(chosen) => chosen
                .into_iter()
                .map(|index| candidates[index].fingerprint)
                .collect(),
            Err(err) => {
                log::warn!("Newcomer selection failed: {}", err);
                Vec::new()
            }
        }
    }
}

/// Builds candidate blocks. The result is unsealed, the proof-of-work
/// engine seals it.
#[derive(Clone)]
pub struct BlockBuilder {
    world_state: WorldStateService,
    block_storage: BlockStorage,
    pool: MembershipPool,
    protocol: Protocol,
    currency: String,
    issuer: Fingerprint,
}

impl BlockBuilder {
    /// Create a new `BlockBuilder` instance.
    #[must_use]
    pub fn new(
        world_state: WorldStateService,
        block_storage: BlockStorage,
        pool: MembershipPool,
        protocol: Protocol,
        currency: String,
        issuer: Fingerprint,
    ) -> Self {
        Self {
            world_state,
            block_storage,
            pool,
            protocol,
            currency,
            issuer,
        }
    }

    /// Build a block admitting pending newcomers, chosen by `filter`.
    ///
    /// Pending key updates ride along: a joiner's own certifications over
    /// existing members arrive as update keychanges of the same block.
    pub fn newcomer_block(&self, filter: &dyn NewcomerFilter) -> Result<Keyblock, Error> {
        let state = self.world_state.get();
        let tip = self.block_storage.current()?;

        let candidates = self.candidates(&state);
        let selected = filter.select(&candidates);
        let considered: Vec<NewcomerCandidate> = candidates
            .into_iter()
            .filter(|c| selected.contains(&c.fingerprint))
            .collect();

        // Iterated admission: a candidate stays only if the web of trust
        // stays stable with everyone accepted so far. Certifiers resolve
        // against the whole considered set, co-signing groups enter
        // together or not at all.
        let mut accepted: Vec<NewcomerCandidate> = Vec::new();
        for candidate in &considered {
            accepted.push(candidate.clone());
            if !self.keeps_wot_stable(&state, &accepted, &considered)? {
                let dropped = accepted.pop().unwrap();
                log::info!(
                    "Leaving {} aside, the web of trust would not stay stable.",
                    dropped.fingerprint
                );
            }
        }

        // Only certifiers of the post-block set count in the final block;
        // prune everyone whose stability depended on a rejected candidate.
        while !accepted.is_empty() {
            let updates = self.pending_updates(&state, &accepted)?;
            let links = self.combined_links(&state, &accepted, &accepted, &updates);
            let joiners: Vec<Fingerprint> = accepted.iter().map(|c| c.fingerprint).collect();
            let kicked = self.kicked_under(&state, &links, &joiners);
            let after = members_after(&state, &joiners, &kicked);
            match check_stability(&state, &links, &joiners, &after, self.protocol.sig_qty) {
                Ok(()) => break,
                Err(offender) => {
                    log::info!(
                        "Leaving {} aside, its certifiers did not make it in.",
                        offender
                    );
                    accepted.retain(|c| c.fingerprint != offender);
                }
            }
        }

        let updates = self.pending_updates(&state, &accepted)?;
        self.assemble(&state, tip, &accepted, &updates)
    }

    /// Build a block carrying only key updates (and due exclusions).
    pub fn update_block(&self) -> Result<Keyblock, Error> {
        let state = self.world_state.get();
        let tip = self.block_storage.current()?;
        let updates = self.pending_updates(&state, &[])?;
        self.assemble(&state, tip, &[], &updates)
    }

    /// Build a block carrying nothing but the due exclusions.
    pub fn empty_block(&self) -> Result<Keyblock, Error> {
        let state = self.world_state.get();
        let tip = self.block_storage.current()?;
        self.assemble(&state, tip, &[], &[])
    }

    // Pending eligible joins whose key material decodes, carries a valid
    // udid2 and matches the declaration. Sorted by fingerprint.
    fn candidates(&self, state: &WorldState) -> Vec<NewcomerCandidate> {
        let mut candidates = Vec::new();
        for entry in self.pool.find_eligible() {
            let declaration = entry.membership.unverified_ref().clone();
            if declaration.membership != MembershipKind::In
                || state.is_member(declaration.issuer)
            {
                continue;
            }
            let armored = match &entry.key {
                Some(armored) => armored,
                None => continue,
            };
            let material = match KeyMaterial::from_armored(armored) {
                Ok(material) => material,
                Err(err) => {
                    log::warn!("Ignoring key material of {}: {}", declaration.issuer, err);
                    continue;
                }
            };
            if material.fingerprint() != declaration.issuer
                || !is_valid_udid2(&material.user_id)
                || material.user_id != declaration.userid
                || material.verify_self_certified().is_err()
            {
                continue;
            }
            candidates.push(NewcomerCandidate {
                fingerprint: declaration.issuer,
                user_id: material.user_id.clone(),
                membership: entry.membership,
                material,
            });
        }
        candidates.sort_by_key(|candidate| candidate.fingerprint);
        candidates
    }

    fn keeps_wot_stable(
        &self,
        state: &WorldState,
        trial: &[NewcomerCandidate],
        resolvers: &[NewcomerCandidate],
    ) -> Result<bool, Error> {
        let updates = self.pending_updates(state, resolvers)?;
        let links = self.combined_links(state, trial, resolvers, &updates);
        let joiners: Vec<Fingerprint> = trial.iter().map(|c| c.fingerprint).collect();
        let kicked = self.kicked_under(state, &links, &joiners);
        let after = members_after(state, &joiners, &kicked);
        Ok(check_stability(state, &links, &joiners, &after, self.protocol.sig_qty).is_ok())
    }

    // The links a trial set of newcomers would add: their certifications
    // whose issuer resolves to one of `resolvers` or a current member.
    fn admission_links(
        &self,
        state: &WorldState,
        trial: &[NewcomerCandidate],
        resolvers: &[NewcomerCandidate],
    ) -> ExtraLinks {
        let mut links = ExtraLinks::new();
        for candidate in trial {
            for cert in &candidate.material.certifications {
                if let Some((source, key)) = resolve_certifier(state, resolvers, cert.issuer()) {
                    if source != candidate.fingerprint
                        && verify_certification(
                            &key,
                            &candidate.user_id,
                            &candidate.material.primary,
                            cert,
                        )
                        .is_ok()
                    {
                        links.entry(candidate.fingerprint).or_default().insert(source);
                    }
                }
            }
        }
        links
    }

    fn combined_links(
        &self,
        state: &WorldState,
        trial: &[NewcomerCandidate],
        resolvers: &[NewcomerCandidate],
        updates: &[(Update, BTreeSet<Fingerprint>)],
    ) -> ExtraLinks {
        let mut links = self.admission_links(state, trial, resolvers);
        for (update, sources) in updates {
            links
                .entry(update.fingerprint)
                .or_default()
                .extend(sources.iter().copied());
        }
        links
    }

    // The flagged members that would still fail with the given links in
    // place. Kicking one member can out-distance another, so iterate to a
    // fixpoint (bounded by the member count).
    fn kicked_under(
        &self,
        state: &WorldState,
        links: &ExtraLinks,
        joiners: &[Fingerprint],
    ) -> BTreeSet<Fingerprint> {
        let mut baseline: BTreeSet<Fingerprint> = state.members.iter().copied().collect();
        baseline.extend(joiners.iter().copied());

        let flagged = state.to_be_kicked();
        let mut kicked = BTreeSet::new();
        for _ in 0..=flagged.len() {
            let mut next = BTreeSet::new();
            for member in &flagged {
                let mut candidates = baseline.clone();
                for gone in &kicked {
                    candidates.remove(gone);
                }
                candidates.remove(member);
                if still_failing(state, *member, links, &candidates, self.protocol.sig_qty) {
                    next.insert(*member);
                }
            }
            if next == kicked {
                break;
            }
            kicked = next;
        }
        kicked
    }

    // Key updates pending for current members: new subkeys and new
    // certifications from current members or the newcomers in `resolvers`.
    #[allow(clippy::type_complexity)]
    fn pending_updates(
        &self,
        state: &WorldState,
        resolvers: &[NewcomerCandidate],
    ) -> Result<Vec<(Update, BTreeSet<Fingerprint>)>, Error> {
        let mut updates = Vec::new();
        for (fingerprint, armored) in self.pool.pending_key_material() {
            if !state.is_member(fingerprint) {
                continue;
            }
            let trusted = match state.trusted_key(fingerprint) {
                Some(trusted) => trusted,
                None => continue,
            };
            let current = match KeyMaterial::from_armored(&trusted.packets) {
                Ok(material) => material,
                Err(_) => continue,
            };
            let submitted = match KeyMaterial::from_armored(&armored) {
                Ok(material) => material,
                Err(err) => {
                    log::warn!("Ignoring key material of {}: {}", fingerprint, err);
                    continue;
                }
            };
            if submitted.primary != current.primary {
                continue;
            }

            let mut key_packets = Vec::new();
            for (index, subkey) in submitted.subkeys.iter().enumerate() {
                if !current.subkeys.contains(subkey) {
                    key_packets.push(Packet::Subkey(subkey.clone()));
                    if let Some(binding) = submitted.subkey_bindings.get(index) {
                        key_packets.push(Packet::SubkeyBinding(binding.clone()));
                    }
                }
            }

            let mut cert_packets = Vec::new();
            let mut sources = BTreeSet::new();
            for cert in &submitted.certifications {
                if current.certifications.contains(cert) {
                    continue;
                }
                let (source, key) = match resolve_certifier(state, resolvers, cert.issuer()) {
                    Some(found) => found,
                    None => continue,
                };
                if source != fingerprint
                    && verify_certification(&key, &current.user_id, &current.primary, cert)
                        .is_ok()
                {
                    cert_packets.push(Packet::Certification(cert.clone()));
                    sources.insert(source);
                }
            }

            if key_packets.is_empty() && cert_packets.is_empty() {
                continue;
            }
            updates.push((
                Update {
                    fingerprint,
                    keypackets: optional_armor(KEY_LABEL, &key_packets)?,
                    certpackets: optional_armor(CERT_LABEL, &cert_packets)?,
                },
                sources,
            ));
        }
        Ok(updates)
    }

    fn assemble(
        &self,
        state: &WorldState,
        tip: Option<Keyblock>,
        newcomers: &[NewcomerCandidate],
        updates: &[(Update, BTreeSet<Fingerprint>)],
    ) -> Result<Keyblock, Error> {
        let links = self.combined_links(state, newcomers, newcomers, updates);
        let joiners: Vec<Fingerprint> = newcomers.iter().map(|c| c.fingerprint).collect();
        let kicked = self.kicked_under(state, &links, &joiners);
        let after = members_after(state, &joiners, &kicked);

        let mut members_changes: Vec<MembersChange> = joiners
            .iter()
            .map(|fpr| MembersChange::Join(*fpr))
            .chain(kicked.iter().map(|fpr| MembersChange::Leave(*fpr)))
            .collect();
        members_changes.sort();

        let mut keys_changes = Vec::new();
        for candidate in newcomers {
            // only certifications from post-block members make it in
            let retained: Vec<Packet> = candidate
                .material
                .certifications
                .iter()
                .filter(|cert| {
                    resolve_certifier(state, newcomers, cert.issuer()).map_or(
                        false,
                        |(source, key)| {
                            source != candidate.fingerprint
                                && after.contains(&source)
                                && verify_certification(
                                    &key,
                                    &candidate.user_id,
                                    &candidate.material.primary,
                                    cert,
                                )
                                .is_ok()
                        },
                    )
                })
                .cloned()
                .map(Packet::Certification)
                .collect();

            let mut base = candidate.material.clone();
            base.certifications = Vec::new();
            keys_changes.push(Keychange::Newcomer(Newcomer {
                fingerprint: candidate.fingerprint,
                keypackets: base.armored()?,
                certpackets: optional_armor(CERT_LABEL, &retained)?,
                membership: candidate.membership.clone(),
            }));
        }
        for (update, _) in updates {
            keys_changes.push(Keychange::Update(update.clone()));
        }

        let (number, previous_hash, previous_issuer) = match &tip {
            Some(tip) => (tip.number + 1, tip.hash, Some(tip.issuer)),
            None => (BlockNumber::default(), None, None),
        };

        Ok(Keyblock {
            number,
            currency: self.currency.clone(),
            previous_hash,
            previous_issuer,
            timestamp: Utc::now().timestamp(),
            nonce: 0,
            issuer: self.issuer,
            members_root: members_root(after.iter()),
            members_count: after.len() as u64,
            members_changes,
            keys_changes,
            signature: None,
            hash: None,
        })
    }
}

fn members_after(
    state: &WorldState,
    joiners: &[Fingerprint],
    kicked: &BTreeSet<Fingerprint>,
) -> BTreeSet<Fingerprint> {
    let mut after: BTreeSet<Fingerprint> = state.members.iter().copied().collect();
    after.extend(joiners.iter().copied());
    for gone in kicked {
        after.remove(gone);
    }
    after
}

// a certifier is a trial co-newcomer or a current member's trusted key
fn resolve_certifier(
    state: &WorldState,
    trial: &[NewcomerCandidate],
    issuer: KeyId,
) -> Option<(Fingerprint, PublicKey)> {
    for candidate in trial {
        if candidate.material.key_id() == issuer {
            return Some((candidate.fingerprint, candidate.material.primary.clone()));
        }
    }
    let trusted = state.trusted_key_by_key_id(issuer)?;
    if !state.is_member(trusted.fingerprint) {
        return None;
    }
    let material = KeyMaterial::from_armored(&trusted.packets).ok()?;
    Some((trusted.fingerprint, material.primary))
}

fn optional_armor(label: &str, packets: &[Packet]) -> Result<String, Error> {
    if packets.is_empty() {
        Ok(String::new())
    } else {
        Ok(armor(label, packets)?)
    }
}
