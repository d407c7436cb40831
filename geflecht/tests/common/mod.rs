#![allow(dead_code)]

use fidem::{armor, Fingerprint, Identity, Packet, Signable, Signed, CERT_LABEL, KEY_LABEL};
use geflecht::{
    block_storage::BlockStorage,
    config::{Config, Protocol},
    keyblock::{
        members_root, BlockNumber, Keyblock, Keychange, Membership, MembershipKind,
        MembersChange, Newcomer, Update,
    },
    keychain::Keychain,
};
use std::collections::BTreeSet;

pub const CURRENCY: &str = "testnet";
pub const SIG_VALIDITY: i64 = 2_629_800;

/// A test identity with a `udid2` user id.
pub struct Member {
    pub identity: Identity,
    pub uid: String,
}

impl Member {
    pub fn fingerprint(&self) -> Fingerprint {
        self.identity.fingerprint()
    }
}

pub fn member(first_name: &str) -> Member {
    let identity = Identity::generate();
    let uid = format!("udid2;c;DOE;{};1980-01-01;e+47.47+000.56;0;", first_name);
    Member { identity, uid }
}

pub fn protocol() -> Protocol {
    Protocol {
        sig_qty: 2,
        sig_validity: SIG_VALIDITY,
        pow_zero_min: 1,
        pow_period: 1,
        pow_period_c: true,
        // effectively no clock window, tests craft their own timestamps
        ts_interval: 1_000_000_000,
    }
}

pub fn config() -> Config {
    Config {
        currency: CURRENCY.to_string(),
        data_dir: String::new(),
        identity_file: String::new(),
        participate: true,
        protocol: protocol(),
    }
}

pub fn node(identity: Identity) -> Keychain {
    node_with_storage(identity, BlockStorage::temporary().unwrap())
}

pub fn node_with_storage(identity: Identity, storage: BlockStorage) -> Keychain {
    Keychain::new(identity, config(), storage)
}

pub fn certification(from: &Member, to: &Member) -> Packet {
    Packet::Certification(from.identity.certify(&to.uid, to.identity.public_key()))
}

fn base_packets(member: &Member) -> Vec<Packet> {
    vec![
        Packet::PrimaryKey(member.identity.public_key().clone()),
        Packet::UserId(member.uid.clone()),
        Packet::SelfCertification(member.identity.self_certify(&member.uid)),
    ]
}

/// The armored key of a member without third-party certifications.
pub fn keypackets(member: &Member) -> String {
    armor(KEY_LABEL, &base_packets(member)).unwrap()
}

/// The armored key of a member carrying third-party certifications, the
/// form key material travels in when submitted to the pool.
pub fn full_key(member: &Member, certs: &[Packet]) -> String {
    let mut packets = base_packets(member);
    packets.extend(certs.iter().cloned());
    armor(KEY_LABEL, &packets).unwrap()
}

pub fn certpackets(certs: &[Packet]) -> String {
    if certs.is_empty() {
        String::new()
    } else {
        armor(CERT_LABEL, certs).unwrap()
    }
}

pub fn membership(member: &Member, date: i64) -> Signed<Membership> {
    Membership {
        currency: CURRENCY.to_string(),
        issuer: member.fingerprint(),
        membership: MembershipKind::In,
        userid: member.uid.clone(),
        date,
    }
    .sign(&member.identity)
    .unwrap()
}

pub fn newcomer(member: &Member, certs: &[Packet], date: i64) -> Keychange {
    Keychange::Newcomer(Newcomer {
        fingerprint: member.fingerprint(),
        keypackets: keypackets(member),
        certpackets: certpackets(certs),
        membership: membership(member, date),
    })
}

pub fn update(fingerprint: Fingerprint, certs: &[Packet]) -> Keychange {
    Keychange::Update(Update {
        fingerprint,
        keypackets: String::new(),
        certpackets: certpackets(certs),
    })
}

/// Assemble an unsealed block on top of `tip`.
pub fn make_block(
    tip: Option<&Keyblock>,
    issuer: Fingerprint,
    timestamp: i64,
    prev_members: &[Fingerprint],
    changes: Vec<MembersChange>,
    keys_changes: Vec<Keychange>,
) -> Keyblock {
    let mut after: BTreeSet<Fingerprint> = prev_members.iter().copied().collect();
    for change in &changes {
        match change {
            MembersChange::Join(fpr) => {
                after.insert(*fpr);
            }
            MembersChange::Leave(fpr) => {
                after.remove(fpr);
            }
        }
    }
    let mut changes = changes;
    changes.sort();

    Keyblock {
        number: tip.map_or_else(BlockNumber::default, |tip| tip.number + 1),
        currency: CURRENCY.to_string(),
        previous_hash: tip.and_then(|tip| tip.hash),
        previous_issuer: tip.map(|tip| tip.issuer),
        timestamp,
        nonce: 0,
        issuer,
        members_root: members_root(after.iter()),
        members_count: after.len() as u64,
        members_changes: changes,
        keys_changes,
        signature: None,
        hash: None,
    }
}

/// Search a nonce and signature sealing `block` with enough zeros.
pub fn seal(block: &mut Keyblock, identity: &Identity, zeros: u32) {
    loop {
        let signature = identity.sign_data(block.raw().as_bytes());
        if block.hash_with(&signature).leading_zeros() >= zeros {
            block.seal(signature);
            return;
        }
        block.nonce += 1;
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Submit mutually certifying founders and mint the root block through
/// the builder and the proof-of-work engine. The node's identity must be
/// one of the founders.
pub async fn bootstrap(node: &Keychain, founders: &[&Member]) -> Keyblock {
    for founder in founders {
        let certs: Vec<Packet> = founders
            .iter()
            .filter(|other| other.fingerprint() != founder.fingerprint())
            .map(|other| certification(other, founder))
            .collect();
        node.submit_membership(membership(founder, now()), Some(full_key(founder, &certs)))
            .unwrap();
    }
    let block = node.generate_newcomers_auto().unwrap();
    let zeros = node.expected_zeros_for(block.number).unwrap();
    let block = node.prove(block, zeros).await.unwrap();
    node.submit_key_block(block).await.unwrap()
}
