mod common;

use common::*;
use fidem::{armor, dearmor, normalize_dos, Packet, KEY_LABEL};
use geflecht::keyblock::{members_root, BlockHash, MembersChange};

#[test]
fn members_root_is_order_independent() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");

    let one = [a.fingerprint(), b.fingerprint(), c.fingerprint()];
    let other = [c.fingerprint(), a.fingerprint(), b.fingerprint()];
    assert_eq!(members_root(one.iter()), members_root(other.iter()));

    // the root is sensitive to the set
    assert_ne!(
        members_root(one.iter()),
        members_root(one[..2].iter())
    );

    // SHA-1 of the empty string
    let empty: [fidem::Fingerprint; 0] = [];
    assert_eq!(
        members_root(empty.iter()),
        "da39a3ee5e6b4b0d3255bfef95601890afd80709"
    );
}

#[test]
fn members_changes_sort_joins_before_leaves() {
    let low = "0000000000000000000000000000000000000001"
        .parse()
        .unwrap();
    let high = "ffffffffffffffffffffffffffffffffffffff00"
        .parse()
        .unwrap();

    let mut changes = vec![
        MembersChange::Leave(low),
        MembersChange::Join(high),
        MembersChange::Join(low),
    ];
    changes.sort();
    assert_eq!(
        changes,
        vec![
            MembersChange::Join(low),
            MembersChange::Join(high),
            MembersChange::Leave(low),
        ]
    );
    assert_eq!(
        changes[0].to_string(),
        format!("+{}", low)
    );
    assert_eq!(
        changes[2].to_string(),
        format!("-{}", low)
    );
}

#[test]
fn block_hash_counts_leading_zero_digits() {
    let hash: BlockHash = "00f0000000000000000000000000000000000001"
        .parse()
        .unwrap();
    assert_eq!(hash.leading_zeros(), 2);

    let none: BlockHash = "f000000000000000000000000000000000000000"
        .parse()
        .unwrap();
    assert_eq!(none.leading_zeros(), 0);

    let five: BlockHash = "00000f0000000000000000000000000000000000"
        .parse()
        .unwrap();
    assert_eq!(five.leading_zeros(), 5);
}

#[test]
fn armor_survives_line_ending_changes() {
    let a = member("ALICE");
    let packets = vec![
        Packet::PrimaryKey(a.identity.public_key().clone()),
        Packet::UserId(a.uid.clone()),
        Packet::SelfCertification(a.identity.self_certify(&a.uid)),
    ];
    let armored = armor(KEY_LABEL, &packets).unwrap();

    let dos = normalize_dos(&armored);
    assert_ne!(armored, dos);
    assert_eq!(dearmor(&armored).unwrap(), packets);
    assert_eq!(dearmor(&dos).unwrap(), packets);
    assert_eq!(normalize_dos(&dos), dos);
}

#[test]
fn sealing_fixes_the_block_hash() {
    let a = member("ALICE");
    let mut block = make_block(None, a.fingerprint(), 1_600_000_000, &[], vec![], vec![]);
    let raw = block.raw();

    // the raw form is deterministic
    assert_eq!(raw, block.raw());
    assert!(raw.ends_with(&format!("Issuer: {}\n", a.fingerprint())));

    let signature = a.identity.sign_data(raw.as_bytes());
    block.seal(signature.clone());
    assert_eq!(block.hash.unwrap(), block.hash_with(&signature));

    // any change to the raw form changes the hash
    block.nonce += 1;
    assert_ne!(block.hash.unwrap(), block.hash_with(&signature));
}
