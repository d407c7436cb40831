mod common;

use common::*;
use geflecht::{
    block_storage::BlockStorage,
    keyblock::{BlockNumber, Keychange, Leaver, MembersChange},
    ChainingFault, Error,
};
use std::{sync::Arc, time::Duration};

#[tokio::test]
async fn genesis_with_three_founders() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let node = node(a.identity.clone());

    let genesis = bootstrap(&node, &[&a, &b, &c]).await;

    assert_eq!(genesis.number, BlockNumber::default());
    assert_eq!(genesis.members_count, 3);
    assert!(genesis.hash.unwrap().leading_zeros() >= 1);

    let state = node.world_state();
    assert_eq!(state.members().len(), 3);
    for founder in &[&a, &b, &c] {
        assert!(state.is_member(founder.fingerprint()));
        // each founder is certified by the two others
        assert_eq!(state.links_to(founder.fingerprint()).len(), 2);
        assert!(!state.key_row(founder.fingerprint()).kick);
    }

    // the pool no longer holds the materialized memberships
    let leftover = node.generate_newcomers_auto().unwrap();
    assert!(leftover.members_changes.is_empty());
}

#[tokio::test]
async fn newcomer_with_mutual_links() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let d = member("DAVE");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;

    // D enters certified by A and B, certifying A and B back
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();
    let mut block = make_block(
        Some(&genesis),
        b.fingerprint(),
        now(),
        &members,
        vec![MembersChange::Join(d.fingerprint())],
        vec![
            newcomer(&d, &[certification(&a, &d), certification(&b, &d)], now()),
            update(a.fingerprint(), &[certification(&d, &a)]),
            update(b.fingerprint(), &[certification(&d, &b)]),
        ],
    );
    seal(&mut block, &b.identity, 1);
    let applied = node.submit_key_block(block).await.unwrap();

    assert_eq!(applied.previous_hash, genesis.hash);
    assert_eq!(applied.number, genesis.number + 1);

    let state = node.world_state();
    assert!(state.is_member(d.fingerprint()));
    let mut expected = vec![a.fingerprint(), b.fingerprint()];
    expected.sort();
    assert_eq!(state.links_to(d.fingerprint()), expected);
    assert!(state.links_to(a.fingerprint()).contains(&d.fingerprint()));
    assert!(state.links_to(b.fingerprint()).contains(&d.fingerprint()));
}

#[tokio::test]
async fn rejects_undercertified_newcomer() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let e = member("ERIN");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let before = node.world_state();

    // a single certification is below sig_qty = 2
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();
    let mut block = make_block(
        Some(&genesis),
        b.fingerprint(),
        now(),
        &members,
        vec![MembersChange::Join(e.fingerprint())],
        vec![newcomer(&e, &[certification(&a, &e)], now())],
    );
    seal(&mut block, &b.identity, 1);

    match node.submit_key_block(block).await {
        Err(Error::WoTUnstable(offender)) => assert_eq!(offender, e.fingerprint()),
        other => panic!("expected WoTUnstable, got {:?}", other.map(|b| b.number)),
    }

    // rejection is a no-op
    assert_eq!(node.world_state(), before);
    assert_eq!(node.current().unwrap().unwrap().number, genesis.number);
}

#[tokio::test]
async fn rejects_block_skipping_ahead() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;

    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();
    let mut block = make_block(Some(&genesis), b.fingerprint(), now(), &members, vec![], vec![]);
    block.number = BlockNumber::from(5);
    seal(&mut block, &b.identity, 1);

    match node.submit_key_block(block).await {
        Err(Error::BadChaining(ChainingFault::TooEarly)) => {}
        other => panic!("expected TooEarly, got {:?}", other.map(|b| b.number)),
    }
}

#[tokio::test]
async fn rejects_stale_duplicate_and_forked_blocks() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();

    // the exact applied block comes back: already seen, state unchanged
    let before = node.world_state();
    match node.submit_key_block(genesis.clone()).await {
        Err(Error::AlreadySeen) => {}
        other => panic!("expected AlreadySeen, got {:?}", other.map(|b| b.number)),
    }
    assert_eq!(node.world_state(), before);

    // a different block with an applied number is late
    let mut fork = make_block(None, b.fingerprint(), now(), &[], vec![], vec![]);
    seal(&mut fork, &b.identity, 1);
    match node.submit_key_block(fork).await {
        Err(Error::BadChaining(ChainingFault::TooLate)) => {}
        other => panic!("expected TooLate, got {:?}", other.map(|b| b.number)),
    }

    // a next block pointing at the wrong previous hash
    let mut wrong = make_block(Some(&genesis), b.fingerprint(), now(), &members, vec![], vec![]);
    wrong.previous_hash =
        Some("ffffffffffffffffffffffffffffffffffffffff".parse().unwrap());
    seal(&mut wrong, &b.identity, 1);
    match node.submit_key_block(wrong).await {
        Err(Error::BadChaining(ChainingFault::BadPrevHash)) => {}
        other => panic!("expected BadPrevHash, got {:?}", other.map(|b| b.number)),
    }
}

#[tokio::test]
async fn expired_links_force_kicks() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();

    // a block applying exactly one validity later obsoletes every link
    let late = genesis.timestamp + SIG_VALIDITY;
    let mut aging = make_block(Some(&genesis), b.fingerprint(), late, &members, vec![], vec![]);
    seal(&mut aging, &b.identity, 1);
    let aging = node.submit_key_block(aging).await.unwrap();

    let state = node.world_state();
    for fpr in &members {
        assert!(state.key_row(*fpr).kick, "{} should be flagged", fpr);
    }

    // the next block must exclude the flagged members
    let mut ignoring = make_block(Some(&aging), c.fingerprint(), late + 10, &members, vec![], vec![]);
    seal(&mut ignoring, &c.identity, 1);
    match node.submit_key_block(ignoring).await {
        Err(Error::BadKickSet(_)) => {}
        other => panic!("expected BadKickSet, got {:?}", other.map(|b| b.number)),
    }

    // a block whose only effect is the exclusion is valid
    let changes = members.iter().map(|fpr| MembersChange::Leave(*fpr)).collect();
    let mut kicking = make_block(Some(&aging), c.fingerprint(), late + 10, &members, changes, vec![]);
    seal(&mut kicking, &c.identity, 1);
    let kicking = node.submit_key_block(kicking).await.unwrap();

    assert_eq!(kicking.members_count, 0);
    assert!(node.world_state().members().is_empty());
}

#[tokio::test]
async fn competing_block_cancels_proof_search() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let node = Arc::new(node(a.identity.clone()));
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();

    // an effectively endless search for this node's own next block
    let candidate = node.generate_empty_next().unwrap();
    let searcher = {
        let node = node.clone();
        tokio::spawn(async move { node.prove(candidate, 10).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // a competing valid block arrives from a peer
    let mut peer_block = make_block(Some(&genesis), b.fingerprint(), now(), &members, vec![], vec![]);
    seal(&mut peer_block, &b.identity, 1);
    node.submit_key_block(peer_block).await.unwrap();

    match searcher.await.unwrap() {
        Err(Error::PowCancelled) => {}
        other => panic!("expected PowCancelled, got {:?}", other.map(|b| b.number)),
    }
    let tip = node.current().unwrap().unwrap();
    assert_eq!(tip.number, genesis.number + 1);
    assert_eq!(tip.issuer, b.fingerprint());
}

#[tokio::test]
async fn rejects_reserved_keychange_kinds() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();

    let mut block = make_block(
        Some(&genesis),
        b.fingerprint(),
        now(),
        &members,
        vec![],
        vec![Keychange::Leaver(Leaver {
            fingerprint: a.fingerprint(),
        })],
    );
    seal(&mut block, &b.identity, 1);

    match node.submit_key_block(block).await {
        Err(Error::NotImplementedKeychange) => {}
        other => panic!(
            "expected NotImplementedKeychange, got {:?}",
            other.map(|b| b.number)
        ),
    }
}

#[tokio::test]
async fn genesis_issuer_must_join_itself() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let d = member("DAVE");
    let node = node(a.identity.clone());

    let mut block = make_block(
        None,
        a.fingerprint(),
        now(),
        &[],
        vec![
            MembersChange::Join(b.fingerprint()),
            MembersChange::Join(c.fingerprint()),
            MembersChange::Join(d.fingerprint()),
        ],
        vec![
            newcomer(&b, &[certification(&c, &b), certification(&d, &b)], now()),
            newcomer(&c, &[certification(&b, &c), certification(&d, &c)], now()),
            newcomer(&d, &[certification(&b, &d), certification(&c, &d)], now()),
        ],
    );
    seal(&mut block, &a.identity, 1);

    match node.submit_key_block(block).await {
        Err(Error::BadIssuer(issuer)) => assert_eq!(issuer, a.fingerprint()),
        other => panic!("expected BadIssuer, got {:?}", other.map(|b| b.number)),
    }
}

#[tokio::test]
async fn update_splices_new_certifications() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let d = member("DAVE");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;

    // D joins first (certified by A and B)
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();
    let mut join = make_block(
        Some(&genesis),
        b.fingerprint(),
        now(),
        &members,
        vec![MembersChange::Join(d.fingerprint())],
        vec![
            newcomer(&d, &[certification(&a, &d), certification(&b, &d)], now()),
            update(a.fingerprint(), &[certification(&d, &a)]),
            update(b.fingerprint(), &[certification(&d, &b)]),
        ],
    );
    seal(&mut join, &b.identity, 1);
    node.submit_key_block(join).await.unwrap();

    // C certifies D afterwards, via fresh key material for D
    node.submit_key_material(
        d.fingerprint(),
        full_key(
            &d,
            &[
                certification(&a, &d),
                certification(&b, &d),
                certification(&c, &d),
            ],
        ),
    );
    let block = node.generate_next().unwrap();
    assert!(block.members_changes.is_empty());
    assert_eq!(block.keys_changes.len(), 1);

    let zeros = node.expected_zeros_for(block.number).unwrap();
    let block = node.prove(block, zeros).await.unwrap();
    node.submit_key_block(block).await.unwrap();

    let sources = node.world_state().links_to(d.fingerprint());
    assert_eq!(sources.len(), 3);
    assert!(sources.contains(&c.fingerprint()));
}

#[tokio::test]
async fn replay_reproduces_the_same_state() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let storage = BlockStorage::temporary().unwrap();
    let node = node_with_storage(a.identity.clone(), storage.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;

    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();
    let mut block = make_block(Some(&genesis), b.fingerprint(), now(), &members, vec![], vec![]);
    seal(&mut block, &b.identity, 1);
    node.submit_key_block(block).await.unwrap();

    // a sibling over the same storage replays to the identical state
    let replica = node_with_storage(a.identity.clone(), storage);
    assert_eq!(replica.restore().await.unwrap(), 2);
    assert_eq!(replica.world_state(), node.world_state());

    // chain invariants hold for the whole stored chain
    let mut previous: Option<geflecht::keyblock::Keyblock> = None;
    for number in 0..=1_u64 {
        let block = node.promoted(BlockNumber::from(number)).unwrap().unwrap();
        assert!(block.hash.unwrap().leading_zeros() >= 1);
        if let Some(previous) = previous {
            assert_eq!(block.previous_hash, previous.hash);
            assert_eq!(block.number, previous.number + 1);
        }
        previous = Some(block);
    }
}

#[tokio::test]
async fn sibling_node_accepts_proven_block() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let d = member("DAVE");
    let minter = node(a.identity.clone());
    let sibling = node(b.identity.clone());

    let genesis = bootstrap(&minter, &[&a, &b, &c]).await;
    sibling.submit_key_block(genesis).await.unwrap();

    // D asks to join, certified by A and B and certifying them back
    minter
        .submit_membership(
            membership(&d, now()),
            Some(full_key(
                &d,
                &[certification(&a, &d), certification(&b, &d)],
            )),
        )
        .unwrap();
    minter.submit_key_material(
        a.fingerprint(),
        full_key(
            &a,
            &[
                certification(&b, &a),
                certification(&c, &a),
                certification(&d, &a),
            ],
        ),
    );
    minter.submit_key_material(
        b.fingerprint(),
        full_key(
            &b,
            &[
                certification(&a, &b),
                certification(&c, &b),
                certification(&d, &b),
            ],
        ),
    );

    let block = minter.generate_newcomers_auto().unwrap();
    assert_eq!(
        block.members_changes,
        vec![MembersChange::Join(d.fingerprint())]
    );
    let zeros = minter.expected_zeros_for(block.number).unwrap();
    let block = minter.prove(block, zeros).await.unwrap();

    minter.submit_key_block(block.clone()).await.unwrap();
    sibling.submit_key_block(block).await.unwrap();

    assert_eq!(minter.world_state(), sibling.world_state());
    assert!(sibling.world_state().is_member(d.fingerprint()));
}

#[tokio::test]
async fn smuggled_packets_are_rejected() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let e = member("ERIN");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();

    // key packets carrying third-party certifications are smuggling
    let mut keychange = newcomer(&e, &[certification(&a, &e), certification(&b, &e)], now());
    if let Keychange::Newcomer(newcomer) = &mut keychange {
        newcomer.keypackets = full_key(&e, &[certification(&a, &e)]);
    }
    let mut block = make_block(
        Some(&genesis),
        b.fingerprint(),
        now(),
        &members,
        vec![MembersChange::Join(e.fingerprint())],
        vec![keychange],
    );
    seal(&mut block, &b.identity, 1);

    match node.submit_key_block(block).await {
        Err(Error::BadKeychange(_)) => {}
        other => panic!("expected BadKeychange, got {:?}", other.map(|b| b.number)),
    }
}

#[tokio::test]
async fn certification_packets_must_come_from_known_keys() {
    let a = member("ALICE");
    let b = member("BOB");
    let c = member("CARA");
    let e = member("ERIN");
    let stranger = member("XENO");
    let node = node(a.identity.clone());
    let genesis = bootstrap(&node, &[&a, &b, &c]).await;
    let members: Vec<_> = [&a, &b, &c].iter().map(|m| m.fingerprint()).collect();

    let mut block = make_block(
        Some(&genesis),
        b.fingerprint(),
        now(),
        &members,
        vec![MembersChange::Join(e.fingerprint())],
        vec![newcomer(
            &e,
            &[certification(&a, &e), certification(&stranger, &e)],
            now(),
        )],
    );
    seal(&mut block, &b.identity, 1);

    match node.submit_key_block(block).await {
        Err(Error::BadKeychange(_)) => {}
        other => panic!("expected BadKeychange, got {:?}", other.map(|b| b.number)),
    }
}

#[tokio::test]
async fn membership_pool_is_idempotent() {
    let a = member("ALICE");
    let b = member("BOB");
    let node = node(a.identity.clone());

    let declaration = membership(&b, now());
    let key = full_key(&b, &[]);
    node.submit_membership(declaration.clone(), Some(key.clone()))
        .unwrap();
    let again = node.submit_membership(declaration, Some(key)).unwrap();
    assert!(again.eligible);

    // a fresh declaration supersedes the first one
    let newer = membership(&b, now() + 60);
    let entry = node.submit_membership(newer, None).unwrap();
    assert!(entry.eligible);
}
