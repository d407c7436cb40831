//! Bounded reachability over the certification graph.
//!
//! Every query walks the union of the stored, non-obsolete links and the
//! *extra* links a candidate block would add. Adjacency is kept in ordered
//! maps and sources expand in lexicographic order, so results never depend
//! on insertion order.

use crate::world_state::WorldState;
use fidem::Fingerprint;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// The step limit of the web of trust: every member must reach every other
/// member within this many certification hops.
pub const MAX_STEPS: usize = 3;

/// Links a candidate block would add, keyed by target.
pub type ExtraLinks = BTreeMap<Fingerprint, BTreeSet<Fingerprint>>;

/// A reachability view over stored links plus a block's extra links.
#[derive(Debug)]
pub struct Reachability {
    forward: BTreeMap<Fingerprint, BTreeSet<Fingerprint>>,
    reverse: BTreeMap<Fingerprint, BTreeSet<Fingerprint>>,
}

impl Reachability {
    /// Build the view. Obsolete stored links are excluded.
    #[must_use]
    pub fn new(state: &WorldState, extra: &ExtraLinks) -> Self {
        let mut forward: BTreeMap<Fingerprint, BTreeSet<Fingerprint>> = BTreeMap::new();
        let mut reverse: BTreeMap<Fingerprint, BTreeSet<Fingerprint>> = BTreeMap::new();

        let mut add = |source: Fingerprint, target: Fingerprint| {
            forward.entry(source).or_default().insert(target);
            reverse.entry(target).or_default().insert(source);
        };

        for (target, links) in &state.links {
            for link in links {
                if !link.obsolete {
                    add(link.source, *target);
                }
            }
        }
        for (target, sources) in extra {
            for source in sources {
                add(*source, *target);
            }
        }

        Self { forward, reverse }
    }

    /// Everyone `from` reaches within `max_steps` hops, `from` included.
    #[must_use]
    pub fn reached_within(&self, from: Fingerprint, max_steps: usize) -> BTreeSet<Fingerprint> {
        bounded_bfs(&self.forward, from, max_steps)
    }

    /// Everyone who reaches `to` within `max_steps` hops, `to` included.
    #[must_use]
    pub fn reaching_within(&self, to: Fingerprint, max_steps: usize) -> BTreeSet<Fingerprint> {
        bounded_bfs(&self.reverse, to, max_steps)
    }

    /// Whether a certification path of at most `max_steps` hops leads from
    /// `src` to `dst`.
    #[must_use]
    pub fn path_within(&self, src: Fingerprint, dst: Fingerprint, max_steps: usize) -> bool {
        src == dst || self.reached_within(src, max_steps).contains(&dst)
    }

    /// The subset of `candidates` that `src` does *not* reach within
    /// `max_steps` hops.
    #[must_use]
    pub fn not_reached_within<'a, I>(
        &self,
        src: Fingerprint,
        candidates: I,
        max_steps: usize,
    ) -> BTreeSet<Fingerprint>
    where
        I: IntoIterator<Item = &'a Fingerprint>,
    {
        let reached = self.reached_within(src, max_steps);
        candidates
            .into_iter()
            .filter(|candidate| **candidate != src && !reached.contains(candidate))
            .copied()
            .collect()
    }
}

/// The distinct valid certifiers of `target`: stored non-obsolete links
/// plus a block's extra links, never counting the target itself.
#[must_use]
pub fn certifier_sources(
    state: &WorldState,
    target: Fingerprint,
    extra: &ExtraLinks,
) -> BTreeSet<Fingerprint> {
    let mut sources: BTreeSet<Fingerprint> = state.links_to(target).into_iter().collect();
    if let Some(added) = extra.get(&target) {
        sources.extend(added.iter().copied());
    }
    sources.remove(&target);
    sources
}

/// Verify that a set of joiners keeps the web of trust stable: every
/// joiner carries at least `sig_qty` certifications (the extra links
/// count) and is mutually reachable with every other post-block member
/// within [`MAX_STEPS`]. Returns the first offending fingerprint.
pub fn check_stability(
    state: &WorldState,
    extra: &ExtraLinks,
    joiners: &[Fingerprint],
    members_after: &BTreeSet<Fingerprint>,
    sig_qty: usize,
) -> Result<(), Fingerprint> {
    let reach = Reachability::new(state, extra);
    for &joiner in joiners {
        if certifier_sources(state, joiner, extra).len() < sig_qty {
            return Err(joiner);
        }
        let reached = reach.reached_within(joiner, MAX_STEPS);
        let reaching = reach.reaching_within(joiner, MAX_STEPS);
        for member in members_after {
            if *member != joiner && (!reached.contains(member) || !reaching.contains(member)) {
                return Err(joiner);
            }
        }
    }
    Ok(())
}

/// Whether a flagged member would still be failing after the extra links
/// apply: still out-distanced from one of `candidates`, or still short of
/// `sig_qty` certifiers.
#[must_use]
pub fn still_failing(
    state: &WorldState,
    member: Fingerprint,
    extra: &ExtraLinks,
    candidates: &BTreeSet<Fingerprint>,
    sig_qty: usize,
) -> bool {
    let reach = Reachability::new(state, extra);
    let distanced = !reach
        .not_reached_within(member, candidates.iter(), MAX_STEPS)
        .is_empty();
    distanced || certifier_sources(state, member, extra).len() < sig_qty
}

fn bounded_bfs(
    adjacency: &BTreeMap<Fingerprint, BTreeSet<Fingerprint>>,
    start: Fingerprint,
    max_steps: usize,
) -> BTreeSet<Fingerprint> {
    let mut seen = BTreeSet::new();
    seen.insert(start);
    let mut frontier = VecDeque::new();
    frontier.push_back((start, 0));

    while let Some((node, depth)) = frontier.pop_front() {
        if depth == max_steps {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            for &neighbor in next {
                if seen.insert(neighbor) {
                    frontier.push_back((neighbor, depth + 1));
                }
            }
        }
    }
    seen
}
