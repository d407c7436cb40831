//! The derived state of the keychain: members, trusted keys and
//! certification links.

#![allow(clippy::module_name_repetitions)]

mod keys;
mod links;

pub use keys::{KeyRow, TrustedKey};
pub use links::Link;

use fidem::{Fingerprint, KeyId};
use im::{OrdMap, OrdSet, Vector};
use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Struct holding a `WorldState` mutex and its single writer permit.
#[derive(Debug, Clone)]
#[must_use]
pub struct WorldStateService {
    world_state: Arc<Mutex<WorldState>>,
    writer: Arc<Semaphore>,
}

impl Default for WorldStateService {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldStateService {
    /// Create a new `WorldStateService` initialized with a given `world_state`.
    pub fn with_world_state(world_state: WorldState) -> Self {
        Self {
            world_state: Arc::new(world_state.into()),
            writer: Arc::new(Semaphore::new(1)),
        }
    }

    /// Create a new, empty `WorldStateService`.
    pub fn new() -> Self {
        Self::with_world_state(WorldState::default())
    }

    /// Return a copy of the entire `WorldState`.
    #[must_use]
    pub fn get(&self) -> WorldState {
        self.world_state.lock().unwrap().clone()
    }

    /// Return a writable copy of the `WorldState`, holding the single
    /// writer permit until it is saved or dropped.
    pub async fn get_writable(&self) -> WritableWorldState {
        let permit = self.writer.clone().acquire_owned().await;
        WritableWorldState {
            shared_world_state: self.world_state.clone(),
            world_state: self.world_state.lock().unwrap().clone(),
            permit,
        }
    }
}

/// A writable copy of the `WorldState`. Can be edited and later `save`d to
/// the global `WorldState`.
#[derive(Debug)]
#[must_use]
pub struct WritableWorldState {
    shared_world_state: Arc<Mutex<WorldState>>,
    world_state: WorldState,
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl WritableWorldState {
    /// Save the changed `WorldState`.
    pub fn save(self) {
        *self.shared_world_state.lock().unwrap() = self.world_state;
    }
}

impl Deref for WritableWorldState {
    type Target = WorldState;
    fn deref(&self) -> &Self::Target {
        &self.world_state
    }
}

impl DerefMut for WritableWorldState {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.world_state
    }
}

/// The state derived from the applied chain: the member set, per-key
/// flags, trusted key material and the certification graph.
///
/// All collections are persistent maps, cloning the whole state is cheap.
/// Validation always works on such a clone and commits it back as a whole.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorldState {
    /// The current member set.
    pub members: OrdSet<Fingerprint>,
    /// Flags per fingerprint ever seen.
    pub keys: OrdMap<Fingerprint, KeyRow>,
    /// Authoritative key material per member fingerprint.
    pub trusted_keys: OrdMap<Fingerprint, TrustedKey>,
    /// Certification links, keyed by target fingerprint.
    pub links: OrdMap<Fingerprint, Vector<Link>>,
}

impl WorldState {
    /// Whether a fingerprint is currently a member.
    #[must_use]
    pub fn is_member(&self, fingerprint: Fingerprint) -> bool {
        self.members.contains(&fingerprint)
    }

    /// The sorted member set.
    #[must_use]
    pub fn members(&self) -> Vec<Fingerprint> {
        self.members.iter().copied().collect()
    }

    /// Make a fingerprint a member, clearing any kick state.
    pub fn add_member(&mut self, fingerprint: Fingerprint) {
        self.members.insert(fingerprint);
        let row = self.key_row_mut(fingerprint);
        row.member = true;
        row.kick = false;
        row.link_shortage = false;
        row.distanced = OrdSet::new();
    }

    /// Remove a fingerprint from the member set, clearing the kick flag.
    pub fn remove_member(&mut self, fingerprint: Fingerprint) {
        self.members.remove(&fingerprint);
        let row = self.key_row_mut(fingerprint);
        row.member = false;
        row.kick = false;
    }

    fn key_row_mut(&mut self, fingerprint: Fingerprint) -> &mut KeyRow {
        if !self.keys.contains_key(&fingerprint) {
            self.keys.insert(fingerprint, KeyRow::default());
        }
        self.keys.get_mut(&fingerprint).unwrap()
    }

    /// The flags of a fingerprint, defaults if never seen.
    #[must_use]
    pub fn key_row(&self, fingerprint: Fingerprint) -> KeyRow {
        self.keys.get(&fingerprint).cloned().unwrap_or_default()
    }

    /// Flag a member for exclusion by the next block.
    pub fn set_kicked(
        &mut self,
        fingerprint: Fingerprint,
        distanced: OrdSet<Fingerprint>,
        link_shortage: bool,
    ) {
        let row = self.key_row_mut(fingerprint);
        row.kick = true;
        row.distanced = distanced;
        row.link_shortage = link_shortage;
    }

    /// Clear the exclusion flag of a member.
    pub fn unset_kicked(&mut self, fingerprint: Fingerprint) {
        let row = self.key_row_mut(fingerprint);
        row.kick = false;
        row.distanced = OrdSet::new();
        row.link_shortage = false;
    }

    /// All members currently flagged for exclusion.
    #[must_use]
    pub fn to_be_kicked(&self) -> Vec<Fingerprint> {
        self.members
            .iter()
            .filter(|fpr| {
                let row = self.keys.get(fpr);
                row.map_or(false, |row| row.kick || !row.distanced.is_empty())
            })
            .copied()
            .collect()
    }

    /// The trusted key of a fingerprint, if any.
    #[must_use]
    pub fn trusted_key(&self, fingerprint: Fingerprint) -> Option<&TrustedKey> {
        self.trusted_keys.get(&fingerprint)
    }

    /// Find a trusted key by the key id a signature names as its issuer.
    #[must_use]
    pub fn trusted_key_by_key_id(&self, key_id: KeyId) -> Option<&TrustedKey> {
        self.trusted_keys
            .values()
            .find(|trusted| trusted.key_id == key_id)
    }

    /// Insert or replace a trusted key.
    pub fn save_trusted_key(&mut self, trusted: TrustedKey) {
        self.trusted_keys.insert(trusted.fingerprint, trusted);
    }

    /// The distinct sources of current, non-obsolete links to `target`,
    /// sorted ascending.
    #[must_use]
    pub fn links_to(&self, target: Fingerprint) -> Vec<Fingerprint> {
        let mut sources: Vec<Fingerprint> = self
            .links
            .get(&target)
            .into_iter()
            .flat_map(|links| links.iter())
            .filter(|link| !link.obsolete)
            .map(|link| link.source)
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// The number of distinct valid certifiers of `target`.
    #[must_use]
    pub fn valid_link_count(&self, target: Fingerprint) -> usize {
        self.links_to(target).len()
    }

    /// Append a certification link.
    pub fn add_link(&mut self, link: Link) {
        if !self.links.contains_key(&link.target) {
            self.links.insert(link.target, Vector::new());
        }
        self.links.get_mut(&link.target).unwrap().push_back(link);
    }

    /// Flag every link minted at or before `cutoff` as obsolete.
    ///
    /// A link aged exactly the validity is already obsolete.
    pub fn obsolete_links(&mut self, cutoff: i64) {
        let keys: Vec<_> = self.links.keys().cloned().collect();
        for key in keys {
            if let Some(links) = self.links.get_mut(&key) {
                for link in links.iter_mut() {
                    if link.timestamp <= cutoff {
                        link.obsolete = true;
                    }
                }
            }
        }
    }
}
