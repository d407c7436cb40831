//! The `Keychain` service: the node's block submission, lookup and
//! generation surface.

use crate::{
    block_applier::BlockApplier,
    block_builder::{BlockBuilder, InteractiveFilter, NewcomerFilter, PassThroughFilter},
    block_checker::{expected_zeros, BlockCheck},
    block_storage::BlockStorage,
    config::Config,
    error::Error,
    keyblock::{BlockNumber, Keyblock, Membership},
    membership_pool::{MembershipPool, PoolEntry, PoolError},
    pow::PowEngine,
    world_state::{WorldState, WorldStateService},
};
use fidem::{Fingerprint, Identity, Signed};
use std::sync::Arc;

/// One keychain node: an identity, the stores and the derived state,
/// glued to the proof-of-work engine.
pub struct Keychain {
    identity: Identity,
    config: Config,
    block_storage: BlockStorage,
    world_state: WorldStateService,
    pool: MembershipPool,
    pow: Arc<PowEngine>,
    applier: BlockApplier,
    builder: BlockBuilder,
}

impl Keychain {
    /// Wire up a node from its identity, configuration and block storage.
    #[must_use]
    pub fn new(identity: Identity, config: Config, block_storage: BlockStorage) -> Self {
        let world_state = WorldStateService::new();
        let pool = MembershipPool::new(config.currency.clone());
        let applier = BlockApplier::new(
            block_storage.clone(),
            world_state.clone(),
            pool.clone(),
            config.protocol.clone(),
        );
        let builder = BlockBuilder::new(
            world_state.clone(),
            block_storage.clone(),
            pool.clone(),
            config.protocol.clone(),
            config.currency.clone(),
            identity.fingerprint(),
        );
        Self {
            identity,
            config,
            block_storage,
            world_state,
            pool,
            pow: Arc::new(PowEngine::new()),
            applier,
            builder,
        }
    }

    /// The fingerprint this node signs with.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.identity.fingerprint()
    }

    /// A snapshot of the derived state.
    #[must_use]
    pub fn world_state(&self) -> WorldState {
        self.world_state.get()
    }

    /// Rebuild the derived state by replaying the persisted chain from
    /// genesis. Returns the number of replayed blocks.
    pub async fn restore(&self) -> Result<usize, Error> {
        let blocks: Vec<Keyblock> = self.block_storage.read(..).collect::<Result<_, _>>()?;

        let mut state = WorldState::default();
        let mut tip = None;
        let mut replayed = 0;
        for block in blocks {
            let mut check = BlockCheck::resume(
                state,
                tip,
                self.block_storage.clone(),
                self.config.protocol.clone(),
            );
            check.verify_and_apply(&block, false)?;
            tip = check.tip().clone();
            state = check.into_state();
            replayed += 1;
        }

        let mut writable = self.world_state.get_writable().await;
        *writable = state;
        writable.save();
        Ok(replayed)
    }

    /// Validate and apply a block. A running proof-of-work search is
    /// cancelled first and resumed afterwards.
    pub async fn submit_key_block(&self, block: Keyblock) -> Result<Keyblock, Error> {
        self.pow.interrupt().await;
        let result = self.applier.apply(&block, true).await;
        self.pow.resume();
        result
    }

    /// Store a membership declaration, optionally with the key material
    /// backing it.
    pub fn submit_membership(
        &self,
        membership: Signed<Membership>,
        key: Option<String>,
    ) -> Result<PoolEntry, PoolError> {
        self.pool.submit(membership, key)
    }

    /// Store fresh key material of an existing member for the next
    /// updates-only block.
    pub fn submit_key_material(&self, fingerprint: Fingerprint, armored: String) {
        self.pool.submit_key_material(fingerprint, armored);
    }

    /// The current tip.
    pub fn current(&self) -> Result<Option<Keyblock>, Error> {
        Ok(self.block_storage.current()?)
    }

    /// The applied block of a given number.
    pub fn promoted(&self, number: BlockNumber) -> Result<Option<Keyblock>, Error> {
        Ok(self.block_storage.find_by_number(number)?)
    }

    /// Build the next block from pending key updates.
    pub fn generate_next(&self) -> Result<Keyblock, Error> {
        self.builder.update_block()
    }

    /// Build the next block carrying nothing but due exclusions.
    pub fn generate_empty_next(&self) -> Result<Keyblock, Error> {
        self.builder.empty_block()
    }

    /// Build the next block from pending newcomers, asking the operator
    /// which ones to include.
    pub fn generate_newcomers(&self) -> Result<Keyblock, Error> {
        self.builder.newcomer_block(&InteractiveFilter::default())
    }

    /// Build the next block from all pending newcomers.
    pub fn generate_newcomers_auto(&self) -> Result<Keyblock, Error> {
        self.builder.newcomer_block(&PassThroughFilter::default())
    }

    /// Build the next block from pending newcomers chosen by `filter`.
    pub fn generate_newcomers_with(
        &self,
        filter: &dyn NewcomerFilter,
    ) -> Result<Keyblock, Error> {
        self.builder.newcomer_block(filter)
    }

    /// Seal a block with this node's identity and at least `zeros`
    /// leading zero hex digits.
    pub async fn prove(&self, block: Keyblock, zeros: u32) -> Result<Keyblock, Error> {
        self.pow.prove(block, &self.identity, zeros).await
    }

    /// The proof-of-work difficulty this node faces for a given block
    /// number.
    pub fn expected_zeros_for(&self, number: BlockNumber) -> Result<u32, Error> {
        let issuer_last = self
            .block_storage
            .last_of_issuer_before(self.fingerprint(), number)?;
        Ok(expected_zeros(
            &self.config.protocol,
            issuer_last.as_ref(),
            number,
            self.world_state.get().members.len(),
        ))
    }

    /// One generation round: build a candidate from all pending
    /// newcomers and search its proof.
    ///
    /// Returns `None` when participation is disabled or the search was
    /// cancelled by an incoming block.
    pub async fn start_generation(&self) -> Result<Option<Keyblock>, Error> {
        if !self.config.participate {
            return Ok(None);
        }
        let block = self.generate_newcomers_auto()?;
        let zeros = self.expected_zeros_for(block.number)?;
        match self.prove(block, zeros).await {
            Ok(block) => Ok(Some(block)),
            Err(Error::PowCancelled) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Wait until the chain moved on and generation is worth restarting.
    pub async fn wait_resume(&self) {
        self.pow.wait_resume().await;
    }
}
