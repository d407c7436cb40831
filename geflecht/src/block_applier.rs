//! Applies validated blocks to storage and world state.
//!
//! Validation runs on a snapshot, outside the writer permit. The commit
//! re-checks the tip under the permit and then swaps in the whole
//! post-block state, so readers only ever observe block boundaries.

use crate::{
    block_checker::{BlockCheck, BlockChecker},
    block_storage::BlockStorage,
    config::Protocol,
    error::{ChainingFault, Error},
    keyblock::Keyblock,
    membership_pool::MembershipPool,
    world_state::WorldStateService,
};

/// Applies blocks to both the `BlockStorage` and the `WorldState`.
#[derive(Debug, Clone)]
pub struct BlockApplier {
    block_storage: BlockStorage,
    world_state: WorldStateService,
    pool: MembershipPool,
    checker: BlockChecker,
}

impl BlockApplier {
    /// Create a new `BlockApplier` instance.
    #[must_use]
    pub fn new(
        block_storage: BlockStorage,
        world_state: WorldStateService,
        pool: MembershipPool,
        protocol: Protocol,
    ) -> Self {
        let checker = BlockChecker::new(world_state.clone(), block_storage.clone(), protocol);
        Self {
            block_storage,
            world_state,
            pool,
            checker,
        }
    }

    /// Validate a block and, on success, commit it atomically.
    pub async fn apply(&self, block: &Keyblock, online: bool) -> Result<Keyblock, Error> {
        // validate against a snapshot, holding no lock
        let mut check = self.checker.check()?;
        let snapshot_tip = tip_identity(check.tip());
        check.verify_and_apply(block, online)?;

        self.commit(block, check, snapshot_tip).await?;

        // pool cleanup is write-behind, outside the commit
        for change in &block.members_changes {
            self.pool.remove_for(change.fingerprint());
        }

        log::info!(
            "Applied block {} by {} ({} members).",
            block.number,
            block.issuer,
            block.members_count
        );
        Ok(block.clone())
    }

    async fn commit(
        &self,
        block: &Keyblock,
        check: BlockCheck,
        snapshot_tip: Option<(u64, String)>,
    ) -> Result<(), Error> {
        let mut writable = self.world_state.get_writable().await;

        // the tip must not have moved since the snapshot was taken
        if tip_identity(&self.block_storage.current()?) != snapshot_tip {
            return Err(Error::BadChaining(ChainingFault::TooLate));
        }

        self.block_storage.write_block(block)?;
        *writable = check.into_state();
        writable.save();
        Ok(())
    }
}

fn tip_identity(tip: &Option<Keyblock>) -> Option<(u64, String)> {
    tip.as_ref().map(|tip| {
        (
            u64::from(tip.number),
            tip.hash.map(|hash| hash.hex()).unwrap_or_default(),
        )
    })
}
