//! Permanent storage for applied `Keyblock`s, persisted on disk.

mod error;

pub use error::Error;

use crate::keyblock::{BlockNumber, Keyblock};
use fidem::Fingerprint;
use sled::{Config, Tree};
use std::ops::{Bound, RangeBounds};

const BLOCKS_TREE_NAME: &[u8] = b"blocks";
const ISSUERS_TREE_NAME: &[u8] = b"issuers";

/// Persistent block storage.
///
/// Blocks are keyed by number; a second tree remembers the latest block
/// number of every issuer for the proof-of-work penalty rule.
#[derive(Debug, Clone)]
pub struct BlockStorage {
    blocks: Tree,
    issuers: Tree,
}

impl BlockStorage {
    /// Create a new `BlockStorage` at `path`.
    pub fn new(path: &str) -> Result<Self, Error> {
        Self::with_config(Config::default().path(path))
    }

    /// Create a `BlockStorage` that is deleted when dropped.
    pub fn temporary() -> Result<Self, Error> {
        Self::with_config(Config::default().temporary(true))
    }

    fn with_config(config: Config) -> Result<Self, Error> {
        let config = config
            .cache_capacity(8_000_000)
            .flush_every_ms(Some(400))
            .use_compression(false);
        let database = config.open()?;
        let blocks = database.open_tree(BLOCKS_TREE_NAME)?;
        let issuers = database.open_tree(ISSUERS_TREE_NAME)?;
        Ok(Self { blocks, issuers })
    }

    /// Write a sealed block to the store and index its issuer.
    pub fn write_block(&self, block: &Keyblock) -> Result<(), Error> {
        if block.hash.is_none() || block.signature.is_none() {
            return Err(Error::UnsealedBlock);
        }
        let value = postcard::to_stdvec(block)?;
        self.blocks.insert(block.number.to_be_bytes(), value)?;
        self.issuers.insert(
            issuer_key(block.issuer, block.number),
            block.number.to_be_bytes().as_ref(),
        )?;
        Ok(())
    }

    /// The current tip of the chain.
    pub fn current(&self) -> Result<Option<Keyblock>, Error> {
        match self.read(..).next_back() {
            Some(block) => Ok(Some(block?)),
            None => Ok(None),
        }
    }

    /// Find a block by its number.
    pub fn find_by_number(&self, number: BlockNumber) -> Result<Option<Keyblock>, Error> {
        match self.blocks.get(number.to_be_bytes())? {
            Some(value) => Ok(Some(postcard::from_bytes(&value)?)),
            None => Ok(None),
        }
    }

    /// The latest block a given issuer signed, if any.
    pub fn last_of_issuer(&self, issuer: Fingerprint) -> Result<Option<Keyblock>, Error> {
        self.last_of_issuer_before(issuer, BlockNumber::from(u64::MAX))
    }

    /// The latest block a given issuer signed below `number`.
    ///
    /// Replay needs the issuer's history relative to the block under test,
    /// not relative to the stored tip.
    pub fn last_of_issuer_before(
        &self,
        issuer: Fingerprint,
        number: BlockNumber,
    ) -> Result<Option<Keyblock>, Error> {
        let start = issuer_key(issuer, BlockNumber::default());
        let end = issuer_key(issuer, number);
        match self.issuers.range(start..end).values().next_back() {
            Some(value) => match BlockNumber::from_be_bytes(&value?) {
                Some(number) => self.find_by_number(number),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Read a range of blocks from the store.
    pub fn read<R>(&self, range: R) -> impl DoubleEndedIterator<Item = Result<Keyblock, Error>>
    where
        R: RangeBounds<BlockNumber>,
    {
        let start = range.start_bound();
        let end = range.end_bound();
        self.blocks
            .range((
                map_bound_from_block_number(start),
                map_bound_from_block_number(end),
            ))
            .values()
            .map(|result| {
                let value = result?;
                let block = postcard::from_bytes(&value)?;
                Ok(block)
            })
    }
}

fn issuer_key(issuer: Fingerprint, number: BlockNumber) -> Vec<u8> {
    let mut key = issuer.as_bytes().to_vec();
    key.extend_from_slice(number.to_be_bytes().as_ref());
    key
}

fn map_bound_from_block_number(bound: Bound<&BlockNumber>) -> Bound<impl AsRef<[u8]>> {
    map_bound(bound, |v| v.to_be_bytes())
}

fn map_bound<T, U>(bound: Bound<T>, f: impl FnOnce(T) -> U) -> Bound<U> {
    match bound {
        Bound::Included(v) => Bound::Included(f(v)),
        Bound::Excluded(v) => Bound::Excluded(f(v)),
        Bound::Unbounded => Bound::Unbounded,
    }
}
