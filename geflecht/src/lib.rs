#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::similar_names)]

//! **Geflecht** is a web-of-trust keychain node.
//!
//! ## Overview
//!
//! The keychain is an append-only, proof-of-work-secured block sequence
//! recording the evolution of a web of trust: members certify each other,
//! newcomers enter with enough certifications, members who fall out of
//! reach of the rest are excluded again. `Geflecht` validates submitted
//! blocks against coherence, trust-stability and proof-of-work rules,
//! keeps the derived state (members, trusted keys, certification links),
//! and mints new blocks from pending membership requests.

pub mod block_applier;
pub mod block_builder;
pub mod block_checker;
pub mod block_storage;
pub mod config;
pub mod error;
pub mod keyblock;
pub mod keychain;
pub mod keychange_checker;
pub mod membership_pool;
pub mod pow;
pub mod world_state;
pub mod wot;

pub use error::{ChainingFault, Error};
