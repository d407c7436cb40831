#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::similar_names)]

//! Cryptographic types for web-of-trust identities.
//!
//! A member key is a bundle of *packets*: a primary key, a user id, a
//! self-certification, third-party certifications, subkeys and subkey
//! bindings. Packets travel in a text armor and are verified against the
//! ed25519 primary key they belong to.
//!
//! ```
//! use fidem::{certified_message, Identity};
//!
//! // two identities, one certifies the other
//! let alice = Identity::generate();
//! let bob = Identity::generate();
//!
//! let uid = "udid2;c;DOE;ALICE;1985-04-29;e+47.47+000.56;0;";
//! let cert = bob.certify(uid, alice.public_key());
//!
//! // the certification carries its issuer's key id
//! assert_eq!(cert.issuer(), bob.fingerprint().key_id());
//!
//! // and verifies against the certified key + user id
//! bob.public_key()
//!     .verify(&certified_message(alice.public_key(), uid), &cert)
//!     .unwrap();
//! ```

mod error;
mod fingerprint;
mod identity;
mod key_material;
mod packet;
mod public_key;
mod signable;
mod signature;
mod udid2;

pub use error::Error;
pub use fingerprint::{Fingerprint, KeyId};
pub use identity::Identity;
pub use key_material::{
    certified_message, verify_certification, KeyMaterial, CERT_LABEL, KEY_LABEL,
};
pub use packet::{armor, dearmor, normalize_dos, Packet};
pub use public_key::PublicKey;
pub use signable::{Signable, Signed, Verified, VerifiedRef};
pub use signature::Signature;
pub use udid2::is_valid_udid2;
