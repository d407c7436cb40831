use crate::{armor, dearmor, Error, Fingerprint, KeyId, Packet, PublicKey, Signature};

/// The armor label used for key material.
pub const KEY_LABEL: &str = "KEY";

/// The armor label used for detached certification packets.
pub const CERT_LABEL: &str = "CERTIFICATION";

/// Build the byte string a certification signs: the certified primary key
/// followed by a zero byte and the certified user id.
#[must_use]
pub fn certified_message(key: &PublicKey, user_id: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(key.as_bytes().len() + 1 + user_id.len());
    message.extend_from_slice(key.as_bytes());
    message.push(0);
    message.extend_from_slice(user_id.as_bytes());
    message
}

/// Verify a third-party certification of `(target_uid, target)` issued by
/// `issuer`.
pub fn verify_certification(
    issuer: &PublicKey,
    target_uid: &str,
    target: &PublicKey,
    cert: &Signature,
) -> Result<(), Error> {
    issuer.verify(&certified_message(target, target_uid), cert)
}

/// Decomposed key material: the packets of one key, sorted by kind.
///
/// `decompose` followed by `recompose` yields the canonical packet order.
/// Key material whose armor does not round-trip through this pair is
/// carrying packets out of order or of a kind it must not contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// The primary key.
    pub primary: PublicKey,
    /// The user id certified by the self-certifications.
    pub user_id: String,
    /// Certifications of the user id by the primary key itself.
    pub self_certifications: Vec<Signature>,
    /// Third-party certifications of the user id.
    pub certifications: Vec<Signature>,
    /// Subkeys bound to the primary key.
    pub subkeys: Vec<PublicKey>,
    /// Binding signatures for the subkeys.
    pub subkey_bindings: Vec<Signature>,
}

impl KeyMaterial {
    /// Decompose a packet list.
    ///
    /// Requires exactly one primary key, exactly one user id and at least
    /// one self-certification.
    pub fn decompose(packets: &[Packet]) -> Result<Self, Error> {
        let mut primary = None;
        let mut user_id = None;
        let mut self_certifications = Vec::new();
        let mut certifications = Vec::new();
        let mut subkeys = Vec::new();
        let mut subkey_bindings = Vec::new();

        for packet in packets {
            match packet {
                Packet::PrimaryKey(key) => {
                    if primary.replace(key.clone()).is_some() {
                        return Err(Error::UnexpectedPacket("second primary key"));
                    }
                }
                Packet::UserId(uid) => {
                    if user_id.replace(uid.clone()).is_some() {
                        return Err(Error::UnexpectedPacket("second user id"));
                    }
                }
                Packet::SelfCertification(sig) => self_certifications.push(sig.clone()),
                Packet::Certification(sig) => certifications.push(sig.clone()),
                Packet::Subkey(key) => subkeys.push(key.clone()),
                Packet::SubkeyBinding(sig) => subkey_bindings.push(sig.clone()),
            }
        }

        let primary = primary.ok_or(Error::MissingPacket("primary key"))?;
        let user_id = user_id.ok_or(Error::MissingPacket("user id"))?;
        if self_certifications.is_empty() {
            return Err(Error::MissingPacket("self certification"));
        }

        Ok(Self {
            primary,
            user_id,
            self_certifications,
            certifications,
            subkeys,
            subkey_bindings,
        })
    }

    /// Decompose armored key material.
    pub fn from_armored(text: &str) -> Result<Self, Error> {
        Self::decompose(&dearmor(text)?)
    }

    /// Recompose the canonical packet list: primary key, user id,
    /// self-certifications, certifications, subkeys, subkey bindings.
    #[must_use]
    pub fn recompose(&self) -> Vec<Packet> {
        let mut packets = vec![
            Packet::PrimaryKey(self.primary.clone()),
            Packet::UserId(self.user_id.clone()),
        ];
        packets.extend(
            self.self_certifications
                .iter()
                .cloned()
                .map(Packet::SelfCertification),
        );
        packets.extend(self.certifications.iter().cloned().map(Packet::Certification));
        packets.extend(self.subkeys.iter().cloned().map(Packet::Subkey));
        packets.extend(
            self.subkey_bindings
                .iter()
                .cloned()
                .map(Packet::SubkeyBinding),
        );
        packets
    }

    /// Armor the canonical packet list.
    pub fn armored(&self) -> Result<String, Error> {
        armor(KEY_LABEL, &self.recompose())
    }

    /// The fingerprint of the primary key.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.primary.fingerprint()
    }

    /// The key id of the primary key.
    #[must_use]
    pub fn key_id(&self) -> KeyId {
        self.primary.key_id()
    }

    /// Verify that at least one self-certification binds the user id to the
    /// primary key.
    pub fn verify_self_certified(&self) -> Result<(), Error> {
        let message = certified_message(&self.primary, &self.user_id);
        for sig in &self.self_certifications {
            if self.primary.verify(&message, sig).is_ok() {
                return Ok(());
            }
        }
        Err(Error::MissingPacket("valid self certification"))
    }
}
