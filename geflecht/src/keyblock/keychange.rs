use super::Membership;
use fidem::{Fingerprint, Signed};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One entry of a block's `KeysChanges` section.
///
/// The four kinds are a closed set. `Leaver` and `Back` are part of the
/// data model but carry no validation rules yet, blocks containing them
/// are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Keychange {
    /// A key entering the web of trust.
    Newcomer(Newcomer),
    /// New subkeys and/or certifications for a key that is already a member.
    Update(Update),
    /// Reserved: a member leaving voluntarily.
    Leaver(Leaver),
    /// Reserved: a former member coming back.
    Back(Back),
}

/// A key entering the web of trust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newcomer {
    /// The fingerprint of the entering key.
    pub fingerprint: Fingerprint,
    /// Armored key material: primary key, user id, self-certification,
    /// subkeys and subkey bindings. No third-party certifications.
    pub keypackets: String,
    /// Armored third-party certifications over the entering key's user id.
    pub certpackets: String,
    /// The JOIN declaration, signed by the entering key itself.
    pub membership: Signed<Membership>,
}

/// New subkeys and/or certifications for an existing member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    /// The fingerprint of the updated key.
    pub fingerprint: Fingerprint,
    /// Armored subkeys and subkey bindings. May be empty.
    pub keypackets: String,
    /// Armored third-party certifications. May be empty.
    pub certpackets: String,
}

/// Reserved keychange kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaver {
    /// The fingerprint of the leaving key.
    pub fingerprint: Fingerprint,
}

/// Reserved keychange kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Back {
    /// The fingerprint of the returning key.
    pub fingerprint: Fingerprint,
}

impl Keychange {
    /// The fingerprint the change applies to.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::Newcomer(kc) => kc.fingerprint,
            Self::Update(kc) => kc.fingerprint,
            Self::Leaver(kc) => kc.fingerprint,
            Self::Back(kc) => kc.fingerprint,
        }
    }

    /// The single letter naming the kind in the block's text form.
    #[must_use]
    pub const fn type_letter(&self) -> char {
        match self {
            Self::Newcomer(_) => 'N',
            Self::Update(_) => 'U',
            Self::Leaver(_) => 'L',
            Self::Back(_) => 'B',
        }
    }

    /// The canonical text form of this keychange inside a block.
    #[must_use]
    pub fn raw(&self) -> String {
        let mut out = String::new();
        writeln!(out, "#####----").unwrap();
        writeln!(out, "Type: {}", self.type_letter()).unwrap();
        writeln!(out, "Fingerprint: {}", self.fingerprint()).unwrap();
        match self {
            Self::Newcomer(kc) => {
                writeln!(out, "KeyPackets:").unwrap();
                out.push_str(&kc.keypackets);
                writeln!(out, "CertificationPackets:").unwrap();
                out.push_str(&kc.certpackets);
                writeln!(out, "Membership:").unwrap();
                out.push_str(&kc.membership.unverified_ref().raw());
                writeln!(out, "MembershipSignature: {}", kc.membership.signature()).unwrap();
            }
            Self::Update(kc) => {
                writeln!(out, "KeyPackets:").unwrap();
                out.push_str(&kc.keypackets);
                writeln!(out, "CertificationPackets:").unwrap();
                out.push_str(&kc.certpackets);
            }
            Self::Leaver(_) | Self::Back(_) => {}
        }
        out
    }
}
