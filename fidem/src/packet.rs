use crate::{Error, PublicKey, Signature};
use serde::{Deserialize, Serialize};

const ARMOR_COLUMNS: usize = 64;

/// One packet of key material.
///
/// A key travels as an ordered list of packets: the primary key first, then
/// the user id, self-certifications, third-party certifications, subkeys and
/// subkey bindings. No other kinds exist, anything else fails decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    /// The primary key of an identity.
    PrimaryKey(PublicKey),
    /// The human readable user id (`udid2` formatted for members).
    UserId(String),
    /// A certification of the user id by the primary key itself.
    SelfCertification(Signature),
    /// A certification of the user id by a third party.
    Certification(Signature),
    /// An additional key bound to the primary key.
    Subkey(PublicKey),
    /// The primary key's signature binding a subkey.
    SubkeyBinding(Signature),
}

impl Packet {
    /// The packet kind as a static label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PrimaryKey(_) => "primary key",
            Self::UserId(_) => "user id",
            Self::SelfCertification(_) => "self certification",
            Self::Certification(_) => "certification",
            Self::Subkey(_) => "subkey",
            Self::SubkeyBinding(_) => "subkey binding",
        }
    }
}

/// Encode a packet list into its text armor.
///
/// The payload is hex of the packets' binary encoding, wrapped at 64
/// columns between BEGIN/END marker lines.
pub fn armor(label: &str, packets: &[Packet]) -> Result<String, Error> {
    let payload = hex::encode(postcard::to_stdvec(&packets.to_vec())?);
    let mut out = format!("-----BEGIN GEFLECHT {} BLOCK-----\n", label);
    let mut rest = payload.as_str();
    while !rest.is_empty() {
        let take = rest.len().min(ARMOR_COLUMNS);
        out.push_str(&rest[..take]);
        out.push('\n');
        rest = &rest[take..];
    }
    out.push_str(&format!("-----END GEFLECHT {} BLOCK-----\n", label));
    Ok(out)
}

/// Decode a text armor back into its packet list.
///
/// Line endings are normalized away, so UNIX and DOS renditions of the same
/// armor decode identically.
pub fn dearmor(text: &str) -> Result<Vec<Packet>, Error> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    match lines.next() {
        Some(line) if line.starts_with("-----BEGIN GEFLECHT ") => {}
        _ => return Err(Error::BadArmor),
    }
    let mut payload = String::new();
    let mut closed = false;
    for line in lines {
        if line.starts_with("-----END GEFLECHT ") {
            closed = true;
            break;
        }
        payload.push_str(line);
    }
    if !closed {
        return Err(Error::BadArmor);
    }
    let bytes = hex::decode(&payload)?;
    Ok(postcard::from_bytes(&bytes)?)
}

/// Normalize a text to DOS line endings.
///
/// Comparing two armors after normalization makes the comparison
/// insensitive to the line endings the submitter used.
///
/// ```
/// use fidem::normalize_dos;
///
/// assert_eq!(normalize_dos("a\nb\r\nc\n"), "a\r\nb\r\nc\r\n");
/// ```
#[must_use]
pub fn normalize_dos(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => out.push_str("\r\n"),
            _ => out.push(c),
        }
    }
    out
}
