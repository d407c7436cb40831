use fidem::Fingerprint;
use sha1::{Digest, Sha1};

/// Compute the Merkle root of a member set.
///
/// Leaves are the SHA-1 digests of the lowercase hex fingerprints, sorted
/// ascending. Inner nodes hash the concatenated hex digests of their two
/// children; an odd node is promoted unchanged. The root of the empty set
/// is the digest of the empty string.
///
/// The root is a pure function of the member set. There is no incremental
/// tree to keep in sync, every block recomputes.
#[must_use]
pub fn members_root<'a, I>(members: I) -> String
where
    I: IntoIterator<Item = &'a Fingerprint>,
{
    let mut leaves: Vec<String> = members.into_iter().map(Fingerprint::hex).collect();
    leaves.sort();

    if leaves.is_empty() {
        return sha1_hex("");
    }

    let mut level: Vec<String> = leaves.iter().map(sha1_hex).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => sha1_hex(format!("{}{}", left, right)),
                [odd] => odd.clone(),
                _ => unreachable!(),
            })
            .collect();
    }
    level.pop().unwrap()
}

fn sha1_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha1::digest(data.as_ref()))
}
