//! The `udid2` user id format.

/// Check whether a user id is a well formed `udid2` string.
///
/// The format is
/// `udid2;c;LASTNAME;FIRSTNAME;YYYY-MM-DD;e+LL.LL(+|-)LLL.LL;SALT;`
/// where `LASTNAME` and `FIRSTNAME` use only `A`-`Z` and `-`, the
/// coordinates are decimal degrees and `SALT` is a decimal number.
///
/// ```
/// use fidem::is_valid_udid2;
///
/// assert!(is_valid_udid2("udid2;c;DOE;JOHN;1980-07-01;e+47.47+000.56;0;"));
/// assert!(is_valid_udid2("udid2;c;VAN-DAMME;JEAN;1960-10-18;e+50.84-004.35;7452;"));
/// assert!(!is_valid_udid2("udid2;c;doe;JOHN;1980-07-01;e+47.47+000.56;0;"));
/// assert!(!is_valid_udid2("john.doe@example.org"));
/// ```
#[must_use]
pub fn is_valid_udid2(user_id: &str) -> bool {
    let fields: Vec<&str> = user_id.split(';').collect();
    // trailing ';' leaves a final empty field
    if fields.len() != 8 || !fields[7].is_empty() {
        return false;
    }
    fields[0] == "udid2"
        && fields[1] == "c"
        && is_name(fields[2])
        && is_name(fields[3])
        && is_date(fields[4])
        && is_geoloc(fields[5])
        && !fields[6].is_empty()
        && fields[6].bytes().all(|b| b.is_ascii_digit())
}

fn is_name(field: &str) -> bool {
    field.bytes().all(|b| b.is_ascii_uppercase() || b == b'-')
}

fn is_date(field: &str) -> bool {
    let bytes = field.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && [0, 1, 2, 3, 5, 6, 8, 9]
            .iter()
            .all(|&i| bytes[i].is_ascii_digit())
}

// e+LL.LL(+|-)LLL.LL
fn is_geoloc(field: &str) -> bool {
    let bytes = field.as_bytes();
    bytes.len() == 14
        && bytes[0] == b'e'
        && bytes[1] == b'+'
        && bytes[4] == b'.'
        && (bytes[7] == b'+' || bytes[7] == b'-')
        && bytes[11] == b'.'
        && [2, 3, 5, 6, 8, 9, 10, 12, 13]
            .iter()
            .all(|&i| bytes[i].is_ascii_digit())
}
