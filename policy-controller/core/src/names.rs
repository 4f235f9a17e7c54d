use sha2::{Digest, Sha256};

/// Names at or beyond this length are shortened.
const MAX_LEN: usize = 64;

/// Joins `parts` with `-`, shortening the result so that it remains a valid
/// DNS label.
///
/// Long names are cut and suffixed with a prefix of the SHA-256 digest of the
/// full name, so distinct inputs keep distinct (and stable) names. When the
/// cut would end on a character that may not end a label, one more character
/// is dropped and one more digest character is kept.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let full = parts.join("-");
    if full.chars().count() < MAX_LEN {
        return full;
    }

    let digest = format!("{:x}", Sha256::digest(full.as_bytes()));
    let (keep, hash_len) = match full.chars().nth(56) {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => (57, 5),
        _ => (56, 6),
    };
    let head = full.chars().take(keep).collect::<String>();
    format!("{head}-{}", &digest[..hash_len])
}
