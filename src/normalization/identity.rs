use sha1::{Digest, Sha1};

/// Byte appended after every part so adjacent parts cannot run together.
const UNIT_SEPARATOR: u8 = 0x1f;

/// Content-addressed identifier: SHA-1 over the ordered parts, each followed
/// by the ASCII unit separator, rendered as lowercase hex.
pub fn stable_id<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([UNIT_SEPARATOR]);
    }
    format!("{:x}", hasher.finalize())
}

/// Identity of a review. Re-ingesting the same content yields the same id.
pub fn review_id(asin: &str, review_text: &str, summary_text: &str, review_time: &str) -> String {
    stable_id([asin, review_text, summary_text, review_time])
}
