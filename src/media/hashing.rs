use md5::{Digest, Md5};

/// Length of the content hash embedded in stored file names.
pub const SHORT_HASH_LEN: usize = 8;

pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First eight hex digits of the MD5 of `bytes`.
pub fn short_hash(bytes: &[u8]) -> String {
    let mut hex = md5_hex(bytes);
    hex.truncate(SHORT_HASH_LEN);
    hex
}
