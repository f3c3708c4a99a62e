use adtl_model::value::to_text;
use serde_json::Value;
use sha2::Digest;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    hex::encode(digest)
}

/// One-way digest of a sensitive value's text form.
pub fn hash_sensitive(value: &Value) -> String {
    sha256_hex(to_text(value).as_bytes())
}
