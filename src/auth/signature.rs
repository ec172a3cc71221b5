//! `Signature` header on upstream callbacks:
//! hex(HMAC-SHA256(secret, "<secret>-<METHOD>-<path>-<id>"))

use crate::auth::api_key::secure_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "signature";

pub fn generate_request_signature(secret: &str, method: &str, path: &str, id: &str) -> String {
    let message = [secret, method, path, id].join("-");
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn signature_is_valid(
    secret: &str,
    method: &str,
    path: &str,
    id: &str,
    presented: &str,
) -> bool {
    let expected = generate_request_signature(secret, method, path, id);
    !expected.is_empty() && secure_eq(expected.as_bytes(), presented.trim().as_bytes())
}
