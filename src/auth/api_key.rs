//! Service API keys (`Authorization: Api-Key <prefix>.<secret>`)

use crate::database::repository::ServiceApiKeyRepository;
use crate::error::{AppError, CredentialError};
use crate::models::ServiceApiKey;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Name of the key the upstream backend calls us with
pub const BACKEND_KEY_NAME: &str = "BACKEND";

const SCHEME: &str = "Api-Key ";

pub fn hash_api_key(full_key: &str) -> String {
    hex::encode(Sha256::digest(full_key.as_bytes()))
}

/// Constant-time byte comparison
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// `Api-Key <prefix>.<secret>` -> the full key, or `None` for other schemes
pub fn parse_api_key_header(value: &str) -> Option<Result<&str, CredentialError>> {
    let key = value.strip_prefix(SCHEME)?.trim();
    match key.split_once('.') {
        Some((prefix, secret)) if !prefix.is_empty() && !secret.is_empty() => Some(Ok(key)),
        _ => Some(Err(CredentialError::MalformedAuthorization)),
    }
}

/// Key name equal to `expected` or starting with it (`BACKEND`, `BACKEND-eu`)
pub fn name_matches(name: &str, expected: &str) -> bool {
    name == expected || name.starts_with(expected)
}

/// Resolve a full key to its unrevoked record named `expected`.
pub async fn verify_service_key(
    repo: &dyn ServiceApiKeyRepository,
    full_key: &str,
    expected: &str,
) -> Result<ServiceApiKey, AppError> {
    let Some((prefix, _)) = full_key.split_once('.') else {
        return Err(CredentialError::MalformedAuthorization.into());
    };

    let record = repo
        .find_by_prefix(prefix)
        .await?
        .ok_or(CredentialError::InvalidApiKey)?;

    let presented = hash_api_key(full_key);
    if record.revoked || !secure_eq(presented.as_bytes(), record.hashed_key.as_bytes()) {
        warn!(prefix, "service key rejected");
        return Err(CredentialError::InvalidApiKey.into());
    }

    if !name_matches(&record.name, expected) {
        warn!(prefix, name = %record.name, expected, "service key not allowed here");
        return Err(CredentialError::InvalidApiKey.into());
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn test_parse_api_key_header() {
        assert_eq!(
            parse_api_key_header("Api-Key abc.def").unwrap().unwrap(),
            "abc.def"
        );
        assert!(parse_api_key_header("Api-Key nodot").unwrap().is_err());
        assert!(parse_api_key_header("Bearer a:b").is_none());
    }

    #[test]
    fn test_name_matching() {
        assert!(name_matches("BACKEND", BACKEND_KEY_NAME));
        assert!(name_matches("BACKEND-eu", BACKEND_KEY_NAME));
        assert!(!name_matches("REPORTING", BACKEND_KEY_NAME));
    }

    #[tokio::test]
    async fn test_verify_service_key() {
        let store = MemoryStore::new();
        store.add_api_key("BACKEND", "pre1.s3cret").await;
        store.add_api_key("REPORTING", "pre2.other").await;

        assert!(verify_service_key(&store, "pre1.s3cret", BACKEND_KEY_NAME)
            .await
            .is_ok());
        assert!(verify_service_key(&store, "pre1.wrong", BACKEND_KEY_NAME)
            .await
            .is_err());
        assert!(verify_service_key(&store, "pre2.other", BACKEND_KEY_NAME)
            .await
            .is_err());
        assert!(verify_service_key(&store, "unknown.key", BACKEND_KEY_NAME)
            .await
            .is_err());
    }
}
