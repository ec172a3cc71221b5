//! Application and partner-user credential resolution

use crate::database::repository::{ApplicationRepository, LinkedAccountRepository};
use crate::error::{AppError, CredentialError};
use crate::logging::mask_phone;
use crate::models::{Application, LinkedAccount};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

const BEARER: &str = "Bearer ";

/// Where a developer call carries its credentials.
///
/// `V1` (deprecated) reads `app_token`/`app_secret` from the body or query,
/// `V2` reads `Authorization: Bearer <public>:<private>`. Handlers are shared;
/// only the credential source and the response projection differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}

/// v1 credentials, flattened into request bodies and query strings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppCredentials {
    #[serde(default)]
    pub app_token: Option<Uuid>,
    #[serde(default)]
    pub app_secret: Option<Uuid>,
}

/// `Bearer <public_token>:<private_token>` -> the token pair
pub fn parse_bearer(value: &str) -> Result<(Uuid, Uuid), CredentialError> {
    let tokens = value
        .strip_prefix(BEARER)
        .ok_or(CredentialError::MalformedAuthorization)?
        .trim();
    let (public, private) = tokens
        .split_once(':')
        .ok_or(CredentialError::MalformedAuthorization)?;

    let public = Uuid::parse_str(public).map_err(|_| CredentialError::MalformedAuthorization)?;
    let private = Uuid::parse_str(private).map_err(|_| CredentialError::MalformedAuthorization)?;
    Ok((public, private))
}

pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Token pair -> usable application
pub async fn resolve_application(
    repo: &dyn ApplicationRepository,
    public_token: Uuid,
    private_token: Uuid,
) -> Result<Application, AppError> {
    let application = repo
        .find_by_tokens(public_token, private_token)
        .await?
        .ok_or_else(|| {
            warn!(%public_token, "unknown application credentials");
            CredentialError::UnknownApplication
        })?;

    if !application.is_usable() {
        warn!(app_id = %application.app_id, "inactive application");
        return Err(CredentialError::InactiveApplication.into());
    }

    debug!(
        app_id = %application.app_id,
        merchant_id = application.merchant_id,
        "application resolved"
    );
    Ok(application)
}

/// Resolve the caller of a developer endpoint for the given version.
pub async fn resolve_versioned(
    repo: &dyn ApplicationRepository,
    version: ApiVersion,
    headers: &HeaderMap,
    credentials: &AppCredentials,
) -> Result<Application, AppError> {
    let (public, private) = match version {
        ApiVersion::V2 => {
            let header =
                authorization_header(headers).ok_or(CredentialError::MissingAuthorization)?;
            parse_bearer(header)?
        }
        ApiVersion::V1 => match (credentials.app_token, credentials.app_secret) {
            (Some(token), Some(secret)) => (token, secret),
            _ => return Err(CredentialError::MissingAuthorization.into()),
        },
    };

    resolve_application(repo, public, private).await
}

/// Partner credential: an application with partner access
pub fn require_partner_access(application: &Application) -> Result<(), CredentialError> {
    if application.has_partner_access {
        Ok(())
    } else {
        Err(CredentialError::PartnerAccessDenied)
    }
}

/// `phone_number` + `tracking_id` -> the application's active linked account.
/// Runs only once the application itself is resolved.
pub async fn resolve_partner_user(
    repo: &dyn LinkedAccountRepository,
    application: &Application,
    phone_number: &str,
    tracking_id: Uuid,
) -> Result<LinkedAccount, AppError> {
    let account = repo
        .find_active_by_partner_id(tracking_id, application.merchant_id)
        .await?
        .filter(|account| account.phone_number == phone_number)
        .ok_or_else(|| {
            warn!(
                phone = %mask_phone(phone_number),
                merchant_id = application.merchant_id,
                "no active link for partner user"
            );
            CredentialError::UnknownPartnerUser
        })?;

    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::repository::LinkedAccountRepository;

    #[test]
    fn test_parse_bearer() {
        let public = Uuid::new_v4();
        let private = Uuid::new_v4();

        assert_eq!(
            parse_bearer(&format!("Bearer {}:{}", public, private)).unwrap(),
            (public, private)
        );
        assert!(parse_bearer(&format!("Token {}:{}", public, private)).is_err());
        assert!(parse_bearer(&format!("Bearer {}", public)).is_err());
        assert!(parse_bearer("Bearer not:uuids").is_err());
    }

    #[tokio::test]
    async fn test_inactive_and_deleted_applications_are_rejected() {
        let store = MemoryStore::new();
        let mut inactive = Application::new("inactive", "wallet", 111);
        inactive.active = false;
        let inactive = store.add_application(inactive).await;
        let mut deleted = Application::new("deleted", "wallet", 111);
        deleted.deleted = true;
        let deleted = store.add_application(deleted).await;

        for app in [inactive, deleted] {
            let err = resolve_application(&store, app.public_token, app.private_token)
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), 403);
        }
    }

    #[tokio::test]
    async fn test_v1_requires_both_tokens() {
        let store = MemoryStore::new();
        let app = store
            .add_application(Application::new("app", "wallet", 111))
            .await;

        let partial = AppCredentials {
            app_token: Some(app.public_token),
            app_secret: None,
        };
        assert!(resolve_versioned(&store, ApiVersion::V1, &HeaderMap::new(), &partial)
            .await
            .is_err());

        let full = AppCredentials {
            app_token: Some(app.public_token),
            app_secret: Some(app.private_token),
        };
        let resolved = resolve_versioned(&store, ApiVersion::V1, &HeaderMap::new(), &full)
            .await
            .unwrap();
        assert_eq!(resolved.id, app.id);
    }

    #[tokio::test]
    async fn test_partner_user_must_match_phone_and_merchant() {
        let store = MemoryStore::new();
        let app = store
            .add_application(Application::new("partner", "wallet", 111))
            .await;
        let link = store
            .link("22123456", Uuid::new_v4(), 111, Some(app.id))
            .await
            .unwrap()
            .account;

        assert!(
            resolve_partner_user(&store, &app, "22123456", link.partner_tracking_id)
                .await
                .is_ok()
        );
        assert!(
            resolve_partner_user(&store, &app, "22999999", link.partner_tracking_id)
                .await
                .is_err()
        );

        let other = Application::new("other", "wallet", 222);
        assert!(
            resolve_partner_user(&store, &other, "22123456", link.partner_tracking_id)
                .await
                .is_err()
        );
    }
}
