//! Axum extractors that reject a request before its handler runs

use crate::api::AppState;
use crate::auth::api_key::{parse_api_key_header, verify_service_key, BACKEND_KEY_NAME};
use crate::auth::credentials::{
    authorization_header, parse_bearer, require_partner_access, resolve_application,
};
use crate::error::{AppError, CredentialError};
use crate::middleware::error::get_request_id_from_headers;
use crate::models::{Application, ServiceApiKey};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

fn tag(err: AppError, parts: &Parts) -> AppError {
    match get_request_id_from_headers(&parts.headers) {
        Some(request_id) => err.with_request_id(request_id),
        None => err,
    }
}

async fn bearer_application(parts: &Parts, state: &AppState) -> Result<Application, AppError> {
    let header =
        authorization_header(&parts.headers).ok_or(CredentialError::MissingAuthorization)?;
    let (public, private) = parse_bearer(header)?;
    resolve_application(state.applications.as_ref(), public, private).await
}

/// Caller identified by `Authorization: Bearer <public>:<private>`
pub struct ResolvedApplication(pub Application);

impl FromRequestParts<AppState> for ResolvedApplication {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        bearer_application(parts, state)
            .await
            .map(ResolvedApplication)
            .map_err(|e| tag(e, parts))
    }
}

/// Bearer application that also holds partner access
pub struct PartnerApplication(pub Application);

impl FromRequestParts<AppState> for PartnerApplication {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let result = async {
            let application = bearer_application(parts, state).await?;
            require_partner_access(&application)?;
            Ok::<_, AppError>(application)
        }
        .await;

        result.map(PartnerApplication).map_err(|e| tag(e, parts))
    }
}

/// Internal caller: the backend's service key, or an application bearer.
/// A service key wins when the header carries one.
pub enum InternalCaller {
    Service(ServiceApiKey),
    Application(Application),
}

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let result = async {
            let header = authorization_header(&parts.headers)
                .ok_or(CredentialError::MissingAuthorization)?;

            if let Some(key) = parse_api_key_header(header) {
                let record =
                    verify_service_key(state.api_keys.as_ref(), key?, BACKEND_KEY_NAME).await?;
                return Ok::<_, AppError>(InternalCaller::Service(record));
            }

            bearer_application(parts, state)
                .await
                .map(InternalCaller::Application)
        }
        .await;

        result.map_err(|e| tag(e, parts))
    }
}
