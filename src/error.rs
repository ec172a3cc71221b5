//! Unified error handling for the developer gateway
//!
//! Every failure a handler can produce is an [`AppError`]. The kind decides the
//! HTTP status, the machine-readable [`ErrorCode`] and the message shown to the
//! integrator. Rendering lives in `middleware::error`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by integrators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Credential errors (403)
    #[serde(rename = "MISSING_CREDENTIALS")]
    MissingCredentials,
    #[serde(rename = "INVALID_CREDENTIALS")]
    InvalidCredentials,
    #[serde(rename = "APPLICATION_INACTIVE")]
    ApplicationInactive,
    #[serde(rename = "PARTNER_ACCESS_DENIED")]
    PartnerAccessDenied,
    #[serde(rename = "PARTNER_USER_NOT_FOUND")]
    PartnerUserNotFound,
    #[serde(rename = "INVALID_API_KEY")]
    InvalidApiKey,
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,

    // Domain errors (4xx)
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "ACCOUNT_NOT_LINKED")]
    AccountNotLinked,
    #[serde(rename = "TEST_APPLICATION")]
    TestApplication,
    #[serde(rename = "PRECONDITION_FAILED")]
    PreconditionFailed,
    #[serde(rename = "INVALID_STATE_TRANSITION")]
    InvalidStateTransition,
    #[serde(rename = "THROTTLED")]
    Throttled,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "EXTERNAL_CONNECTION_ERROR")]
    ExternalConnectionError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Failures resolving who is calling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No Authorization header (or body credentials for v1 routes)
    MissingAuthorization,
    /// Header present but not `Bearer <public>:<private>` / `Api-Key <key>`
    MalformedAuthorization,
    /// Token pair does not match any application
    UnknownApplication,
    /// Application is disabled or soft-deleted
    InactiveApplication,
    /// Application is not allowed to use partner endpoints
    PartnerAccessDenied,
    /// phone_number / tracking_id does not resolve to an active linked account
    UnknownPartnerUser,
    /// API key unknown, revoked or not issued to the expected service
    InvalidApiKey,
    /// Upstream callback signature missing or wrong
    InvalidSignature,
}

/// Input validation errors, raised before any side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField {
        field: String,
    },
    InvalidField {
        field: String,
        reason: String,
    },
    OutOfRange {
        field: String,
        min: Option<i64>,
        max: Option<i64>,
    },
    /// Body could not be decoded at all
    InvalidBody {
        message: String,
    },
    /// Cross-field rule violation
    NonField {
        message: String,
    },
}

/// Business rule outcomes that integrators branch on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    TransactionNotFound { operation_id: String },
    AccountNotLinked,
    TestApplication { message: String },
    PreconditionFailed { message: String },
    InvalidTransition { from: String, to: String },
    Throttled { retry_after_secs: u64 },
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    Configuration { message: String },
}

/// Failures talking to another service that could not be normalized
#[derive(Debug, Clone)]
pub enum ExternalError {
    ConnectionIssue { service: String, message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Credential(CredentialError),
    Validation(ValidationError),
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Internal(String),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Internal(message.into()))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Credential(_) => 403,
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::AccountNotLinked => 401,
                DomainError::TestApplication { .. } => 406,
                DomainError::PreconditionFailed { .. } => 412,
                DomainError::InvalidTransition { .. } => 409,
                DomainError::Throttled { .. } => 429,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(_) => 503,
            AppErrorKind::Internal(_) => 500,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Credential(err) => match err {
                CredentialError::MissingAuthorization => ErrorCode::MissingCredentials,
                CredentialError::MalformedAuthorization
                | CredentialError::UnknownApplication => ErrorCode::InvalidCredentials,
                CredentialError::InactiveApplication => ErrorCode::ApplicationInactive,
                CredentialError::PartnerAccessDenied => ErrorCode::PartnerAccessDenied,
                CredentialError::UnknownPartnerUser => ErrorCode::PartnerUserNotFound,
                CredentialError::InvalidApiKey => ErrorCode::InvalidApiKey,
                CredentialError::InvalidSignature => ErrorCode::InvalidSignature,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::AccountNotLinked => ErrorCode::AccountNotLinked,
                DomainError::TestApplication { .. } => ErrorCode::TestApplication,
                DomainError::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
                DomainError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
                DomainError::Throttled { .. } => ErrorCode::Throttled,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(_) => ErrorCode::ExternalConnectionError,
            AppErrorKind::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Credential(err) => match err {
                CredentialError::MissingAuthorization => {
                    "Authentication credentials were not provided.".to_string()
                }
                CredentialError::MalformedAuthorization => {
                    "Malformed authorization credentials.".to_string()
                }
                CredentialError::UnknownApplication => {
                    "Invalid application credentials.".to_string()
                }
                CredentialError::InactiveApplication => "Application is not active.".to_string(),
                CredentialError::PartnerAccessDenied => {
                    "Application has no partner access.".to_string()
                }
                CredentialError::UnknownPartnerUser => "Invalid partner user.".to_string(),
                CredentialError::InvalidApiKey => "Invalid API key.".to_string(),
                CredentialError::InvalidSignature => "Invalid request signature.".to_string(),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => format!("Field '{}' must be at least {}", field, min),
                    (None, Some(max)) => format!("Field '{}' must be at most {}", field, max),
                    (None, None) => format!("Field '{}' is out of acceptable range", field),
                },
                ValidationError::InvalidBody { message } => {
                    format!("Invalid request body: {}", message)
                }
                ValidationError::NonField { message } => message.clone(),
            },
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => {
                    "Transaction with this operation_id does not exist.".to_string()
                }
                DomainError::AccountNotLinked => "Unauthorized".to_string(),
                DomainError::TestApplication { message } => message.clone(),
                DomainError::PreconditionFailed { message } => message.clone(),
                DomainError::InvalidTransition { from, to } => {
                    format!("Operation cannot move from {} to {}", from, to)
                }
                DomainError::Throttled { retry_after_secs } => format!(
                    "Request was throttled. Expected available in {} seconds.",
                    retry_after_secs
                ),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(_) => "External server connection issue".to_string(),
            AppErrorKind::Internal(_) => {
                "An internal server error occurred. Please try again later.".to_string()
            }
        }
    }

    /// Field-level detail for validation failures
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::Validation(err) => {
                let field = match err {
                    ValidationError::MissingField { field }
                    | ValidationError::InvalidField { field, .. }
                    | ValidationError::OutOfRange { field, .. } => field.as_str(),
                    ValidationError::InvalidBody { .. } | ValidationError::NonField { .. } => {
                        "non_field_errors"
                    }
                };
                Some(serde_json::json!({ (field): [self.user_message()] }))
            }
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(_) => true,
            AppErrorKind::Domain(DomainError::Throttled { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::Infrastructure(InfrastructureError::Cache { message })
            | AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            | AppErrorKind::External(ExternalError::ConnectionIssue { message, .. })
            | AppErrorKind::Internal(message) => write!(f, "{}", message),
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        AppError::new(AppErrorKind::Credential(err))
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::new(AppErrorKind::Validation(err))
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::new(AppErrorKind::Domain(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidBody {
            message: err.to_string(),
        }))
    }
}

// From<DatabaseError> lives in database/error.rs, From<CacheError> in cache/error.rs

pub type AppResult<T> = Result<T, AppError>;
