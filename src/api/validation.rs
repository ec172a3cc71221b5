//! Request validation: every handler turns its raw body or query into a
//! checked value before doing anything else.

use crate::error::{AppError, ValidationError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;
use uuid::Uuid;

/// Business rules beyond what deserialization already checks
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result.map(|Json(v)| v).map_err(|err| {
        ValidationError::InvalidBody {
            message: err.body_text(),
        }
        .into()
    })
}

pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}

pub fn extract_validated_query<T: Validate>(
    result: Result<Query<T>, QueryRejection>,
) -> Result<T, AppError> {
    let value = result
        .map(|Query(v)| v)
        .map_err(|err| ValidationError::InvalidBody {
            message: err.body_text(),
        })?;
    value.validate()?;
    Ok(value)
}

static PHONE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}$").expect("phone number pattern"));
static OTP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").expect("otp pattern"));
static PRODUCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}$").expect("product pattern"));

fn matches(pattern: &LazyLock<Regex>, value: &str) -> bool {
    pattern.is_match(value)
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

pub fn required<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T, ValidationError> {
    value.as_ref().ok_or_else(|| ValidationError::MissingField {
        field: field.to_string(),
    })
}

/// Eight digits
pub fn phone_number(field: &str, value: &str) -> Result<(), ValidationError> {
    if matches(&PHONE_NUMBER, value) {
        Ok(())
    } else {
        Err(invalid(field, "Invalid phone number"))
    }
}

/// Six digits
pub fn otp(field: &str, value: &str) -> Result<(), ValidationError> {
    if matches(&OTP, value) {
        Ok(())
    } else {
        Err(invalid(field, "Should contain exactly 6 digits"))
    }
}

/// Three-digit partner product code
pub fn product(field: &str, value: &str) -> Result<(), ValidationError> {
    if matches(&PRODUCT, value) {
        Ok(())
    } else {
        Err(invalid(field, "Unknown product"))
    }
}

pub fn http_url(field: &str, value: &str) -> Result<(), ValidationError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => Err(invalid(field, "Enter a valid URL")),
    }
}

pub fn uuid(field: &str, value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value).map_err(|_| invalid(field, "Must be a valid UUID"))
}

pub fn max_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(invalid(
            field,
            &format!("Ensure this field has no more than {} characters", max),
        ));
    }
    Ok(())
}

pub fn len_between(
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    if value.chars().count() < min {
        return Err(invalid(
            field,
            &format!("Ensure this field has at least {} characters", min),
        ));
    }
    max_len(field, value, max)
}

pub fn range(
    field: &str,
    value: i64,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<(), ValidationError> {
    let below = min.is_some_and(|min| value < min);
    let above = max.is_some_and(|max| value > max);
    if below || above {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        for pattern in [&PHONE_NUMBER, &OTP, &PRODUCT] {
            assert!(pattern.as_str().starts_with('^'));
        }
    }

    #[test]
    fn test_phone_number() {
        assert!(phone_number("phone_number", "22123456").is_ok());
        assert!(phone_number("phone_number", "2212345").is_err());
        assert!(phone_number("phone_number", "221234567").is_err());
        assert!(phone_number("phone_number", "2212345a").is_err());
    }

    #[test]
    fn test_otp_and_product() {
        assert!(otp("otp", "123456").is_ok());
        assert!(otp("otp", "12345").is_err());
        assert!(otp("otp", "12a456").is_err());
        assert!(product("product", "005").is_ok());
        assert!(product("product", "5").is_err());
    }

    #[test]
    fn test_http_url() {
        assert!(http_url("webhook", "https://dev.example.com/hook").is_ok());
        assert!(http_url("webhook", "http://localhost:3000/hook").is_ok());
        assert!(http_url("webhook", "ftp://example.com").is_err());
        assert!(http_url("webhook", "not a url").is_err());
    }

    #[test]
    fn test_range_and_lengths() {
        assert!(range("amount", 100, Some(100), Some(2_000_000)).is_ok());
        assert!(range("amount", 99, Some(100), Some(2_000_000)).is_err());
        assert!(range("amount", 2_000_001, Some(100), Some(2_000_000)).is_err());
        assert!(max_len("destination", "abc", 3).is_ok());
        assert!(max_len("destination", "abcd", 3).is_err());
        assert!(len_between("developer_tracking_id", "", 1, 50).is_err());
    }
}
