//! Credential resolution: application bearer tokens, v1 body credentials,
//! partner users, service API keys and callback signatures

pub mod api_key;
pub mod credentials;
pub mod extractors;
pub mod signature;

pub use credentials::{ApiVersion, AppCredentials};
pub use extractors::{InternalCaller, PartnerApplication, ResolvedApplication};
