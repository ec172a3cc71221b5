//! Clients for the systems that actually move money

pub mod client;
pub mod data_api;
pub mod types;

pub use client::BackendClient;
pub use data_api::DataApiClient;
pub use types::{BackendResult, Body, Upstream, UpstreamFailure};
