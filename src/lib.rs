//! Flouci developer and partner payment gateway.

pub mod api;
pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod services;
