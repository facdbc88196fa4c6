//! Loki gateway client for lokicli
//!
//! This crate talks to the gateway: range queries, series discovery, the
//! oauth2-proxy login flow, and local storage of session cookies.

mod apps;
mod auth;
mod client;
mod token_store;

pub use apps::{AppCatalog, friendly_name};
pub use auth::{LoginChallenge, OAuth2ProxyAuth};
pub use client::{AUTH_COOKIE, LokiClient, REQUEST_TIMEOUT, parse_query_range};
pub use token_store::{SavedToken, TokenStore};

// Re-export types used in our public API
pub use lokicli_types::{BatchRequest, LogEntry, LokiError, Result};
