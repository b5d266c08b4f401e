//! Credentials and identities loaded from the environment
//!
//! Expected env vars:
//! - FOOTBALL_DATA_KEY: football-data.org API token
//! - MARKET_RESOLVER_ID: identity allowed to resolve markets

use serde::{Deserialize, Serialize};

pub const FOOTBALL_DATA_KEY_ENV: &str = "FOOTBALL_DATA_KEY";
pub const RESOLVER_ID_ENV: &str = "MARKET_RESOLVER_ID";

/// Fixture provider credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: String,
}

impl ProviderCredentials {
    /// Read `FOOTBALL_DATA_KEY`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(FOOTBALL_DATA_KEY_ENV).ok()?;
        Some(Self { api_key })
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &format!("{}...", &self.api_key.chars().take(4).collect::<String>()))
            .finish()
    }
}

/// Read `MARKET_RESOLVER_ID`; empty values count as missing
pub fn resolver_id_from_env() -> Option<String> {
    std::env::var(RESOLVER_ID_ENV).ok().filter(|id| !id.trim().is_empty())
}
