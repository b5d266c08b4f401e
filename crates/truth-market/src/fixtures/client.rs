//! football-data.org REST client
//!
//! Base URL: https://api.football-data.org/v4
//!
//! # Endpoints
//! - GET /competitions/{code}/matches - Matches of a competition, filterable
//!   by `dateFrom`, `dateTo` and `status`
//!
//! # Auth
//! Every request carries the `X-Auth-Token` header.
//!
//! # Source
//! - https://docs.football-data.org/general/v4/competition.html

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use url::Url;

use super::source::FixtureSource;
use crate::config::ProviderCredentials;
use crate::types::{Fixture, FixtureQuery, FixtureStatus, MatchesResponse};
use crate::FOOTBALL_DATA_API_BASE;

/// Auth header expected by the provider
const AUTH_HEADER: &str = "X-Auth-Token";

/// football-data.org client
#[derive(Clone)]
pub struct FootballDataClient {
    client: Client,
    base_url: String,
    credentials: ProviderCredentials,
}

impl FootballDataClient {
    /// Create a client against the public API
    pub fn new(credentials: ProviderCredentials) -> Result<Self> {
        Self::with_base_url(FOOTBALL_DATA_API_BASE, credentials)
    }

    /// Create a client with a custom base URL (mirrors, tests)
    pub fn with_base_url(base_url: &str, credentials: ProviderCredentials) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid base URL '{}'", base_url))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), credentials })
    }

    /// GET /competitions/{code}/matches
    pub async fn competition_matches(&self, query: &FixtureQuery) -> Result<MatchesResponse> {
        let url = format!("{}/competitions/{}/matches", self.base_url, query.competition);
        let mut params = vec![
            ("dateFrom", query.date_from.format("%Y-%m-%d").to_string()),
            ("dateTo", query.date_to.format("%Y-%m-%d").to_string()),
        ];
        if !query.statuses.is_empty() {
            let statuses: Vec<&str> = query.statuses.iter().map(FixtureStatus::as_str).collect();
            params.push(("status", statuses.join(",")));
        }
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.credentials.api_key)
            .query(&params)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            anyhow::bail!("Rate limited by provider for {}", query.competition);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        response.json().await.context("Failed to parse matches response")
    }

    /// Test connectivity and credentials
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity to {}", self.base_url);

        let url = format!("{}/competitions", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.credentials.api_key)
            .send()
            .await
            .context("Connection test failed")?;

        let status = response.status();
        info!("Provider connectivity test: HTTP {}", status);

        if !status.is_success() {
            anyhow::bail!("Provider returned HTTP {}", status);
        }
        Ok(())
    }
}

#[async_trait]
impl FixtureSource for FootballDataClient {
    async fn query(&self, query: &FixtureQuery) -> Result<Vec<Fixture>> {
        let response = self.competition_matches(query).await?;
        let total = response.matches.len();
        let fixtures: Vec<Fixture> = response
            .matches
            .into_iter()
            .filter_map(|m| m.into_fixture(&query.competition))
            .collect();
        if fixtures.len() < total {
            debug!(
                "{}: dropped {} matches with undecided teams",
                query.competition,
                total - fixtures.len()
            );
        }
        Ok(fixtures)
    }
}
