//! Game info API client
//!
//! ## API Reference
//!
//! - `GET {base}/battles?offset={o}&limit={l}&sort=recent` → array of battles,
//!   players keyed by player id
//! - `GET {base}/events?offset={o}&limit={l}` → array of kill events, or
//!   `null` while the killboard is catching up

use super::{DataSource, FetchError};
use crate::model::{KillEvent, RawBattle};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub struct GameInfoClient {
    client: reqwest::Client,
    base_url: String,
}

impl GameInfoClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("battleboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        parse_list(&body)
    }
}

/// Parse a list body; `null` is an empty page
fn parse_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, FetchError> {
    let items: Option<Vec<T>> = serde_json::from_str(body)?;
    Ok(items.unwrap_or_default())
}

#[async_trait]
impl DataSource for GameInfoClient {
    async fn fetch_recent_battles(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RawBattle>, FetchError> {
        self.get_list(
            "battles",
            &[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("sort", "recent".to_string()),
            ],
        )
        .await
    }

    async fn fetch_recent_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<KillEvent>, FetchError> {
        self.get_list(
            "events",
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }
}
