//! Upstream data source
//!
//! Both reads return a bounded recency window. Results are not guaranteed to
//! be sorted; identifiers are strictly increasing over the stream's lifetime.

pub mod gameinfo;

use crate::model::{KillEvent, RawBattle};
use async_trait::async_trait;

pub use gameinfo::GameInfoClient;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("upstream unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("malformed upstream response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_recent_battles(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RawBattle>, FetchError>;

    async fn fetch_recent_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<KillEvent>, FetchError>;
}
