//! Discord delivery over the REST API
//!
//! Messages are posted with `POST /channels/{id}/messages` using a bot token.
//! HTTP 429 responses are retried with `ExponentialBackoff`, honouring the
//! `retry_after` hint Discord returns; any other failure is reported to the
//! caller as a `DeliveryError` without retrying.

use super::backoff::ExponentialBackoff;
use super::embed::{battle_title, render_battle, render_kill, Embed};
use super::{ChannelMap, DeliveryError, NotificationSink, ReportStyle};
use crate::battle::Battle;
use crate::model::KillEvent;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DISCORD_API_URL: &str = "https://discord.com/api/v10";

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    embeds: [&'a Embed; 1],
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
    username: String,
}

pub struct DiscordSink {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channels: ChannelMap,
    style: ReportStyle,
    max_retries: u32,
}

impl DiscordSink {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        channels: ChannelMap,
        style: ReportStyle,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channels,
            style,
            max_retries: 3,
        })
    }

    /// Build the sink and verify the token against `/users/@me`
    pub async fn connect(
        token: impl Into<String>,
        channels: ChannelMap,
        style: ReportStyle,
    ) -> Result<Self, DeliveryError> {
        let sink = Self::new(DISCORD_API_URL, token, channels, style)?;

        let response = sink
            .client
            .get(format!("{}/users/@me", sink.api_url))
            .header(reqwest::header::AUTHORIZATION, sink.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        let user: CurrentUser = response.json().await?;
        log::info!("Connected");
        log::info!("Logged in as: {} - ({})", user.username, user.id);

        Ok(sink)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn post_embed(&self, channel_id: &str, embed: &Embed) -> Result<(), DeliveryError> {
        let url = format!("{}/channels/{}/messages", self.api_url, channel_id);
        let payload = CreateMessage { embeds: [embed] };
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(500),
            Duration::from_secs(10),
            self.max_retries,
        );

        loop {
            let response = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint = response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|body| body.retry_after)
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64);

                if backoff.sleep(hint).await.is_err() {
                    return Err(DeliveryError::RateLimited {
                        attempts: backoff.attempts() + 1,
                    });
                }
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send_battle_report(&self, battle: &Battle) -> Result<(), DeliveryError> {
        log::info!("sendBattleReport {}...", battle.id);
        let (kind, embed) = render_battle(battle, &self.style, chrono::Utc::now());
        self.post_embed(self.channels.channel_for(kind), &embed).await?;
        log::info!("Successfully posted log of battle between {}.", battle_title(battle));
        Ok(())
    }

    async fn send_kill_report(&self, event: &KillEvent) -> Result<(), DeliveryError> {
        log::info!("sendKillReport {}...", event.event_id);
        let (kind, embed) = render_kill(event, &self.style, chrono::Utc::now());
        self.post_embed(self.channels.channel_for(kind), &embed).await?;
        log::info!(
            "Successfully posted log of {} killing {}.",
            event.killer.display_name(),
            event.victim.display_name()
        );
        Ok(())
    }
}
