//! Notification sink
//!
//! Qualifying items are classified into a `ReportKind`, rendered by the
//! matching renderer in `embed`, and delivered to the channel configured for
//! that kind. Classification is pure and independent of delivery.
//!
//! ```text
//! Battle ──classify_battle──► StandardBattle | FiveVFive
//! KillEvent ─classify_kill──► MinimalKill | NotableKill
//!                  │
//!                  ▼
//!        embed::render_* ──► Embed ──► NotificationSink
//! ```

pub mod backoff;
pub mod discord;
pub mod embed;

use crate::battle::Battle;
use crate::model::{Combatant, KillEvent};
use async_trait::async_trait;

pub use discord::DiscordSink;
pub use embed::Embed;

/// Every report category, used for channel routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    StandardBattle,
    FiveVFive,
    MinimalKill,
    NotableKill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BattleReport {
    Standard,
    FiveVFive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KillReport {
    Minimal,
    Notable,
}

impl From<BattleReport> for ReportKind {
    fn from(report: BattleReport) -> Self {
        match report {
            BattleReport::Standard => ReportKind::StandardBattle,
            BattleReport::FiveVFive => ReportKind::FiveVFive,
        }
    }
}

impl From<KillReport> for ReportKind {
    fn from(report: KillReport) -> Self {
        match report {
            KillReport::Minimal => ReportKind::MinimalKill,
            KillReport::Notable => ReportKind::NotableKill,
        }
    }
}

pub fn classify_battle(battle: &Battle) -> BattleReport {
    if battle.is_5v5() {
        BattleReport::FiveVFive
    } else {
        BattleReport::Standard
    }
}

/// Notable iff fame strictly exceeds the notable threshold
pub fn classify_kill(event: &KillEvent, notable_fame: u64) -> KillReport {
    if event.total_fame > notable_fame {
        KillReport::Notable
    } else {
        KillReport::Minimal
    }
}

/// Destination channel per report category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    pub feed: String,
    pub five_v_five: String,
    pub kills: String,
}

impl ChannelMap {
    pub fn channel_for(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::StandardBattle => &self.feed,
            ReportKind::FiveVFive => &self.five_v_five,
            ReportKind::MinimalKill | ReportKind::NotableKill => &self.kills,
        }
    }
}

/// Inputs the renderers need beyond the item itself
#[derive(Debug, Clone, Default)]
pub struct ReportStyle {
    pub tracked_names: Vec<String>,
    pub tracked_alliance: Option<String>,
    pub notable_kill_fame: u64,
}

impl ReportStyle {
    pub fn is_friendly(&self, combatant: &Combatant) -> bool {
        [&combatant.guild_name, &combatant.alliance_name]
            .into_iter()
            .flatten()
            .any(|n| self.tracked_names.iter().any(|t| t == n))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("rate limited, gave up after {attempts} attempts")]
    RateLimited { attempts: u32 },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_battle_report(&self, battle: &Battle) -> Result<(), DeliveryError>;

    async fn send_kill_report(&self, event: &KillEvent) -> Result<(), DeliveryError>;
}
