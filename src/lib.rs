//! battleboard
//!
//! Polls the game info API for recent battles and kill events, drops anything
//! already seen or irrelevant to the tracked guilds, aggregates battles into
//! ranked faction summaries, and posts at-most-once reports to Discord.
//!
//! ## Module Organization
//!
//! - `model` - Upstream record types
//! - `battle` - Battle aggregation and faction ranking
//! - `filter` - Admission rules for battles and kills
//! - `watermark` - Durable per-stream watermarks
//! - `upstream` - Data source trait and HTTP client
//! - `notify` - Report classification, rendering and delivery
//! - `scheduler` - Periodic ingestion cycles
//! - `config` - Environment configuration

pub mod battle;
pub mod config;
pub mod filter;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod upstream;
pub mod watermark;

pub use battle::{Battle, EmptyBattleError, Faction, FactionKind};
pub use config::{BoardConfig, ConfigError};
pub use filter::AdmissionRules;
pub use model::{KillEvent, RawBattle, RawPlayerRecord};
pub use notify::{NotificationSink, ReportKind};
pub use scheduler::{PipelineContext, Scheduler, StreamTask};
pub use upstream::DataSource;
pub use watermark::{Stream, WatermarkStore};
