//! Battleboard runtime
//!
//! - Restores both watermarks from the configured store
//! - Connects the Discord sink
//! - Spawns the battle and kill polling tasks
//!
//! Usage:
//!   cargo run --release --bin battleboard
//!
//! Environment variables: see `BoardConfig::from_env`. Required:
//!   DISCORD_TOKEN, FEED_CHANNEL_ID, TRACKED_GUILDS

use battleboard::config::BoardConfig;
use battleboard::notify::{DiscordSink, NotificationSink};
use battleboard::scheduler::{PipelineContext, Scheduler, StreamTask};
use battleboard::upstream::{DataSource, GameInfoClient};
use battleboard::watermark::{open_store, Stream};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting battleboard...");

    let config = match BoardConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!("📊 Configuration:");
    info!("   ├─ Tracked: {}", config.tracked_names.join(", "));
    info!("   ├─ Alliance: {}", config.tracked_alliance.as_deref().unwrap_or("None"));
    info!(
        "   ├─ Battles: every {:?}, page {}, min {} players / {} tracked",
        config.battle_interval,
        config.battle_page_size,
        config.min_battle_players,
        config.min_relevant_players
    );
    info!(
        "   ├─ Kills: every {:?}, page {}, min fame {}, notable above {}",
        config.kill_interval, config.kill_page_size, config.min_kill_fame, config.notable_kill_fame
    );
    info!("   ├─ Upstream: {}", config.gameinfo_base_url);
    info!("   └─ Watermarks: {:?} at {}", config.store_backend, config.store_path.display());

    let store = open_store(config.store_backend, &config.store_path)?;
    let battles = StreamTask::restore(
        Stream::Battles,
        config.battle_interval,
        config.battle_page_size,
        config.tick_timeout,
        store.as_ref(),
    )?;
    let kills = StreamTask::restore(
        Stream::Kills,
        config.kill_interval,
        config.kill_page_size,
        config.tick_timeout,
        store.as_ref(),
    )?;
    info!(
        "✅ Watermarks restored ({}): battles {}, kills {}",
        store.backend_type(),
        battles.last_id(),
        kills.last_id()
    );

    let discord = DiscordSink::connect(
        config.discord_token.clone(),
        config.channels.clone(),
        config.report_style(),
    )
    .await?;
    let sink: Arc<dyn NotificationSink> = Arc::new(discord);
    let source: Arc<dyn DataSource> =
        Arc::new(GameInfoClient::new(config.gameinfo_base_url.clone())?);

    let ctx = Arc::new(PipelineContext {
        source,
        sink,
        store,
        rules: config.admission_rules(),
    });

    let scheduler = Scheduler::start(ctx, vec![battles, kills]);
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    scheduler.shutdown().await;
    info!("✅ battleboard stopped");
    Ok(())
}
