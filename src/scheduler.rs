//! Ingestion scheduler
//!
//! Two independent periodic tasks, one per stream, each running the cycle:
//!
//! ```text
//! Idle ──tick──► Fetching ──page──► Processing ──► Idle
//!                   │ FetchError          │
//!                   └────────► Idle       ├─ sort ascending, drop ids ≤ watermark
//!                                         ├─ aggregate (battles) + admission filter
//!                                         ├─ per admitted item, in id order:
//!                                         │    persist its id, then deliver it
//!                                         └─ persist max(watermark, max id)
//! ```
//!
//! An item's id is persisted before it is delivered, so a crash or timeout
//! can lose the notification in flight but never repeat one. Items after it
//! stay above the watermark and are picked up by the next tick. A tick of one
//! stream never overlaps the next tick of the same stream: the task awaits
//! each cycle (bounded by `tick_timeout`) before polling its timer again, and
//! missed ticks are skipped. The two streams run on separate tasks and share
//! nothing but the watermark store, where they own disjoint keys.

use crate::battle::{Battle, EmptyBattleError};
use crate::filter::{admit_battle, admit_kill, AdmissionRules};
use crate::model::{Identified, KillEvent, RawBattle};
use crate::notify::NotificationSink;
use crate::upstream::{DataSource, FetchError};
use crate::watermark::{Stream, WatermarkError, WatermarkStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Collaborators shared by both streams
pub struct PipelineContext {
    pub source: Arc<dyn DataSource>,
    pub sink: Arc<dyn NotificationSink>,
    pub store: Arc<dyn WatermarkStore>,
    pub rules: AdmissionRules,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("watermark not persisted: {0}")]
    Persist(#[from] WatermarkError),
    #[error("watermark persistence task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Items that survived a processing pass
#[derive(Debug)]
pub struct Selection<T> {
    /// Admitted items, ascending by id
    pub admitted: Vec<T>,
    /// Items above the watermark, admitted or not
    pub fresh: usize,
    /// Watermark to persist: max of the previous one and every fetched id
    pub high_water: u64,
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub fetched: usize,
    pub fresh: usize,
    pub admitted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub watermark: u64,
}

impl CycleOutcome {
    fn for_selection<T>(fetched: usize, selection: &Selection<T>) -> Self {
        Self {
            fetched,
            fresh: selection.fresh,
            admitted: selection.admitted.len(),
            ..Self::default()
        }
    }
}

/// Sort ascending and drop everything at or below `watermark`
///
/// Returns the fresh items and the new high-water mark.
pub fn fresh_in_order<T: Identified>(mut items: Vec<T>, watermark: u64) -> (Vec<T>, u64) {
    items.sort_by_key(|item| item.id());
    let high_water = items.last().map_or(watermark, |item| item.id().max(watermark));
    items.retain(|item| item.id() > watermark);
    (items, high_water)
}

/// Aggregate and filter a battle page
///
/// Empty battles are logged and dropped but still count towards the
/// high-water mark.
pub fn select_battles(
    page: Vec<RawBattle>,
    watermark: u64,
    rules: &AdmissionRules,
) -> Selection<Battle> {
    let (fresh, high_water) = fresh_in_order(page, watermark);
    let fresh_count = fresh.len();

    let admitted = fresh
        .into_iter()
        .filter_map(|raw| match Battle::from_raw(raw) {
            Ok(battle) => Some(battle),
            Err(EmptyBattleError { battle_id }) => {
                log::warn!("⚠️  Dropping battle {}: no players", battle_id);
                None
            }
        })
        .filter(|battle| match admit_battle(battle, watermark, rules) {
            Ok(()) => true,
            Err(reason) => {
                log::debug!("Skipping battle {}: {}", battle.id, reason);
                false
            }
        })
        .collect();

    Selection {
        admitted,
        fresh: fresh_count,
        high_water,
    }
}

/// Filter a kill event page
pub fn select_kills(
    page: Vec<KillEvent>,
    watermark: u64,
    rules: &AdmissionRules,
) -> Selection<KillEvent> {
    let (fresh, high_water) = fresh_in_order(page, watermark);
    let fresh_count = fresh.len();

    let admitted = fresh
        .into_iter()
        .filter(|event| match admit_kill(event, watermark, rules) {
            Ok(()) => true,
            Err(reason) => {
                log::debug!("Skipping kill {}: {}", event.event_id, reason);
                false
            }
        })
        .collect();

    Selection {
        admitted,
        fresh: fresh_count,
        high_water,
    }
}

/// Per-stream polling state
#[derive(Debug, Clone)]
pub struct StreamTask {
    pub stream: Stream,
    pub interval: Duration,
    pub page_size: usize,
    pub tick_timeout: Duration,
    last_id: u64,
}

impl StreamTask {
    pub fn new(
        stream: Stream,
        interval: Duration,
        page_size: usize,
        tick_timeout: Duration,
        last_id: u64,
    ) -> Self {
        Self {
            stream,
            interval,
            page_size,
            tick_timeout,
            last_id,
        }
    }

    /// Build a task whose watermark is restored from `store`
    pub fn restore(
        stream: Stream,
        interval: Duration,
        page_size: usize,
        tick_timeout: Duration,
        store: &dyn WatermarkStore,
    ) -> Result<Self, WatermarkError> {
        let last_id = store.get(stream)?;
        Ok(Self::new(stream, interval, page_size, tick_timeout, last_id))
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Run one full cycle
    ///
    /// Each admitted item's id is persisted right before it is delivered, and
    /// the page's high-water mark once delivery is done. A cycle cut off part
    /// way leaves only items it never attempted above the watermark.
    pub async fn tick(&mut self, ctx: &PipelineContext) -> Result<CycleOutcome, CycleError> {
        match self.stream {
            Stream::Battles => {
                let page = ctx.source.fetch_recent_battles(self.page_size, 0).await?;
                let fetched = page.len();
                let selection = select_battles(page, self.last_id, &ctx.rules);
                let mut outcome = CycleOutcome::for_selection(fetched, &selection);

                for battle in &selection.admitted {
                    self.persist(ctx, battle.id).await?;
                    match ctx.sink.send_battle_report(battle).await {
                        Ok(()) => outcome.delivered += 1,
                        Err(e) => {
                            outcome.failed += 1;
                            log::error!("❌ Failed to deliver battle {}: {}", battle.id, e);
                        }
                    }
                }

                self.persist(ctx, selection.high_water).await?;
                outcome.watermark = self.last_id;
                Ok(outcome)
            }
            Stream::Kills => {
                let page = ctx.source.fetch_recent_events(self.page_size, 0).await?;
                let fetched = page.len();
                let selection = select_kills(page, self.last_id, &ctx.rules);
                let mut outcome = CycleOutcome::for_selection(fetched, &selection);

                for event in &selection.admitted {
                    self.persist(ctx, event.event_id).await?;
                    match ctx.sink.send_kill_report(event).await {
                        Ok(()) => outcome.delivered += 1,
                        Err(e) => {
                            outcome.failed += 1;
                            log::error!("❌ Failed to deliver kill {}: {}", event.event_id, e);
                        }
                    }
                }

                self.persist(ctx, selection.high_water).await?;
                outcome.watermark = self.last_id;
                Ok(outcome)
            }
        }
    }

    /// Re-read the persisted watermark after an abandoned cycle
    ///
    /// A cycle cut off mid-persist may still have reached the store.
    pub async fn resync(&mut self, ctx: &PipelineContext) -> Result<u64, CycleError> {
        let store = ctx.store.clone();
        let stream = self.stream;
        let persisted = tokio::task::spawn_blocking(move || store.get(stream)).await??;
        self.last_id = self.last_id.max(persisted);
        Ok(self.last_id)
    }

    /// Durably move the watermark up to `id`, then adopt it in memory
    async fn persist(&mut self, ctx: &PipelineContext, id: u64) -> Result<(), CycleError> {
        if id <= self.last_id {
            return Ok(());
        }

        let store = ctx.store.clone();
        let stream = self.stream;
        tokio::task::spawn_blocking(move || store.set(stream, id)).await??;
        self.last_id = id;
        Ok(())
    }
}

/// Drive `task` until `shutdown` flips to true
pub async fn run_stream_task(
    mut task: StreamTask,
    ctx: Arc<PipelineContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!(
        "⏰ Starting {} task (interval: {:?}, page: {}, watermark: {})",
        task.stream,
        task.interval,
        task.page_size,
        task.last_id
    );

    let mut timer = interval(task.interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                log::info!("Checking {}...", task.stream);
                let started = Instant::now();
                let before = task.last_id;

                match timeout(task.tick_timeout, task.tick(&ctx)).await {
                    Ok(Ok(outcome)) => {
                        log::info!(
                            "📊 {} cycle: fetched {}, fresh {}, admitted {}, delivered {}, \
                             failed {} | watermark {} → {} | {}ms",
                            task.stream,
                            outcome.fetched,
                            outcome.fresh,
                            outcome.admitted,
                            outcome.delivered,
                            outcome.failed,
                            before,
                            outcome.watermark,
                            started.elapsed().as_millis()
                        );
                    }
                    Ok(Err(e)) => {
                        log::warn!(
                            "⚠️  {} cycle skipped: {} (watermark at {})",
                            task.stream,
                            e,
                            task.last_id
                        );
                    }
                    Err(_) => {
                        log::warn!(
                            "⚠️  {} cycle abandoned after {:?}",
                            task.stream,
                            task.tick_timeout
                        );
                        match task.resync(&ctx).await {
                            Ok(last_id) => {
                                log::info!("{} watermark resynced at {}", task.stream, last_id)
                            }
                            Err(e) => {
                                log::error!("❌ Failed to resync {} watermark: {}", task.stream, e)
                            }
                        }
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    log::info!("✅ {} task stopped at watermark {}", task.stream, task.last_id);
}

/// Cancellation handle for one stream task
pub struct TaskHandle {
    pub stream: Stream,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            log::error!("❌ {} task ended abnormally: {}", self.stream, e);
        }
    }
}

pub fn spawn_stream_task(task: StreamTask, ctx: Arc<PipelineContext>) -> TaskHandle {
    let (shutdown, rx) = watch::channel(false);
    let stream = task.stream;
    let join = tokio::spawn(run_stream_task(task, ctx, rx));
    TaskHandle { stream, shutdown, join }
}

/// Both stream tasks
pub struct Scheduler {
    handles: Vec<TaskHandle>,
}

impl Scheduler {
    pub fn start(ctx: Arc<PipelineContext>, tasks: Vec<StreamTask>) -> Self {
        let handles = tasks
            .into_iter()
            .map(|task| spawn_stream_task(task, ctx.clone()))
            .collect();
        Self { handles }
    }

    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.stop().await;
        }
    }
}
