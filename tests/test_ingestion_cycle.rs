//! Integration tests for the ingestion cycle
//!
//! Drives `StreamTask` and `Scheduler` against scripted upstream pages and a
//! recording sink, checking watermark progress and delivery order.

#[cfg(test)]
mod ingestion_cycle_tests {
    use async_trait::async_trait;
    use battleboard::battle::Battle;
    use battleboard::filter::AdmissionRules;
    use battleboard::model::{Combatant, Equipment, KillEvent, RawBattle, RawPlayerRecord};
    use battleboard::notify::{DeliveryError, NotificationSink};
    use battleboard::scheduler::{CycleError, PipelineContext, Scheduler, StreamTask};
    use battleboard::upstream::{DataSource, FetchError};
    use battleboard::watermark::{
        JsonFileWatermarkStore, MemoryWatermarkStore, Stream, WatermarkStore,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Upstream replaying one scripted page per call; `None` fails the fetch
    #[derive(Default)]
    struct ScriptedSource {
        battles: Mutex<VecDeque<Option<Vec<RawBattle>>>>,
        events: Mutex<VecDeque<Option<Vec<KillEvent>>>>,
        always_fail_events: bool,
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        async fn fetch_recent_battles(
            &self,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<RawBattle>, FetchError> {
            match self.battles.lock().unwrap().pop_front() {
                Some(Some(page)) => Ok(page),
                Some(None) => Err(FetchError::Status { status: 503 }),
                None => Ok(Vec::new()),
            }
        }

        async fn fetch_recent_events(
            &self,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<KillEvent>, FetchError> {
            if self.always_fail_events {
                return Err(FetchError::Status { status: 502 });
            }
            match self.events.lock().unwrap().pop_front() {
                Some(Some(page)) => Ok(page),
                Some(None) => Err(FetchError::Status { status: 503 }),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Records delivered ids; ids in `fail_ids` fail delivery and the first
    /// send of `hang_once_on` never completes
    #[derive(Default)]
    struct RecordingSink {
        battles: Mutex<Vec<u64>>,
        kills: Mutex<Vec<u64>>,
        fail_ids: Vec<u64>,
        hang_once_on: Option<u64>,
        hung: AtomicBool,
    }

    impl RecordingSink {
        async fn maybe_hang(&self, id: u64) {
            if self.hang_once_on == Some(id) && !self.hung.swap(true, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send_battle_report(&self, battle: &Battle) -> Result<(), DeliveryError> {
            self.maybe_hang(battle.id).await;
            if self.fail_ids.contains(&battle.id) {
                return Err(DeliveryError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.battles.lock().unwrap().push(battle.id);
            Ok(())
        }

        async fn send_kill_report(&self, event: &KillEvent) -> Result<(), DeliveryError> {
            self.maybe_hang(event.event_id).await;
            if self.fail_ids.contains(&event.event_id) {
                return Err(DeliveryError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.kills.lock().unwrap().push(event.event_id);
            Ok(())
        }
    }

    fn rules() -> AdmissionRules {
        AdmissionRules::new(["Wolves"], 2, 1, 1_000)
    }

    fn battle(id: u64) -> RawBattle {
        RawBattle {
            id,
            start_time: None,
            total_fame: None,
            total_kills: None,
            players: ["Wolves", "Crows"]
                .iter()
                .enumerate()
                .map(|(i, guild)| RawPlayerRecord {
                    name: format!("p{}-{}", id, i),
                    guild_name: Some(guild.to_string()),
                    alliance_name: None,
                    kills: 1,
                    deaths: 0,
                    kill_fame: 100 * (i as u64 + 1),
                })
                .collect(),
        }
    }

    fn kill(id: u64, fame: u64) -> KillEvent {
        let c = |name: &str, guild: Option<&str>| Combatant {
            name: name.to_string(),
            guild_name: guild.map(str::to_string),
            alliance_name: None,
            equipment: Equipment::default(),
        };
        KillEvent {
            event_id: id,
            timestamp: None,
            total_fame: fame,
            number_of_participants: Some(1),
            group_members: vec![],
            killer: c("killer", Some("Wolves")),
            victim: c("victim", Some("Crows")),
        }
    }

    fn context(
        source: ScriptedSource,
        sink: Arc<RecordingSink>,
        store: Arc<dyn WatermarkStore>,
    ) -> PipelineContext {
        PipelineContext {
            source: Arc::new(source),
            sink,
            store,
            rules: rules(),
        }
    }

    fn task(stream: Stream, last_id: u64) -> StreamTask {
        StreamTask::new(stream, Duration::from_millis(20), 20, Duration::from_secs(5), last_id)
    }

    fn restore(stream: Stream, store: &dyn WatermarkStore) -> StreamTask {
        StreamTask::restore(stream, Duration::from_secs(60), 20, Duration::from_secs(5), store)
            .unwrap()
    }

    #[tokio::test]
    async fn test_unsorted_page_delivered_in_order() {
        let source = ScriptedSource::default();
        let page = vec![battle(101), battle(103), battle(99)];
        source.battles.lock().unwrap().push_back(Some(page));
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryWatermarkStore::with_marks(100, 0));
        let ctx = context(source, sink.clone(), store.clone());

        let mut battles = task(Stream::Battles, 100);
        let outcome = battles.tick(&ctx).await.unwrap();

        assert_eq!(*sink.battles.lock().unwrap(), vec![101, 103]);
        assert_eq!(outcome.fetched, 3);
        assert_eq!(outcome.fresh, 2);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.watermark, 103);
        assert_eq!(battles.last_id(), 103);
        assert_eq!(store.get(Stream::Battles).unwrap(), 103);
    }

    #[tokio::test]
    async fn test_items_never_readmitted_across_cycles() {
        let source = ScriptedSource::default();
        {
            let mut events = source.events.lock().unwrap();
            events.push_back(Some(vec![kill(3, 5_000), kill(1, 5_000), kill(2, 5_000)]));
            // Overlapping window plus one new id
            events.push_back(Some(vec![kill(2, 5_000), kill(4, 5_000), kill(3, 5_000)]));
            events.push_back(Some(vec![kill(4, 5_000)]));
        }
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryWatermarkStore::new());
        let ctx = context(source, sink.clone(), store.clone());

        let mut kills = task(Stream::Kills, 0);
        let mut previous = kills.last_id();
        for _ in 0..3 {
            kills.tick(&ctx).await.unwrap();
            assert!(kills.last_id() >= previous);
            previous = kills.last_id();
        }

        assert_eq!(*sink.kills.lock().unwrap(), vec![1, 2, 3, 4]);
        let writes: Vec<u64> = store.writes().into_iter().map(|(_, id)| id).collect();
        assert_eq!(writes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_watermark() {
        let source = ScriptedSource::default();
        {
            let mut events = source.events.lock().unwrap();
            events.push_back(None);
            events.push_back(Some(vec![kill(8, 5_000)]));
        }
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryWatermarkStore::with_marks(0, 7));
        let ctx = context(source, sink.clone(), store.clone());

        let mut kills = task(Stream::Kills, 7);
        let err = kills.tick(&ctx).await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch(_)));
        assert_eq!(kills.last_id(), 7);
        assert!(store.writes().is_empty());

        // Retry resumes from the same point
        kills.tick(&ctx).await.unwrap();
        assert_eq!(*sink.kills.lock().unwrap(), vec![8]);
        assert_eq!(kills.last_id(), 8);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_block_watermark() {
        let source = ScriptedSource::default();
        let page = vec![kill(10, 5_000), kill(11, 5_000), kill(12, 5_000)];
        source.events.lock().unwrap().push_back(Some(page));
        let sink = Arc::new(RecordingSink {
            fail_ids: vec![11],
            ..RecordingSink::default()
        });
        let store = Arc::new(MemoryWatermarkStore::new());
        let ctx = context(source, sink.clone(), store.clone());

        let mut kills = task(Stream::Kills, 9);
        let outcome = kills.tick(&ctx).await.unwrap();

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(*sink.kills.lock().unwrap(), vec![10, 12]);
        assert_eq!(store.get(Stream::Kills).unwrap(), 12);
    }

    #[tokio::test]
    async fn test_filtered_and_empty_items_still_advance() {
        let source = ScriptedSource::default();
        {
            let mut battles = source.battles.lock().unwrap();
            let mut empty = battle(21);
            empty.players.clear();
            battles.push_back(Some(vec![empty, battle(20)]));
            battles.push_back(Some(vec![]));
        }
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryWatermarkStore::new());
        let ctx = context(source, sink.clone(), store.clone());

        let mut battles = task(Stream::Battles, 0);
        battles.tick(&ctx).await.unwrap();
        assert_eq!(*sink.battles.lock().unwrap(), vec![20]);
        assert_eq!(battles.last_id(), 21);

        // Empty page is a no-op cycle
        let outcome = battles.tick(&ctx).await.unwrap();
        assert_eq!(outcome.fetched, 0);
        assert_eq!(battles.last_id(), 21);
        assert_eq!(store.writes(), vec![(Stream::Battles, 20), (Stream::Battles, 21)]);
    }

    #[tokio::test]
    async fn test_watermark_restored_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".db.json");

        {
            let source = ScriptedSource::default();
            source.battles.lock().unwrap().push_back(Some(vec![battle(5), battle(6)]));
            let store: Arc<dyn WatermarkStore> =
                Arc::new(JsonFileWatermarkStore::open(&path).unwrap());
            let ctx = context(source, Arc::new(RecordingSink::default()), store.clone());
            let mut battles = restore(Stream::Battles, store.as_ref());
            battles.tick(&ctx).await.unwrap();
        }

        let source = ScriptedSource::default();
        let page = vec![battle(5), battle(6), battle(7)];
        source.battles.lock().unwrap().push_back(Some(page));
        let store: Arc<dyn WatermarkStore> =
            Arc::new(JsonFileWatermarkStore::open(&path).unwrap());
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(source, sink.clone(), store.clone());
        let mut battles = restore(Stream::Battles, store.as_ref());
        assert_eq!(battles.last_id(), 6);

        battles.tick(&ctx).await.unwrap();
        assert_eq!(*sink.battles.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_failing_kill_stream_does_not_stall_battles() {
        let source = ScriptedSource {
            always_fail_events: true,
            ..ScriptedSource::default()
        };
        source.battles.lock().unwrap().push_back(Some(vec![battle(50), battle(51)]));
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryWatermarkStore::with_marks(49, 300));
        let ctx = Arc::new(context(source, sink.clone(), store.clone()));

        let tasks = vec![task(Stream::Battles, 49), task(Stream::Kills, 300)];
        let scheduler = Scheduler::start(ctx, tasks);
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.shutdown().await;

        assert_eq!(*sink.battles.lock().unwrap(), vec![50, 51]);
        assert_eq!(store.get(Stream::Battles).unwrap(), 51);
        assert_eq!(store.get(Stream::Kills).unwrap(), 300);
        assert!(sink.kills.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_tick_keeps_unattempted_items() {
        let source = ScriptedSource::default();
        {
            let mut events = source.events.lock().unwrap();
            events.push_back(Some(vec![kill(12, 5_000), kill(10, 5_000), kill(11, 5_000)]));
            events.push_back(Some(vec![kill(10, 5_000), kill(11, 5_000), kill(12, 5_000)]));
        }
        let sink = Arc::new(RecordingSink {
            hang_once_on: Some(11),
            ..RecordingSink::default()
        });
        let store = Arc::new(MemoryWatermarkStore::with_marks(0, 9));
        let ctx = context(source, sink.clone(), store.clone());

        let mut kills = task(Stream::Kills, 9);
        let abandoned = tokio::time::timeout(Duration::from_millis(100), kills.tick(&ctx)).await;
        assert!(abandoned.is_err());

        // 11 was attempted, 12 never was
        assert_eq!(kills.resync(&ctx).await.unwrap(), 11);
        assert_eq!(kills.last_id(), store.get(Stream::Kills).unwrap());
        assert_eq!(*sink.kills.lock().unwrap(), vec![10]);

        let outcome = kills.tick(&ctx).await.unwrap();
        assert_eq!(outcome.fresh, 1);
        assert_eq!(*sink.kills.lock().unwrap(), vec![10, 12]);
        assert_eq!(store.get(Stream::Kills).unwrap(), 12);
    }

    #[tokio::test]
    async fn test_hung_kill_tick_abandoned_while_battles_continue() {
        let source = ScriptedSource::default();
        {
            let mut battles = source.battles.lock().unwrap();
            battles.push_back(Some(vec![battle(50)]));
            battles.push_back(Some(vec![battle(50), battle(51)]));
        }
        {
            let mut events = source.events.lock().unwrap();
            for _ in 0..3 {
                events.push_back(Some(vec![kill(10, 5_000), kill(11, 5_000), kill(12, 5_000)]));
            }
        }
        let sink = Arc::new(RecordingSink {
            hang_once_on: Some(11),
            ..RecordingSink::default()
        });
        let store = Arc::new(MemoryWatermarkStore::with_marks(49, 9));
        let ctx = Arc::new(context(source, sink.clone(), store.clone()));

        let kills = StreamTask::new(
            Stream::Kills,
            Duration::from_millis(20),
            20,
            Duration::from_millis(100),
            9,
        );
        let scheduler = Scheduler::start(ctx, vec![task(Stream::Battles, 49), kills]);
        tokio::time::sleep(Duration::from_millis(600)).await;
        scheduler.shutdown().await;

        assert_eq!(*sink.battles.lock().unwrap(), vec![50, 51]);
        assert_eq!(*sink.kills.lock().unwrap(), vec![10, 12]);
        assert_eq!(store.get(Stream::Battles).unwrap(), 51);
        assert_eq!(store.get(Stream::Kills).unwrap(), 12);
    }
}
