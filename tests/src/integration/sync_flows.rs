//! # Sync Flows
//!
//! A publisher emits one generation per day; the engine follows it with
//! cold loads, deltas and full replacements.
//!
//! ## Flows Tested:
//!
//! 1. **Daily deltas**: each day's delta is merged into every threshold
//! 2. **Restart**: a second engine on the same store resumes without downloads
//! 3. **Long absence**: a gap wider than the staleness window forces full downloads
//! 4. **Outage**: a failed tick keeps serving the old filters
//! 5. **Mode switch**: single and multiple mode reload the right thresholds

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use seen_filters::{
        FilterMode, FixedClock, InMemoryFilterStore, MurmurBackend, SeenFilterApi,
        StaticSnapshotSource, SyncConfig, SyncEngine, SyncError, SyncOutcome,
    };

    use crate::fixtures::{Publisher, DAY};

    type Engine = SyncEngine<MurmurBackend, StaticSnapshotSource, InMemoryFilterStore, FixedClock>;

    const T0: u64 = 1_700_000_000;

    fn engine(
        publisher: &Publisher,
        store: &InMemoryFilterStore,
        clock: &FixedClock,
        mode: FilterMode,
    ) -> Engine {
        SyncEngine::new(
            SyncConfig::for_testing().with_mode(mode),
            MurmurBackend,
            publisher.source.clone(),
            store.clone(),
            clock.clone(),
        )
    }

    fn set(thresholds: &[u32]) -> BTreeSet<u32> {
        thresholds.iter().copied().collect()
    }

    // =========================================================================
    // DAILY DELTAS
    // =========================================================================

    #[tokio::test]
    async fn test_week_of_daily_deltas() {
        let mut publisher = Publisher::new(&[0, 10, 100]);
        publisher.publish_full(
            T0,
            &[("https://a.example/one", 5), ("https://b.example/two", 150)],
        );
        let store = InMemoryFilterStore::new();
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &store, &clock, FilterMode::Multiple);

        assert_eq!(engine.init().await.unwrap(), SyncOutcome::ColdLoaded);
        assert_eq!(engine.query_set("https://a.example/one").await, set(&[0]));
        assert_eq!(engine.query_set("https://b.example/two").await, set(&[0, 10, 100]));

        for day in 1..=6u64 {
            let since = T0 + (day - 1) * DAY;
            let generated = T0 + day * DAY;
            let url = format!("https://day{}.example/story", day);
            publisher.publish_delta(since, generated, &format!("day{}", day), &[(url.as_str(), 20)]);
            clock.set(generated + 60);

            let outcome = engine.tick(false).await.unwrap();

            assert_eq!(
                outcome,
                SyncOutcome::Updated {
                    replaced: 0,
                    patched: 3,
                    skipped: 0
                },
                "day {}",
                day
            );
            assert_eq!(engine.query_set(&url).await, set(&[0, 10]));
        }

        assert_eq!(engine.query_set("https://day1.example/story").await, set(&[0, 10]));
        assert_eq!(engine.query_set("https://a.example/one").await, set(&[0]));
        assert_eq!(publisher.source.blob_fetches().len(), 3 + 6 * 3);

        let status = engine.status().await;
        assert!(status.records.iter().all(|r| r.last_generated == T0 + 6 * DAY));
    }

    #[tokio::test]
    async fn test_tick_before_next_generation_is_fresh() {
        let publisher = Publisher::new(&[0]);
        publisher.publish_full(T0, &[]);
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &InMemoryFilterStore::new(), &clock, FilterMode::Single);
        engine.init().await.unwrap();

        clock.set(T0 + DAY - 1);

        assert_eq!(engine.tick(false).await.unwrap(), SyncOutcome::Fresh);
        assert_eq!(publisher.source.manifest_fetches(), 1);
    }

    // =========================================================================
    // RESTART
    // =========================================================================

    #[tokio::test]
    async fn test_restart_resumes_from_storage() {
        let mut publisher = Publisher::new(&[0, 10, 100]);
        publisher.publish_full(T0, &[("https://a.example/one", 50)]);
        let store = InMemoryFilterStore::new();
        let clock = FixedClock::new(T0 + 60);

        {
            let first = engine(&publisher, &store, &clock, FilterMode::Multiple);
            first.init().await.unwrap();
            first.insert_set("https://local.example/read", 12).await.unwrap();
        }
        let downloads = publisher.source.blob_fetches().len();

        let second = engine(&publisher, &store, &clock, FilterMode::Multiple);
        assert_eq!(second.init().await.unwrap(), SyncOutcome::Fresh);
        assert_eq!(publisher.source.blob_fetches().len(), downloads);
        assert_eq!(second.query_set("https://local.example/read").await, set(&[0, 10]));
        assert_eq!(second.query_set("https://a.example/one").await, set(&[0, 10]));

        publisher.publish_delta(T0, T0 + DAY, "day1", &[("https://c.example/new", 0)]);
        clock.set(T0 + DAY + 60);

        let outcome = second.tick(false).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Updated { patched: 3, .. }));
        assert_eq!(second.query_set("https://local.example/read").await, set(&[0, 10]));
        assert_eq!(second.query_set("https://c.example/new").await, set(&[0]));
    }

    // =========================================================================
    // LONG ABSENCE
    // =========================================================================

    #[tokio::test]
    async fn test_long_absence_replaces_every_filter() {
        let mut publisher = Publisher::new(&[0, 10]);
        publisher.publish_full(T0, &[("https://old.example", 50)]);
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &InMemoryFilterStore::new(), &clock, FilterMode::Multiple);
        engine.init().await.unwrap();

        let now = T0 + 9 * DAY;
        publisher.publish_full(now, &[("https://new.example", 50)]);
        publisher.publish_delta(now - DAY, now, "day9", &[]);
        clock.set(now + 60);

        let outcome = engine.tick(false).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                replaced: 2,
                patched: 0,
                skipped: 0
            }
        );
        assert!(engine.query_set("https://old.example").await.is_empty());
        assert_eq!(engine.query_set("https://new.example").await, set(&[0, 10]));
        assert!(!publisher
            .source
            .blob_fetches()
            .iter()
            .any(|name| name.contains("day9")));
    }

    // =========================================================================
    // OUTAGE
    // =========================================================================

    #[tokio::test]
    async fn test_outage_keeps_serving_old_filters() {
        let mut publisher = Publisher::new(&[0]);
        publisher.publish_full(T0, &[("https://kept.example", 1)]);
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &InMemoryFilterStore::new(), &clock, FilterMode::Single);
        engine.init().await.unwrap();

        publisher.source.set_offline(true);
        clock.set(T0 + DAY + 60);

        let err = engine.tick(false).await.unwrap_err();
        assert!(matches!(err, SyncError::NetworkUnavailable(_)));
        assert!(!err.is_fatal());
        assert_eq!(engine.query_set("https://kept.example").await, set(&[0]));

        publisher.source.set_offline(false);
        publisher.publish_delta(T0, T0 + DAY, "day1", &[("https://later.example", 1)]);

        let outcome = engine.tick(false).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Updated { patched: 1, .. }));
        assert_eq!(engine.query_set("https://later.example").await, set(&[0]));
    }

    // =========================================================================
    // MODE SWITCH
    // =========================================================================

    #[tokio::test]
    async fn test_mode_switch_reloads_thresholds() {
        let publisher = Publisher::new(&[0, 10, 100]);
        publisher.publish_full(T0, &[("https://popular.example", 500)]);
        let store = InMemoryFilterStore::new();
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &store, &clock, FilterMode::Single);
        engine.init().await.unwrap();
        assert_eq!(engine.query_set("https://popular.example").await, set(&[0]));

        engine.reconfigure(FilterMode::Multiple).await.unwrap();
        assert_eq!(
            engine.query_set("https://popular.example").await,
            set(&[0, 10, 100])
        );
        assert_eq!(store.snapshot().unwrap().records.len(), 3);

        engine.reconfigure(FilterMode::Single).await.unwrap();
        assert_eq!(engine.query_set("https://popular.example").await, set(&[0]));
        assert_eq!(store.snapshot().unwrap().mode, FilterMode::Single);
    }
}
