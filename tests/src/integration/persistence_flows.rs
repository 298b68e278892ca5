//! # Persistence Flows
//!
//! The engine against the on-disk store: restarts, corrupt files and
//! resets.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::Path;

    use seen_filters::ports::FilterStore;
    use seen_filters::{
        FileFilterStore, FilterMode, FixedClock, MurmurBackend, SeenFilterApi, StaticSnapshotSource,
        SyncConfig, SyncEngine, SyncOutcome,
    };

    use crate::fixtures::Publisher;

    type Engine = SyncEngine<MurmurBackend, StaticSnapshotSource, FileFilterStore, FixedClock>;

    const T0: u64 = 1_700_000_000;

    fn engine(publisher: &Publisher, path: &Path, clock: &FixedClock) -> Engine {
        SyncEngine::new(
            SyncConfig::for_testing().with_mode(FilterMode::Multiple),
            MurmurBackend,
            publisher.source.clone(),
            FileFilterStore::new(path),
            clock.clone(),
        )
    }

    #[tokio::test]
    async fn test_filters_survive_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("filters.bin");
        let publisher = Publisher::new(&[0, 25]);
        publisher.publish_full(T0, &[("https://published.example", 30)]);
        let clock = FixedClock::new(T0 + 60);

        {
            let first = engine(&publisher, &path, &clock);
            first.init().await.unwrap();
            first.insert_set("https://visited.example", 0).await.unwrap();
        }
        assert!(path.exists());
        let downloads = publisher.source.blob_fetches().len();

        let second = engine(&publisher, &path, &clock);

        assert_eq!(second.init().await.unwrap(), SyncOutcome::Fresh);
        assert_eq!(publisher.source.blob_fetches().len(), downloads);
        assert_eq!(
            second.query_set("https://visited.example").await,
            BTreeSet::from([0])
        );
        assert_eq!(
            second.query_set("https://published.example").await,
            BTreeSet::from([0, 25])
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_cold_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.bin");
        std::fs::write(&path, b"this is not a filter set").unwrap();
        let publisher = Publisher::new(&[0]);
        publisher.publish_full(T0, &[("https://published.example", 1)]);
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &path, &clock);

        assert_eq!(engine.init().await.unwrap(), SyncOutcome::ColdLoaded);

        let rewritten = FileFilterStore::new(&path).read().await.unwrap().unwrap();
        assert_eq!(rewritten.records.len(), 1);
        assert!(!engine.query_set("https://published.example").await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.bin");
        let publisher = Publisher::new(&[0]);
        publisher.publish_full(T0, &[]);
        let clock = FixedClock::new(T0 + 60);
        let engine = engine(&publisher, &path, &clock);
        engine.init().await.unwrap();
        assert!(path.exists());

        engine.reset_all().await.unwrap();

        assert!(!path.exists());
        assert!(engine.status().await.records.is_empty());
    }
}
