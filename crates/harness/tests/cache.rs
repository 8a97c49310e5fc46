use std::sync::Arc;

use opsdesk_engine::{CollectionKind, Console, ConsoleConfig, SnapshotOrigin};
use opsdesk_harness::{FakeBackend, Failure, TestConsole, init_tracing};
use opsdesk_storage::{SnapshotCache, SqliteCache};

fn config_at(dir: &tempfile::TempDir) -> ConsoleConfig {
    ConsoleConfig {
        cache_path: Some(dir.path().join("opsdesk.db")),
        ..ConsoleConfig::default()
    }
}

// ============================================================================
// Cached First Paint
// ============================================================================

#[tokio::test]
async fn cached_snapshots_paint_before_first_fetch() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;

    {
        let console = Console::open(config_at(&dir), Arc::new(FakeBackend::seeded()))?;
        console.refresh_orders().await?;
        console.refresh_catalog().await?;
    }

    let backend = Arc::new(FakeBackend::seeded());
    let console = Console::open(config_at(&dir), backend.clone())?;
    assert_eq!(console.load_cached(), 2);
    assert!(backend.calls().is_empty());

    let orders = console.collection(CollectionKind::Orders).snapshot();
    assert_eq!(orders.origin(), SnapshotOrigin::Cache);
    assert!(orders.is_provisional());
    assert_eq!(console.orders_view().len(), 2);
    assert_eq!(console.catalog_view().len(), 2);

    let fresh = console.refresh_orders().await?;
    assert_eq!(fresh.origin(), SnapshotOrigin::Remote);
    assert!(!fresh.is_provisional());
    Ok(())
}

#[tokio::test]
async fn cache_never_overrides_a_fetched_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = SqliteCache::open_in_memory()?;
    cache.store_snapshot("orders", &[], 1)?;
    let test = TestConsole::with_cache(FakeBackend::seeded(), cache);

    test.console.refresh_orders().await?;
    // Only the catalog was still empty.
    assert_eq!(test.console.load_cached(), 0);
    assert_eq!(test.console.orders_view().len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_keeps_cached_view() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = SqliteCache::open_in_memory()?;
    {
        let warm = TestConsole::loaded().await?;
        let orders = warm.console.collection(CollectionKind::Orders).snapshot();
        cache.store_snapshot("orders", orders.records(), orders.fetched_at_ms())?;
    }
    let test = TestConsole::with_cache(FakeBackend::seeded(), cache);
    assert_eq!(test.console.load_cached(), 1);

    test.backend.fail_next("getDashboardData", Failure::Network);
    assert!(test.console.refresh_orders().await.is_err());
    assert_eq!(
        test.console.collection(CollectionKind::Orders).snapshot().origin(),
        SnapshotOrigin::Cache
    );
    assert_eq!(test.console.orders_view().len(), 2);
    Ok(())
}

#[tokio::test]
async fn console_without_cache_loads_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestConsole::new(FakeBackend::seeded());
    assert_eq!(test.console.load_cached(), 0);
    Ok(())
}

// ============================================================================
// Corrupt Entries
// ============================================================================

#[tokio::test]
async fn corrupt_entry_is_dropped_on_load() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("opsdesk.db");
    {
        let console = Console::open(config_at(&dir), Arc::new(FakeBackend::seeded()))?;
        console.refresh_orders().await?;
        console.refresh_catalog().await?;
    }
    SqliteCache::open(&path)?.conn().execute(
        "UPDATE snapshot_cache SET payload = X'00' WHERE collection = 'orders'",
        [],
    )?;

    let console = Console::open(config_at(&dir), Arc::new(FakeBackend::seeded()))?;
    assert_eq!(console.load_cached(), 1);
    assert_eq!(
        console.collection(CollectionKind::Orders).snapshot().origin(),
        SnapshotOrigin::Empty
    );
    assert_eq!(console.catalog_view().len(), 2);

    let cache = SqliteCache::open(&path)?;
    assert!(cache.load_snapshot("orders")?.is_none());
    assert!(cache.load_snapshot("catalog")?.is_some());
    Ok(())
}
