use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use opsdesk_engine::{Console, ConsoleConfig, EngineError};
use opsdesk_storage::SqliteCache;

use crate::backend::FakeBackend;

/// Installs a test-writer subscriber honouring `RUST_LOG`. Safe to call from
/// every test; only the first call per binary takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A small PNG-typed payload; the bytes only need to be distinct per name.
pub fn png(name: &str) -> (String, String, Vec<u8>) {
    (name.to_string(), "image/png".to_string(), name.as_bytes().to_vec())
}

/// A console wired to an in-memory backend, both reachable from the test.
pub struct TestConsole {
    pub console: Arc<Console<Arc<FakeBackend>>>,
    pub backend: Arc<FakeBackend>,
}

impl TestConsole {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_config(backend, ConsoleConfig::default())
    }

    pub fn with_config(backend: FakeBackend, config: ConsoleConfig) -> Self {
        init_tracing();
        let backend = Arc::new(backend);
        let console = Arc::new(Console::new(config, backend.clone()));
        Self { console, backend }
    }

    pub fn with_cache(backend: FakeBackend, cache: SqliteCache) -> Self {
        init_tracing();
        let backend = Arc::new(backend);
        let console = Console::new(ConsoleConfig::default(), backend.clone()).with_cache(cache);
        Self {
            console: Arc::new(console),
            backend,
        }
    }

    /// Seeded backend with both collections already fetched.
    pub async fn loaded() -> Result<Self, EngineError> {
        let test = Self::new(FakeBackend::seeded());
        test.console.refresh_orders().await?;
        test.console.refresh_catalog().await?;
        Ok(test)
    }
}
