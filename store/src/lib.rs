mod codec;
pub mod config_data;
pub mod error;
pub mod filter;
pub mod mysql;
pub mod new_call;
pub mod ops;
pub mod postgres;
pub mod sqlite;

pub use config_data::{ConfigData, Settings};
pub use error::{StoreError, StoreResult};
pub use filter::ResolvedFilter;
pub use mysql::MySqlStore;
pub use new_call::{LogLevel, NewCall};
pub use ops::StoreOps;
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use callfeed_protocol::{Call, CallId, CallSummary, System, SystemId, Talkgroup, TalkgroupId};

/// One of the three dialect backends behind a single interface (spec §4.A,
/// §9: "Keep SQL strings per dialect; never concatenate user input into
/// SQL"). Static dispatch — no `Box<dyn StoreOps>` — so a misconfigured
/// dialect can never be mixed up with another at runtime.
#[derive(Clone)]
pub enum Store {
    Postgres(PgStore),
    MySql(MySqlStore),
    Sqlite(SqliteStore),
}

#[async_trait]
impl StoreOps for Store {
    async fn load_config(&self) -> StoreResult<ConfigData> {
        match self {
            Store::Postgres(s) => s.load_config().await,
            Store::MySql(s) => s.load_config().await,
            Store::Sqlite(s) => s.load_config().await,
        }
    }

    async fn insert_call(&self, call: NewCall) -> StoreResult<Call> {
        match self {
            Store::Postgres(s) => s.insert_call(call).await,
            Store::MySql(s) => s.insert_call(call).await,
            Store::Sqlite(s) => s.insert_call(call).await,
        }
    }

    async fn get_call(&self, id: CallId) -> StoreResult<Option<Call>> {
        match self {
            Store::Postgres(s) => s.get_call(id).await,
            Store::MySql(s) => s.get_call(id).await,
            Store::Sqlite(s) => s.get_call(id).await,
        }
    }

    async fn search_calls(&self, filter: &ResolvedFilter) -> StoreResult<(i64, Vec<CallSummary>)> {
        match self {
            Store::Postgres(s) => s.search_calls(filter).await,
            Store::MySql(s) => s.search_calls(filter).await,
            Store::Sqlite(s) => s.search_calls(filter).await,
        }
    }

    async fn append_log(&self, level: LogLevel, message: &str) -> StoreResult<()> {
        match self {
            Store::Postgres(s) => s.append_log(level, message).await,
            Store::MySql(s) => s.append_log(level, message).await,
            Store::Sqlite(s) => s.append_log(level, message).await,
        }
    }

    async fn ensure_system(&self, id: SystemId, auto_create: bool) -> StoreResult<Option<System>> {
        match self {
            Store::Postgres(s) => s.ensure_system(id, auto_create).await,
            Store::MySql(s) => s.ensure_system(id, auto_create).await,
            Store::Sqlite(s) => s.ensure_system(id, auto_create).await,
        }
    }

    async fn ensure_talkgroup(
        &self,
        system: SystemId,
        id: TalkgroupId,
        auto_populate: bool,
    ) -> StoreResult<Option<Talkgroup>> {
        match self {
            Store::Postgres(s) => s.ensure_talkgroup(system, id, auto_populate).await,
            Store::MySql(s) => s.ensure_talkgroup(system, id, auto_populate).await,
            Store::Sqlite(s) => s.ensure_talkgroup(system, id, auto_populate).await,
        }
    }
}

impl Store {
    /// Closes the underlying connection pool (spec §5 shutdown sequence).
    pub async fn close(&self) {
        match self {
            Store::Postgres(s) => s.close().await,
            Store::MySql(s) => s.close().await,
            Store::Sqlite(s) => s.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callfeed_protocol::{SortDir, TalkgroupId as Tg};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashSet;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        let store = SqliteStore::new(pool);
        store.migrate().await.expect("migrate");
        store
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = memory_store().await;
        store.ensure_system(SystemId(1), true).await.unwrap();

        let new_call = NewCall {
            date_time: chrono::Utc::now(),
            system: SystemId(1),
            talkgroup: Tg(100),
            frequency: Some(851_000_000),
            source: None,
            sources: vec![],
            frequencies: vec![],
            patches: vec![],
            audio: Some(vec![1, 2, 3]),
            audio_url: None,
            audio_name: Some("call.wav".to_string()),
            audio_type: Some("audio/wav".to_string()),
        };
        let inserted = store.insert_call(new_call).await.unwrap();
        let fetched = store.get_call(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.audio, Some(vec![1, 2, 3]));
        assert_eq!(fetched.talkgroup, Tg(100));
    }

    #[tokio::test]
    async fn search_calls_empty_system_set_matches_nothing() {
        let store = memory_store().await;
        let filter = ResolvedFilter {
            systems: Some(HashSet::new()),
            sort: SortDir::Desc,
            limit: 50,
            offset: 0,
            ..Default::default()
        };
        let (count, results) = store.search_calls(&filter).await.unwrap();
        assert_eq!(count, 0);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn ensure_talkgroup_creates_stub_exactly_once() {
        let store = memory_store().await;
        store.ensure_system(SystemId(1), true).await.unwrap();

        let first = store
            .ensure_talkgroup(SystemId(1), Tg(200), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.group, "Unknown");

        let second = store
            .ensure_talkgroup(SystemId(1), Tg(200), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, first);

        let config = store.load_config().await.unwrap();
        let system = config.systems.iter().find(|s| s.id == SystemId(1)).unwrap();
        assert_eq!(system.talkgroups.len(), 1);
    }

    #[tokio::test]
    async fn ensure_talkgroup_without_auto_populate_returns_none() {
        let store = memory_store().await;
        store.ensure_system(SystemId(1), true).await.unwrap();
        let result = store.ensure_talkgroup(SystemId(1), Tg(300), false).await.unwrap();
        assert!(result.is_none());
    }
}
