//! The access/admission/playback/ingestion components that sit between the
//! gateway's transport-facing sessions and the store (spec §4.B, §4.C,
//! §4.F, §4.G).

pub mod access;
pub mod admission;
pub mod config;
pub mod error;
pub mod ingest;
pub mod playback;

pub use access::{AccessController, ApiKeyPermission, Permission, Reject};
pub use admission::{Admit, AdmissionRegistry, SessionToken};
pub use config::{ConfigHandle, ConfigSnapshot};
pub use error::{ControlError, ControlResult};
pub use ingest::{CallSubmission, IngestError, IngestOutcome, IngestService};
pub use playback::PlaybackService;

#[cfg(test)]
mod tests {
    use super::*;
    use callfeed_protocol::{SearchOptions, SystemsAllow, TalkgroupId};
    use callfeed_store::{ConfigData, SqliteStore};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;

    async fn seeded_store() -> (SqliteStore, ConfigHandle) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::new(pool);
        store.migrate().await.unwrap();

        // A credential with code "good" allowing everything, one restricted
        // to system 1 / talkgroup 1001, and the default system/talkgroup
        // fixture the end-to-end scenarios assume (spec §8).
        sqlx::query(
            "INSERT INTO systems (id, label, led, order_num, auto_populate, blacklists) \
             VALUES (1, 'A', NULL, 0, 0, '[]')",
        )
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO talkgroups (system_id, id, label, name, group_name, tag, frequency, led, order_num) \
             VALUES (1, 1001, '1001', '', 'G1', 'T1', NULL, NULL, 0)",
        )
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO talkgroups (system_id, id, label, name, group_name, tag, frequency, led, order_num) \
             VALUES (1, 1002, '1002', '', 'G1', 'T1', NULL, NULL, 0)",
        )
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO access_credentials (code, ident, expiration, limit_count, order_num, systems) \
             VALUES ('good', 'everyone', NULL, NULL, 0, '\"*\"')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let mut scoped = HashMap::new();
        scoped.insert(
            callfeed_protocol::SystemId(1),
            callfeed_protocol::TalkgroupScope::List(vec![TalkgroupId(1001)]),
        );
        let scoped_json = serde_json::to_string(&SystemsAllow::Scoped(scoped)).unwrap();
        sqlx::query(
            "INSERT INTO access_credentials (code, ident, expiration, limit_count, order_num, systems) \
             VALUES ('scoped', 'restricted', NULL, NULL, 1, ?)",
        )
        .bind(scoped_json)
        .execute(store.pool())
        .await
        .unwrap();

        let data: ConfigData = store.load_config().await.unwrap();
        let handle = ConfigHandle::new(ConfigSnapshot::new(data));
        (store, handle)
    }

    #[tokio::test]
    async fn resolve_unknown_credential_is_rejected() {
        let (_store, handle) = seeded_store().await;
        let access = AccessController::new(handle);
        assert_eq!(access.resolve("nope").unwrap_err(), Reject::Unknown);
    }

    #[tokio::test]
    async fn search_restricted_by_permission_scenario_6() {
        use callfeed_protocol::{SortDir, UnitId};
        let (store, handle) = seeded_store().await;
        let access = AccessController::new(handle.clone());
        let permission = access.resolve("scoped").unwrap();

        store
            .insert_call(callfeed_store::NewCall {
                date_time: chrono::Utc::now(),
                system: callfeed_protocol::SystemId(1),
                talkgroup: TalkgroupId(1001),
                frequency: None,
                source: None::<UnitId>,
                sources: vec![],
                frequencies: vec![],
                patches: vec![],
                audio: Some(vec![1]),
                audio_url: None,
                audio_name: None,
                audio_type: None,
            })
            .await
            .unwrap();
        store
            .insert_call(callfeed_store::NewCall {
                date_time: chrono::Utc::now(),
                system: callfeed_protocol::SystemId(1),
                talkgroup: TalkgroupId(1002),
                frequency: None,
                source: None,
                sources: vec![],
                frequencies: vec![],
                patches: vec![],
                audio: Some(vec![1]),
                audio_url: None,
                audio_name: None,
                audio_type: None,
            })
            .await
            .unwrap();

        let playback = PlaybackService::new(store);
        let snapshot = handle.load();

        let blocked = playback
            .search(
                SearchOptions {
                    system: Some(callfeed_protocol::SystemId(1)),
                    talkgroup: Some(TalkgroupId(1002)),
                    sort: SortDir::Desc,
                    ..Default::default()
                },
                &permission,
                &snapshot,
            )
            .await
            .unwrap();
        assert_eq!(blocked.count, 0);

        let allowed = playback
            .search(
                SearchOptions {
                    system: Some(callfeed_protocol::SystemId(1)),
                    sort: SortDir::Desc,
                    ..Default::default()
                },
                &permission,
                &snapshot,
            )
            .await
            .unwrap();
        assert_eq!(allowed.count, 1);
        assert_eq!(allowed.results[0].talkgroup, TalkgroupId(1001));
    }
}
