use async_trait::async_trait;
use callfeed_protocol::{
    AccessCredential, ApiKey, Call, CallId, CallSummary, Downstream, SortDir, System, SystemId,
    SystemsAllow, Talkgroup, TalkgroupId, Unit, UnitId,
};
use sqlx::{PgPool, Row};
use std::collections::HashSet;

use crate::codec;
use crate::config_data::{ConfigData, Settings};
use crate::error::StoreResult;
use crate::filter::ResolvedFilter;
use crate::new_call::{LogLevel, NewCall};
use crate::ops::StoreOps;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the connection pool (spec §5: "a server shutdown signal ...
    /// closes the store").
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS systems (
                id BIGINT PRIMARY KEY,
                label TEXT NOT NULL,
                led TEXT,
                order_num INTEGER NOT NULL,
                auto_populate BOOLEAN NOT NULL,
                blacklists TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS talkgroups (
                system_id BIGINT NOT NULL,
                id BIGINT NOT NULL,
                label TEXT NOT NULL,
                name TEXT NOT NULL,
                group_name TEXT NOT NULL,
                tag TEXT NOT NULL,
                frequency BIGINT,
                led TEXT,
                order_num INTEGER NOT NULL,
                PRIMARY KEY (system_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS units (
                system_id BIGINT NOT NULL,
                id BIGINT NOT NULL,
                label TEXT NOT NULL,
                order_num INTEGER NOT NULL,
                PRIMARY KEY (system_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS groups (name TEXT PRIMARY KEY)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS tags (name TEXT PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS access_credentials (
                code TEXT PRIMARY KEY,
                ident TEXT NOT NULL,
                expiration TIMESTAMPTZ,
                limit_count INTEGER,
                order_num INTEGER NOT NULL,
                systems TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                key TEXT PRIMARY KEY,
                ident TEXT NOT NULL,
                disabled BOOLEAN NOT NULL,
                order_num INTEGER NOT NULL,
                systems TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downstreams (
                url TEXT PRIMARY KEY,
                api_key TEXT NOT NULL,
                disabled BOOLEAN NOT NULL,
                order_num INTEGER NOT NULL,
                systems TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, val TEXT NOT NULL)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calls (
                id BIGSERIAL PRIMARY KEY,
                date_time TIMESTAMPTZ NOT NULL,
                system_id BIGINT NOT NULL,
                talkgroup_id BIGINT NOT NULL,
                frequency BIGINT,
                source BIGINT,
                sources TEXT NOT NULL DEFAULT '[]',
                frequencies TEXT NOT NULL DEFAULT '[]',
                patches TEXT NOT NULL DEFAULT '[]',
                audio BYTEA,
                audio_url TEXT,
                audio_name TEXT,
                audio_type TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS calls_date_time_idx ON calls (date_time)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS calls_system_talkgroup_idx ON calls (system_id, talkgroup_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id BIGSERIAL PRIMARY KEY,
                date_time TIMESTAMPTZ NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_talkgroups(&self, system: SystemId) -> StoreResult<Vec<Talkgroup>> {
        let rows = sqlx::query(
            "SELECT id, label, name, group_name, tag, frequency, led, order_num \
             FROM talkgroups WHERE system_id = $1 ORDER BY order_num ASC",
        )
        .bind(system.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Talkgroup {
                id: TalkgroupId(r.get::<i64, _>("id")),
                label: r.get::<String, _>("label"),
                name: r.get::<String, _>("name"),
                group: r.get::<String, _>("group_name"),
                tag: r.get::<String, _>("tag"),
                frequency: r.get::<Option<i64>, _>("frequency"),
                led: r.get::<Option<String>, _>("led"),
                order: r.get::<i32, _>("order_num"),
            })
            .collect())
    }

    async fn load_units(&self, system: SystemId) -> StoreResult<Vec<Unit>> {
        let rows = sqlx::query(
            "SELECT id, label, order_num FROM units WHERE system_id = $1 ORDER BY order_num ASC",
        )
        .bind(system.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Unit {
                id: UnitId(r.get::<i64, _>("id")),
                label: r.get::<String, _>("label"),
                order: r.get::<i32, _>("order_num"),
            })
            .collect())
    }

    async fn load_system(&self, id: SystemId) -> StoreResult<Option<System>> {
        let row = sqlx::query(
            "SELECT label, led, order_num, auto_populate, blacklists FROM systems WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        let Some(r) = row else {
            return Ok(None);
        };
        let blacklists: HashSet<TalkgroupId> =
            codec::decode("blacklists", r.get::<String, _>("blacklists").as_str())?;
        Ok(Some(System {
            id,
            label: r.get::<String, _>("label"),
            led: r.get::<Option<String>, _>("led"),
            order: r.get::<i32, _>("order_num"),
            auto_populate: r.get::<bool, _>("auto_populate"),
            blacklists,
            talkgroups: self.load_talkgroups(id).await?,
            units: self.load_units(id).await?,
        }))
    }
}

#[async_trait]
impl StoreOps for PgStore {
    async fn load_config(&self) -> StoreResult<ConfigData> {
        let system_rows = sqlx::query(
            "SELECT id, label, led, order_num, auto_populate, blacklists \
             FROM systems ORDER BY order_num ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut systems = Vec::with_capacity(system_rows.len());
        for r in system_rows {
            let id = SystemId(r.get::<i64, _>("id"));
            let blacklists: HashSet<TalkgroupId> =
                codec::decode("blacklists", r.get::<String, _>("blacklists").as_str())?;
            systems.push(System {
                id,
                label: r.get::<String, _>("label"),
                led: r.get::<Option<String>, _>("led"),
                order: r.get::<i32, _>("order_num"),
                auto_populate: r.get::<bool, _>("auto_populate"),
                blacklists,
                talkgroups: self.load_talkgroups(id).await?,
                units: self.load_units(id).await?,
            });
        }

        let groups = sqlx::query("SELECT name FROM groups ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.get::<String, _>("name"))
            .collect();
        let tags = sqlx::query("SELECT name FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.get::<String, _>("name"))
            .collect();

        let credential_rows = sqlx::query(
            "SELECT code, ident, expiration, limit_count, order_num, systems \
             FROM access_credentials ORDER BY order_num ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut credentials = Vec::with_capacity(credential_rows.len());
        for r in credential_rows {
            let systems: SystemsAllow =
                codec::decode("access_credentials.systems", r.get::<String, _>("systems").as_str())?;
            credentials.push(AccessCredential {
                code: r.get::<String, _>("code"),
                ident: r.get::<String, _>("ident"),
                expiration: r.get::<Option<chrono::DateTime<chrono::Utc>>, _>("expiration"),
                limit: r.get::<Option<i32>, _>("limit_count").map(|n| n as u32),
                order: r.get::<i32, _>("order_num"),
                systems,
            });
        }

        let api_key_rows = sqlx::query(
            "SELECT key, ident, disabled, order_num, systems FROM api_keys ORDER BY order_num ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut api_keys = Vec::with_capacity(api_key_rows.len());
        for r in api_key_rows {
            let systems: SystemsAllow =
                codec::decode("api_keys.systems", r.get::<String, _>("systems").as_str())?;
            api_keys.push(ApiKey {
                key: r.get::<String, _>("key"),
                ident: r.get::<String, _>("ident"),
                disabled: r.get::<bool, _>("disabled"),
                order: r.get::<i32, _>("order_num"),
                systems,
            });
        }

        let downstream_rows = sqlx::query(
            "SELECT url, api_key, disabled, order_num, systems FROM downstreams ORDER BY order_num ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut downstreams = Vec::with_capacity(downstream_rows.len());
        for r in downstream_rows {
            let systems: SystemsAllow =
                codec::decode("downstreams.systems", r.get::<String, _>("systems").as_str())?;
            downstreams.push(Downstream {
                url: r.get::<String, _>("url"),
                api_key: r.get::<String, _>("api_key"),
                disabled: r.get::<bool, _>("disabled"),
                order: r.get::<i32, _>("order_num"),
                systems,
            });
        }

        let branding = sqlx::query("SELECT val FROM settings WHERE key = 'branding'")
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get::<String, _>("val"))
            .unwrap_or_default();

        Ok(ConfigData {
            systems,
            groups,
            tags,
            credentials,
            api_keys,
            downstreams,
            settings: Settings { branding },
        })
    }

    async fn insert_call(&self, call: NewCall) -> StoreResult<Call> {
        let sources = codec::encode("sources", &call.sources)?;
        let frequencies = codec::encode("frequencies", &call.frequencies)?;
        let patches = codec::encode("patches", &call.patches)?;

        let row = sqlx::query(
            r#"
            INSERT INTO calls
                (date_time, system_id, talkgroup_id, frequency, source,
                 sources, frequencies, patches, audio, audio_url, audio_name, audio_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(call.date_time)
        .bind(call.system.0)
        .bind(call.talkgroup.0)
        .bind(call.frequency)
        .bind(call.source.map(|u| u.0))
        .bind(&sources)
        .bind(&frequencies)
        .bind(&patches)
        .bind(&call.audio)
        .bind(&call.audio_url)
        .bind(&call.audio_name)
        .bind(&call.audio_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(Call {
            id: CallId(row.get::<i64, _>("id")),
            date_time: call.date_time,
            system: call.system,
            talkgroup: call.talkgroup,
            frequency: call.frequency,
            source: call.source,
            sources: call.sources,
            frequencies: call.frequencies,
            patches: call.patches,
            audio: call.audio,
            audio_url: call.audio_url,
            audio_name: call.audio_name,
            audio_type: call.audio_type,
        })
    }

    async fn get_call(&self, id: CallId) -> StoreResult<Option<Call>> {
        let row = sqlx::query(
            r#"
            SELECT id, date_time, system_id, talkgroup_id, frequency, source,
                   sources, frequencies, patches, audio, audio_url, audio_name, audio_type
            FROM calls WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        Ok(Some(Call {
            id: CallId(r.get::<i64, _>("id")),
            date_time: r.get::<chrono::DateTime<chrono::Utc>, _>("date_time"),
            system: SystemId(r.get::<i64, _>("system_id")),
            talkgroup: TalkgroupId(r.get::<i64, _>("talkgroup_id")),
            frequency: r.get::<Option<i64>, _>("frequency"),
            source: r.get::<Option<i64>, _>("source").map(UnitId),
            sources: codec::decode("sources", r.get::<String, _>("sources").as_str())?,
            frequencies: codec::decode("frequencies", r.get::<String, _>("frequencies").as_str())?,
            patches: codec::decode("patches", r.get::<String, _>("patches").as_str())?,
            audio: r.get::<Option<Vec<u8>>, _>("audio"),
            audio_url: r.get::<Option<String>, _>("audio_url"),
            audio_name: r.get::<Option<String>, _>("audio_name"),
            audio_type: r.get::<Option<String>, _>("audio_type"),
        }))
    }

    async fn search_calls(&self, filter: &ResolvedFilter) -> StoreResult<(i64, Vec<CallSummary>)> {
        if matches!(&filter.systems, Some(s) if s.is_empty())
            || matches!(&filter.talkgroups, Some(t) if t.is_empty())
        {
            return Ok((0, Vec::new()));
        }

        let systems: Option<Vec<i64>> = filter.systems.as_ref().map(|s| s.iter().map(|id| id.0).collect());
        let talkgroups: Option<Vec<i64>> =
            filter.talkgroups.as_ref().map(|t| t.iter().map(|id| id.0).collect());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM calls
            WHERE ($1::timestamptz IS NULL OR date_time >= $1)
              AND ($2::timestamptz IS NULL OR date_time < $2)
              AND ($3::bigint[] IS NULL OR system_id = ANY($3))
              AND ($4::bigint[] IS NULL OR talkgroup_id = ANY($4))
            "#,
        )
        .bind(filter.date_start)
        .bind(filter.date_end)
        .bind(&systems)
        .bind(&talkgroups)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = count_row.get("n");

        let order = match filter.sort {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        };
        let sql = format!(
            r#"
            SELECT id, date_time, system_id, talkgroup_id, frequency, source,
                   patches, audio_name, audio_type
            FROM calls
            WHERE ($1::timestamptz IS NULL OR date_time >= $1)
              AND ($2::timestamptz IS NULL OR date_time < $2)
              AND ($3::bigint[] IS NULL OR system_id = ANY($3))
              AND ($4::bigint[] IS NULL OR talkgroup_id = ANY($4))
            ORDER BY date_time {order}
            LIMIT $5 OFFSET $6
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.date_start)
            .bind(filter.date_end)
            .bind(&systems)
            .bind(&talkgroups)
            .bind(filter.limit as i64)
            .bind(filter.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for r in rows {
            results.push(CallSummary {
                id: CallId(r.get::<i64, _>("id")),
                date_time: r.get::<chrono::DateTime<chrono::Utc>, _>("date_time"),
                system: SystemId(r.get::<i64, _>("system_id")),
                talkgroup: TalkgroupId(r.get::<i64, _>("talkgroup_id")),
                frequency: r.get::<Option<i64>, _>("frequency"),
                source: r.get::<Option<i64>, _>("source").map(UnitId),
                patches: codec::decode("patches", r.get::<String, _>("patches").as_str())?,
                audio_name: r.get::<Option<String>, _>("audio_name"),
                audio_type: r.get::<Option<String>, _>("audio_type"),
            });
        }

        Ok((count, results))
    }

    async fn append_log(&self, level: LogLevel, message: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO logs (date_time, level, message) VALUES ($1, $2, $3)")
            .bind(chrono::Utc::now())
            .bind(level.as_str())
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_system(&self, id: SystemId, auto_create: bool) -> StoreResult<Option<System>> {
        if let Some(existing) = self.load_system(id).await? {
            return Ok(Some(existing));
        }
        if !auto_create {
            return Ok(None);
        }
        sqlx::query(
            "INSERT INTO systems (id, label, led, order_num, auto_populate, blacklists) \
             VALUES ($1, $2, NULL, 0, true, '[]')",
        )
        .bind(id.0)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;
        Ok(Some(System {
            id,
            label: id.0.to_string(),
            led: None,
            order: 0,
            auto_populate: true,
            blacklists: HashSet::new(),
            talkgroups: Vec::new(),
            units: Vec::new(),
        }))
    }

    async fn ensure_talkgroup(
        &self,
        system: SystemId,
        id: TalkgroupId,
        auto_populate: bool,
    ) -> StoreResult<Option<Talkgroup>> {
        let row = sqlx::query(
            "SELECT label, name, group_name, tag, frequency, led, order_num \
             FROM talkgroups WHERE system_id = $1 AND id = $2",
        )
        .bind(system.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(r) = row {
            return Ok(Some(Talkgroup {
                id,
                label: r.get::<String, _>("label"),
                name: r.get::<String, _>("name"),
                group: r.get::<String, _>("group_name"),
                tag: r.get::<String, _>("tag"),
                frequency: r.get::<Option<i64>, _>("frequency"),
                led: r.get::<Option<String>, _>("led"),
                order: r.get::<i32, _>("order_num"),
            }));
        }
        if !auto_populate {
            return Ok(None);
        }
        let label = id.0.to_string();
        sqlx::query(
            "INSERT INTO talkgroups (system_id, id, label, name, group_name, tag, frequency, led, order_num) \
             VALUES ($1, $2, $3, '', 'Unknown', 'Untagged', NULL, NULL, 0)",
        )
        .bind(system.0)
        .bind(id.0)
        .bind(&label)
        .execute(&self.pool)
        .await?;
        Ok(Some(Talkgroup {
            id,
            label,
            name: String::new(),
            group: "Unknown".to_string(),
            tag: "Untagged".to_string(),
            frequency: None,
            led: None,
            order: 0,
        }))
    }
}
