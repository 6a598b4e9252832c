use async_trait::async_trait;
use callfeed_protocol::{Call, CallSummary, SystemId, System, Talkgroup, TalkgroupId};

use crate::config_data::ConfigData;
use crate::error::StoreResult;
use crate::filter::ResolvedFilter;
use crate::new_call::{LogLevel, NewCall};

/// The capability set every dialect implementation provides (spec §4.A).
/// Result rows from `search_calls` never include audio; `get_call` always
/// does.
#[async_trait]
pub trait StoreOps: Send + Sync {
    async fn load_config(&self) -> StoreResult<ConfigData>;

    async fn insert_call(&self, call: NewCall) -> StoreResult<Call>;

    async fn get_call(&self, id: callfeed_protocol::CallId) -> StoreResult<Option<Call>>;

    async fn search_calls(&self, filter: &ResolvedFilter) -> StoreResult<(i64, Vec<CallSummary>)>;

    async fn append_log(&self, level: LogLevel, message: &str) -> StoreResult<()>;

    /// Returns the existing system, or creates a bare stub when `label` is
    /// provided and none exists yet (ingest auto-populate, spec §4.F step 3).
    async fn ensure_system(&self, id: SystemId, auto_create: bool) -> StoreResult<Option<System>>;

    /// Returns the existing talkgroup under `system`, or creates the
    /// `{id, label=id.toString, group="Unknown", tag="Untagged"}` stub when
    /// `system`'s `auto_populate` is set (spec §4.F step 4).
    async fn ensure_talkgroup(
        &self,
        system: SystemId,
        id: TalkgroupId,
        auto_populate: bool,
    ) -> StoreResult<Option<Talkgroup>>;
}
