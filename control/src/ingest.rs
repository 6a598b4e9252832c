use std::sync::Arc;
use std::time::Instant;

use callfeed_metrics::IngestMetrics;
use callfeed_protocol::{Call, SystemId, TalkgroupId};
use callfeed_store::{NewCall, StoreOps};
use thiserror::Error;
use tracing::warn;

use crate::access::AccessController;
use crate::config::ConfigSnapshot;

/// A call submission before validation (spec §4.F): apiKey plus the fields
/// that become a `Call` on success.
#[derive(Clone, Debug)]
pub struct CallSubmission {
    pub api_key: String,
    pub system: SystemId,
    pub talkgroup: TalkgroupId,
    pub date_time: chrono::DateTime<chrono::Utc>,
    pub frequency: Option<i64>,
    pub source: Option<callfeed_protocol::UnitId>,
    pub sources: Vec<callfeed_protocol::SourceEntry>,
    pub frequencies: Vec<callfeed_protocol::FrequencyEntry>,
    pub patches: Vec<TalkgroupId>,
    pub audio: Option<Vec<u8>>,
    pub audio_url: Option<String>,
    pub audio_name: Option<String>,
    pub audio_type: Option<String>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    #[error("api key unknown or disabled")]
    Unauthorized,
    #[error("system/talkgroup not permitted for this api key")]
    Forbidden,
    #[error("audio is neither a non-empty blob nor a url")]
    BadAudio,
}

/// Runs the validation pipeline and persists an accepted call (spec §4.F
/// steps 1-6). Steps 3-4's auto-populate stubs are created through the
/// store's `ensure_system`/`ensure_talkgroup`.
pub struct IngestService<S> {
    store: S,
    access: AccessController,
    metrics: Arc<IngestMetrics>,
}

impl<S: StoreOps> IngestService<S> {
    pub fn new(store: S, access: AccessController, metrics: Arc<IngestMetrics>) -> Self {
        Self { store, access, metrics }
    }

    pub async fn ingest(&self, submission: CallSubmission) -> Result<Call, IngestOutcome> {
        let result = self.ingest_inner(submission).await;
        match &result {
            Ok(_) => self.metrics.accepted(),
            Err(IngestOutcome::Rejected(IngestError::Unauthorized)) => self.metrics.rejected("unauthorized"),
            Err(IngestOutcome::Rejected(IngestError::Forbidden)) => self.metrics.rejected("forbidden"),
            Err(IngestOutcome::Rejected(IngestError::BadAudio)) => self.metrics.rejected("bad_audio"),
            Err(IngestOutcome::Store(_)) => self.metrics.rejected("store_error"),
        }
        result
    }

    async fn ingest_inner(&self, submission: CallSubmission) -> Result<Call, IngestOutcome> {
        // 1. apiKey resolves to an enabled ApiKey.
        let permission = self
            .access
            .resolve_api_key(&submission.api_key)
            .map_err(|_| IngestOutcome::Rejected(IngestError::Unauthorized))?;

        // 2. {system, talkgroup} is within the ApiKey's allow-list.
        if !permission.systems.allows(submission.system, submission.talkgroup) {
            warn!(system = submission.system.0, talkgroup = submission.talkgroup.0, "ingest rejected: forbidden");
            return Err(IngestOutcome::Rejected(IngestError::Forbidden));
        }

        // 3. The System exists, or is auto-created under a "*" api key.
        let auto_create = matches!(permission.systems, callfeed_protocol::SystemsAllow::All(_));
        let system = self
            .store
            .ensure_system(submission.system, auto_create)
            .await
            .map_err(IngestOutcome::Store)?
            .ok_or(IngestOutcome::Rejected(IngestError::Forbidden))?;

        // 4. The Talkgroup exists, or a stub is created when auto_populate is
        // set; only a talkgroup that doesn't yet exist is checked against the
        // blacklist (an already-known talkgroup is never re-validated against
        // a blacklist added later).
        let known = system.talkgroups.iter().any(|t| t.id == submission.talkgroup);
        if !known {
            if system.blacklists.contains(&submission.talkgroup) {
                return Err(IngestOutcome::Rejected(IngestError::Forbidden));
            }
            self.store
                .ensure_talkgroup(submission.system, submission.talkgroup, system.auto_populate)
                .await
                .map_err(IngestOutcome::Store)?
                .ok_or(IngestOutcome::Rejected(IngestError::Forbidden))?;
            self.metrics.talkgroup_auto_populated();
        }

        // 5. Audio is either a non-empty blob or a url string.
        let has_audio = matches!(&submission.audio, Some(b) if !b.is_empty());
        let has_url = matches!(&submission.audio_url, Some(u) if !u.is_empty());
        if !(has_audio || has_url) {
            return Err(IngestOutcome::Rejected(IngestError::BadAudio));
        }

        // 6. Persist.
        let started = Instant::now();
        let new_call = NewCall {
            date_time: submission.date_time,
            system: submission.system,
            talkgroup: submission.talkgroup,
            frequency: submission.frequency,
            source: submission.source,
            sources: submission.sources,
            frequencies: submission.frequencies,
            patches: submission.patches,
            audio: submission.audio,
            audio_url: submission.audio_url,
            audio_name: submission.audio_name,
            audio_type: submission.audio_type,
        };
        let call = self.store.insert_call(new_call).await.map_err(IngestOutcome::Store)?;
        self.metrics.store_seconds(started.elapsed().as_secs_f64());
        Ok(call)
    }

    /// Whether `downstream`'s allow-list admits forwarding this call (spec
    /// §4.H), given its resolved permission.
    pub fn downstream_allows(downstream: &callfeed_protocol::Downstream, call: &Call) -> bool {
        !downstream.disabled && downstream.systems.allows(call.system, call.talkgroup)
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub fn config(&self) -> std::sync::Arc<ConfigSnapshot> {
        self.access.config().load()
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    Rejected(IngestError),
    Store(callfeed_store::StoreError),
}
