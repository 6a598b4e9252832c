use callfeed_protocol::{FrequencyEntry, SourceEntry, SystemId, TalkgroupId, UnitId};
use chrono::{DateTime, Utc};

/// A call ready to persist: the id is assigned by the store on insert.
#[derive(Clone, Debug)]
pub struct NewCall {
    pub date_time: DateTime<Utc>,
    pub system: SystemId,
    pub talkgroup: TalkgroupId,
    pub frequency: Option<i64>,
    pub source: Option<UnitId>,
    pub sources: Vec<SourceEntry>,
    pub frequencies: Vec<FrequencyEntry>,
    pub patches: Vec<TalkgroupId>,
    pub audio: Option<Vec<u8>>,
    pub audio_url: Option<String>,
    pub audio_name: Option<String>,
    pub audio_type: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
