use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SystemId, TalkgroupId};
use crate::model::CallSummary;

/// Sort direction for `searchCalls`: `+1` ascending, `-1` descending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum SortDir {
    Asc,
    Desc,
}

impl Default for SortDir {
    fn default() -> Self {
        SortDir::Desc
    }
}

impl TryFrom<i8> for SortDir {
    type Error = &'static str;
    fn try_from(v: i8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(SortDir::Asc),
            -1 => Ok(SortDir::Desc),
            _ => Err("sort must be +1 or -1"),
        }
    }
}

impl From<SortDir> for i8 {
    fn from(v: SortDir) -> i8 {
        match v {
            SortDir::Asc => 1,
            SortDir::Desc => -1,
        }
    }
}

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Exact local-day window; mutually exclusive in practice with
    /// `date_start`/`date_end` but both are accepted and intersected.
    pub date: Option<DateTime<Utc>>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub system: Option<SystemId>,
    pub talkgroup: Option<TalkgroupId>,
    pub group: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub sort: SortDir,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl SearchOptions {
    /// Server-enforced page size: `limit` defaults to `DEFAULT_LIMIT` and is
    /// capped at `MAX_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub count: i64,
    pub options: SearchOptions,
    pub results: Vec<CallSummary>,
}
