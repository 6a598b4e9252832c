use std::collections::HashSet;

use callfeed_protocol::{SortDir, SystemId, TalkgroupId};
use chrono::{DateTime, Utc};

/// `searchCalls`'s filter after permission narrowing and group/tag expansion
/// (spec §4.A, §4.G): everything a store implementation needs, with no
/// knowledge of credentials or labels.
#[derive(Clone, Debug, Default)]
pub struct ResolvedFilter {
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    /// `None` means "no system restriction"; `Some(empty)` means "matches
    /// nothing" (e.g. a permission allow-list that excludes every system the
    /// query asked for).
    pub systems: Option<HashSet<SystemId>>,
    pub talkgroups: Option<HashSet<TalkgroupId>>,
    pub sort: SortDir,
    pub limit: u32,
    pub offset: u32,
}
