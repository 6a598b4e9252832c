use std::collections::HashSet;

use callfeed_protocol::{SearchOptions, SearchResult, SortDir, SystemId, TalkgroupId, MAX_LIMIT};
use callfeed_store::{ResolvedFilter, StoreOps};
use chrono::{Duration, Utc};
use tracing::warn;

use crate::access::Permission;
use crate::config::ConfigSnapshot;
use crate::error::ControlResult;

/// Executes `searchCalls` against the store, narrowed to what `permission`
/// allows (spec §4.G): "restricts the filter to the permission allow-list
/// before calling 4.A".
pub struct PlaybackService<S> {
    store: S,
}

impl<S: StoreOps> PlaybackService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn search(
        &self,
        options: SearchOptions,
        permission: &Permission,
        config: &ConfigSnapshot,
    ) -> ControlResult<SearchResult> {
        let (date_start, date_end) = day_window(&options);

        // Single-system query: one store round trip, talkgroup set narrowed
        // precisely to that system's scope.
        if let Some(sys) = options.system {
            let filter = single_system_filter(sys, &options, permission, config, date_start, date_end);
            let (count, results) = self.store.search_calls(&filter).await?;
            return Ok(SearchResult {
                count,
                options,
                results,
            });
        }

        // No system pinned: permission's allow-list may restrict each
        // candidate system's talkgroups differently, so resolve and query
        // per system, then merge in memory. Each per-system query is sorted
        // the same direction as the final merge, so fetching the top
        // `offset + limit` rows from every system is enough to guarantee the
        // merged page is correct: no system can contribute a row inside the
        // final window that falls outside its own top `offset + limit`.
        let candidates = candidate_systems(permission, config);
        let limit = options.effective_limit();
        let offset = options.offset;
        let window = offset.saturating_add(limit);
        let per_system_limit = window.min(MAX_LIMIT);
        if window > MAX_LIMIT {
            warn!(
                offset,
                limit,
                max_limit = MAX_LIMIT,
                "cross-system search window exceeds per-query cap; results beyond the cap may be dropped"
            );
        }

        let mut merged = Vec::new();
        let mut total = 0i64;
        for sys in candidates {
            let mut filter = single_system_filter(sys, &options, permission, config, date_start, date_end);
            if matches!(&filter.talkgroups, Some(t) if t.is_empty()) {
                continue;
            }
            filter.limit = per_system_limit;
            filter.offset = 0;
            let (count, results) = self.store.search_calls(&filter).await?;
            total += count;
            merged.extend(results);
        }

        match options.sort {
            SortDir::Asc => merged.sort_by_key(|c| c.date_time),
            SortDir::Desc => merged.sort_by_key(|c| std::cmp::Reverse(c.date_time)),
        }
        let page = merged.into_iter().skip(offset as usize).take(limit as usize).collect();

        Ok(SearchResult {
            count: total,
            options,
            results: page,
        })
    }
}

fn day_window(options: &SearchOptions) -> (Option<chrono::DateTime<Utc>>, Option<chrono::DateTime<Utc>>) {
    let mut start = options.date_start;
    let mut end = options.date_end;
    if let Some(date) = options.date {
        let midnight = date.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let next_midnight = midnight + Duration::days(1);
        start = Some(start.map_or(midnight, |s| s.max(midnight)));
        end = Some(end.map_or(next_midnight, |e| e.min(next_midnight)));
    }
    (start, end)
}

fn candidate_systems(permission: &Permission, config: &ConfigSnapshot) -> Vec<SystemId> {
    use callfeed_protocol::SystemsAllow;
    match &permission.systems {
        SystemsAllow::All(_) => config.data.systems.iter().map(|s| s.id).collect(),
        SystemsAllow::Scoped(map) => map.keys().copied().collect(),
    }
}

/// `None` means unrestricted; `Some(empty)` means the system contributes
/// nothing (permission denies it, or group/tag/talkgroup narrowing leaves
/// nothing).
fn permission_scope(permission: &Permission, sys: SystemId) -> Option<HashSet<TalkgroupId>> {
    use callfeed_protocol::{SystemsAllow, TalkgroupScope};
    match &permission.systems {
        SystemsAllow::All(_) => None,
        SystemsAllow::Scoped(map) => match map.get(&sys) {
            None => Some(HashSet::new()),
            Some(TalkgroupScope::All(_)) => None,
            Some(TalkgroupScope::List(list)) => Some(list.iter().copied().collect()),
        },
    }
}

fn single_system_filter(
    sys: SystemId,
    options: &SearchOptions,
    permission: &Permission,
    config: &ConfigSnapshot,
    date_start: Option<chrono::DateTime<Utc>>,
    date_end: Option<chrono::DateTime<Utc>>,
) -> ResolvedFilter {
    let mut talkgroups = permission_scope(permission, sys);

    if let Some(tg) = options.talkgroup {
        talkgroups = Some(intersect_or(talkgroups, std::iter::once(tg).collect()));
    }
    if let Some(group) = &options.group {
        talkgroups = Some(intersect_or(talkgroups, config.talkgroups_in_group(sys, group).into_iter().collect()));
    }
    if let Some(tag) = &options.tag {
        talkgroups = Some(intersect_or(talkgroups, config.talkgroups_with_tag(sys, tag).into_iter().collect()));
    }

    ResolvedFilter {
        date_start,
        date_end,
        systems: Some(std::iter::once(sys).collect()),
        talkgroups,
        sort: options.sort,
        limit: if options.system.is_some() { options.effective_limit() } else { MAX_LIMIT },
        offset: if options.system.is_some() { options.offset } else { 0 },
    }
}

fn intersect_or(existing: Option<HashSet<TalkgroupId>>, new: HashSet<TalkgroupId>) -> HashSet<TalkgroupId> {
    match existing {
        None => new,
        Some(existing) => existing.intersection(&new).copied().collect(),
    }
}
