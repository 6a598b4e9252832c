use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{SystemId, TalkgroupId};

/// A session's on/off subscription map. Missing entries are inactive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LivefeedMap(pub HashMap<SystemId, HashMap<TalkgroupId, bool>>);

impl LivefeedMap {
    pub fn is_active(&self, sys: SystemId, tg: TalkgroupId) -> bool {
        self.0
            .get(&sys)
            .and_then(|tgs| tgs.get(&tg))
            .copied()
            .unwrap_or(false)
    }
}
