//! Wire types and codec shared between the gateway and any client: the data
//! model (§3), the `SearchOptions`/`SearchResult` playback protocol (§4.G),
//! the `LivefeedMap` subscription shape (§3), and the tagged-array control
//! codec (§4.I).

pub mod ids;
pub mod livefeed;
pub mod message;
pub mod model;
pub mod options;

pub use ids::{CallId, SystemId, TalkgroupId, UnitId};
pub use livefeed::LivefeedMap;
pub use message::{decode, encode, ClientMessage, ServerMessage};
pub use model::{
    AccessCredential, AllMarker, ApiKey, Call, CallSummary, Downstream, FrequencyEntry,
    PublicConfig, SourceEntry, System, SystemsAllow, Talkgroup, TalkgroupScope, Unit,
};
pub use options::{SearchOptions, SearchResult, SortDir, DEFAULT_LIMIT, MAX_LIMIT};
