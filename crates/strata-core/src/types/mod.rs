pub mod document;
pub mod event;
pub mod shard;
pub mod trigger;

pub use document::{get_field, set_field, DocPath, Document};
pub use event::{
    DecodedEvent, Event, EventMetadata, PROCESSED_FIELD, QUARANTINED_FIELD, REMOVED_FIELD,
    TIMESTAMP_FIELD, UPDATED_AT_FIELD,
};
pub use shard::{PathTemplate, ShardKey};
pub use trigger::{TriggerPhase, TriggerState, LAST_RUN_AT_FIELD, PENDING_FIELD};
