//! Crawl state types: targets, records, and per-host bookkeeping

mod host_state;
mod record;
mod target;

pub use host_state::HostState;
pub use record::{fingerprint, DedupIndex, Record};
pub use target::{Target, TargetId, TargetKind, TargetSeed, TargetState};
