//! Handoff protocol — versioned documents carrying validated state from one
//! pipeline stage to the next.
//!
//! Documents are write-once. A correction is a new document with a new
//! `handoff_id`; the archive keeps every version.

pub mod store;
pub mod types;
pub mod validate;

pub use store::HandoffStore;
pub use types::*;
