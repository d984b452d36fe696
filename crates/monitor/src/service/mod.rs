//! Long-running background work.

pub mod status;
pub mod sync;

pub use status::{SyncSnapshot, SyncStatus};
pub use sync::{background_inventory_sync, sync_once};
