pub mod disk;
pub mod memory;

use crate::core::model::{AssetSnapshot, Trade};

pub use disk::DiskRepository;
pub use memory::MemoryRepository;

/// Sorts by trade date descending; ties keep insertion order.
pub(crate) fn newest_first(mut trades: Vec<Trade>) -> Vec<Trade> {
    trades.sort_by(|a, b| b.date.cmp(&a.date));
    trades
}

pub(crate) fn latest_snapshots_first(mut snapshots: Vec<AssetSnapshot>) -> Vec<AssetSnapshot> {
    snapshots.sort_by(|a, b| b.date.cmp(&a.date));
    snapshots
}
