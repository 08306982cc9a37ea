pub mod accounts;
pub mod backup;
pub mod journal;
pub mod rebalance;
pub mod sectors;
pub mod setup;
pub mod snapshots;
pub mod summary;
pub mod trades;
pub mod ui;
