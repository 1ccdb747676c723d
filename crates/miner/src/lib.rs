//! Combination mining over fact-checked signal history.

pub mod combinations;
pub mod miner;
pub mod signature;
pub mod summary_cache;

pub use combinations::{k_subsets, subset_count, KSubsets};
pub use miner::{compute_cross_tf_combos, compute_tf_combos, CombinationMiner, MinerReport};
pub use signature::{cross_combo_hash, join_names, tf_combo_hash};
pub use summary_cache::{SignalSummary, SignalSummaryCache};
