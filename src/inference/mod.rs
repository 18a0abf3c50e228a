//! Data-parallel inference drivers.
//!
//! Items are split into contiguous shards across OS worker processes, each
//! bound to a disjoint GPU subset. The batched driver produces exactly one
//! completion per item; the self-play driver appends completions to eligible
//! items across passes. Both preserve input order end to end.

mod driver;
mod self_play;
mod split;

pub use driver::{
    generate_in_process, run_distributed, run_shard_worker, DistributedConfig, ShardWorkerConfig,
    WorkerMode,
};
pub use self_play::{is_eligible, run_pass_in_process, run_until_target};
pub use split::{gpu_assignments, split_ranges};
