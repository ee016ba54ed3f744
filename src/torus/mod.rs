//! Toroidal field, partition workers and the barrier that paces them.

mod barrier;
mod field;
mod partition;
mod worker;

pub use barrier::{Barrier, BarrierAbandoned};
pub use field::{RunConfig, ToroidalField};
pub use partition::{
    Partition, PartitionPlan, max_safe_ghost_width, plan_partitions, safe_ghost_width, wrap_index,
};
