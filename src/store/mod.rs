//! Partitioned document store.
//!
//! The minimal store abstraction the pagination engine is written against:
//! hash-range routing, record storage, and split/merge mutation. See
//! [`container::PartitionedStore`] for the contract and concurrency notes.

pub mod container;
pub mod hash;
pub mod range;
pub mod record;

pub use container::{
    Continuation, FailureConfig, PartitionedStore, RangeResolution, ReadPage,
};
pub use hash::hash_partition_key;
pub use range::HashRange;
pub use record::{PartitionId, Record, Records, ResourceId};
