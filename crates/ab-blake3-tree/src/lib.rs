//! BLAKE3 subtree planning, primitive contracts, and out-of-order chaining value combining.
//!
//! This crate is the synchronous, allocation-light core of a parallel BLAKE3 hasher: given only a
//! total input length it can plan the exact leaf/inner-node shape of the canonical BLAKE3 Merkle
//! tree ([`plan`]), it exposes the five low-level operations needed to hash the leaves and combine
//! their results ([`primitive`]), and it knows how to bubble chaining values up the planned tree as
//! they arrive in arbitrary order ([`combine`]). None of it touches threads, channels, or I/O; that
//! lives one layer up, in `ab-parallel-hasher`.

mod combine;
mod plan;
mod primitive;

pub use combine::{Combiner, DeliverOutcome};
pub use plan::{NodeId, Plan, PlanNode, PlanPolicy};
pub use primitive::{
    hash_single, hash_subtree, left_subtree_len, max_subtree_len, parent_cv, root_hash,
    ChainingValue, CHUNK_LEN,
};
