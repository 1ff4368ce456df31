//! Bubble-up combining: as leaf chaining values complete in arbitrary order, merge ready sibling
//! pairs up a pre-planned tree and finalize the root.
//!
//! The combiner never blocks and never chooses an order; it is a pure reaction to each
//! `deliver()` call, so it stays race-free no matter what order a worker pool finishes leaves in.
//! Merges happen only once both of a node's children are present, which means the total number of
//! merges performed over the life of a tree is always exactly `num_leaves - 1`, regardless of
//! arrival order.

use std::collections::HashMap;

use crate::plan::{NodeId, Plan, PlanNode};
use crate::primitive::{parent_cv, root_hash, ChainingValue};

/// What happened as a result of a [`Combiner::deliver`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverOutcome {
    /// The delivered value's sibling (if any) has not completed yet; nothing further to do.
    AwaitingSibling,
    /// Merging bubbled all the way to the root: this is the final digest.
    RootReady(ChainingValue),
}

/// Accumulates chaining values for one [`Plan`] and bubbles them up to the root.
///
/// Borrows the plan for as long as hashing is in progress; a `Combiner` and the `Plan` it was
/// built from always have matching lifetimes, since node ids from one plan are meaningless
/// against another.
#[derive(Debug)]
pub struct Combiner<'plan> {
    plan: &'plan Plan,
    cvs: HashMap<NodeId, ChainingValue>,
}

impl<'plan> Combiner<'plan> {
    /// Creates an empty combiner for `plan`. `num_leaves` worth of deliveries, plus however many
    /// of their ancestors become ready along the way, are expected before the root resolves.
    pub fn new(plan: &'plan Plan) -> Self {
        Self {
            plan,
            cvs: HashMap::with_capacity(2 * plan.num_leaves().saturating_sub(1).max(1)),
        }
    }

    /// Records `cv` as the chaining value of `node_id` and bubbles it up the tree as far as
    /// sibling availability allows.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `node_id` already has an entry: every node's chaining value is
    /// written exactly once, and a second write means a leaf was hashed twice or an inner node
    /// was merged twice, either of which is a programmer error in the caller, not a runtime
    /// condition this crate can recover from.
    pub fn deliver(&mut self, node_id: NodeId, cv: ChainingValue) -> DeliverOutcome {
        self.record(node_id, cv);
        self.bubble_from(node_id)
    }

    fn record(&mut self, node_id: NodeId, cv: ChainingValue) {
        let previous = self.cvs.insert(node_id, cv);
        debug_assert!(previous.is_none(), "chaining value delivered twice for the same node");
    }

    fn bubble_from(&mut self, node_id: NodeId) -> DeliverOutcome {
        let Some(parent_id) = self.plan.node(node_id).parent_id() else {
            return DeliverOutcome::RootReady(self.cvs[&node_id]);
        };

        let PlanNode::Inner { left_id, right_id, .. } = *self.plan.node(parent_id) else {
            unreachable!("a parent_id always names an Inner node")
        };

        let (Some(&left_cv), Some(&right_cv)) = (self.cvs.get(&left_id), self.cvs.get(&right_id)) else {
            return DeliverOutcome::AwaitingSibling;
        };

        let is_root = self.plan.node(parent_id).parent_id().is_none();
        let merged = if is_root {
            root_hash(&left_cv, &right_cv)
        } else {
            parent_cv(&left_cv, &right_cv)
        };

        self.record(parent_id, merged);
        self.bubble_from(parent_id)
    }
}
