//! Picking a join order for the leaves of a from clause.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use relplan_error::{DbError, Result};
use tracing::{debug, trace};

use super::conjuncts::{make_predicate, uses_only};
use crate::ast::JoinType;
use crate::config::MAX_JOIN_LEAVES_LIMIT;
use crate::execution::operators::PlanNode;
use crate::expr::Expression;

/// Set of leaf indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafSet(u64);

impl LeafSet {
    pub const fn single(idx: usize) -> Self {
        LeafSet(1 << idx)
    }

    pub const fn union(self, other: LeafSet) -> Self {
        LeafSet(self.0 | other.0)
    }

    pub const fn overlaps(self, other: LeafSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, idx: usize) -> bool {
        self.overlaps(Self::single(idx))
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A plan covering some set of leaves.
#[derive(Debug, Clone)]
pub struct JoinComponent {
    /// Prepared plan.
    pub plan: PlanNode,
    pub leaves: LeafSet,
    /// Indices of the conjuncts applied somewhere in `plan`.
    pub conjuncts_used: BTreeSet<usize>,
}

impl JoinComponent {
    pub fn leaf(idx: usize, plan: PlanNode, conjuncts_used: BTreeSet<usize>) -> Self {
        JoinComponent {
            plan,
            leaves: LeafSet::single(idx),
            conjuncts_used,
        }
    }
}

/// Join leaf components into a single component covering all of them.
///
/// Works up by number of leaves joined, keeping the cheapest plan seen for
/// each exact set of leaves. Plans at each level are built by joining a plan
/// from the previous level with one more leaf, so the result is always left
/// deep.
///
/// Each join takes any conjunct in `candidates` that isn't already used on
/// either side and only references columns of the two sides. Conjuncts that
/// never satisfy that are left out of `conjuncts_used` of the result, it's up
/// to the caller to check.
pub fn generate_optimal_join(
    leaves: Vec<JoinComponent>,
    conjuncts: &[Expression],
    candidates: &[usize],
) -> Result<JoinComponent> {
    if leaves.is_empty() {
        return Err(DbError::planning("Cannot generate a join with no leaves"));
    }
    if leaves.len() > MAX_JOIN_LEAVES_LIMIT {
        return Err(DbError::planning(format!(
            "Cannot join more than {MAX_JOIN_LEAVES_LIMIT} leaves"
        ))
        .with_field("leaves", leaves.len()));
    }

    let mut current: IndexMap<LeafSet, JoinComponent> =
        leaves.iter().map(|leaf| (leaf.leaves, leaf.clone())).collect();

    for level in 2..=leaves.len() {
        let mut next: IndexMap<LeafSet, JoinComponent> = IndexMap::new();

        for component in current.values() {
            for leaf in &leaves {
                if component.leaves.overlaps(leaf.leaves) {
                    continue;
                }

                let mut used: BTreeSet<usize> = component
                    .conjuncts_used
                    .union(&leaf.conjuncts_used)
                    .copied()
                    .collect();

                let schema = component.plan.schema().concat(leaf.plan.schema());
                let mut join_conjuncts = Vec::new();
                for &idx in candidates {
                    if !used.contains(&idx) && uses_only(&conjuncts[idx], &schema) {
                        join_conjuncts.push(conjuncts[idx].clone());
                        used.insert(idx);
                    }
                }

                let mut plan = PlanNode::nested_loop_join(
                    component.plan.clone(),
                    leaf.plan.clone(),
                    JoinType::Inner,
                    make_predicate(join_conjuncts),
                )?;
                plan.prepare()?;

                let leaves = component.leaves.union(leaf.leaves);
                let total = plan.cost().total();
                trace!(?leaves, total, "considering join");

                if let Some(existing) = next.get(&leaves) {
                    if existing.plan.cost().total() <= total {
                        continue;
                    }
                }
                next.insert(
                    leaves,
                    JoinComponent {
                        plan,
                        leaves,
                        conjuncts_used: used,
                    },
                );
            }
        }

        debug!(level, plans = next.len(), "generated join plans");
        current = next;
    }

    // Every level joins in one more leaf, so the last level has a single
    // plan covering everything.
    current
        .into_values()
        .next()
        .ok_or_else(|| DbError::planning("Join ordering produced no plan"))
}
