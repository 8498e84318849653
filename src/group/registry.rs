//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::PoolMap;
use crate::error::{GroupError, GroupResult};
use crate::group::{GroupNode, GroupNodeId, NodePayload};
use crate::ir::{Bank, Reg};
use crate::utility::SaHashMap;
use log::trace;
use std::collections::BTreeSet;

/// A maximal run of nodes connected by links, as seen from one of its members.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Segment {
    /// The first node of the run.
    pub head: GroupNodeId,
    /// How far from `head` the node the segment was computed for is.
    pub position: usize,
    /// How many nodes the run has.
    pub len: usize,
    /// The bank of the first fixed node in the run, if there is one.
    pub fixed_bank: Option<Bank>,
}

/// Owns every [`GroupNode`] of a compilation unit.
///
/// Nodes are created lazily the first time a register takes part in a
/// constraint, and are all dropped with the registry. The registry also
/// knows the longest group each bank can hold, which every link respects.
#[derive(Clone, Debug)]
pub struct GroupRegistry {
    pub(crate) nodes: PoolMap<GroupNodeId, GroupNode>,
    by_reg: SaHashMap<Reg, GroupNodeId>,
    // ordered so that walking the chains is deterministic
    heads: BTreeSet<GroupNodeId>,
    max_len: [usize; 4],
}

impl GroupRegistry {
    /// Creates an empty registry, getting the maximum group length for each
    /// bank from `max_len`.
    pub fn new(max_len: impl Fn(Bank) -> usize) -> Self {
        Self {
            nodes: PoolMap::new(),
            by_reg: SaHashMap::default(),
            heads: BTreeSet::new(),
            max_len: Bank::ALL.map(max_len),
        }
    }

    /// The longest run of consecutive registers allowed in `bank`.
    #[inline]
    pub fn max_len(&self, bank: Bank) -> usize {
        self.max_len[bank as usize]
    }

    /// Gets the node for `reg`, creating an unlinked, unaligned one if there
    /// isn't one yet.
    pub fn find_or_create(&mut self, reg: Reg) -> GroupNodeId {
        debug_assert!(reg.is_virtual(), "only virtual registers get nodes, got {reg}");

        if let Some(&id) = self.by_reg.get(&reg) {
            return id;
        }

        let id = self.nodes.insert(GroupNode::new(reg));

        self.by_reg.insert(reg, id);
        self.heads.insert(id);

        trace!("created node {id:?} for {reg}");

        id
    }

    /// Gets the node for `reg` without creating one.
    #[inline]
    pub fn find(&self, reg: Reg) -> Option<GroupNodeId> {
        self.by_reg.get(&reg).copied()
    }

    /// Destroys the node for `reg`. Its neighbours become the tail and head
    /// of the two chains left behind. Returns `false` if there was no node.
    pub fn release(&mut self, reg: Reg) -> bool {
        let Some(id) = self.find(reg) else {
            return false;
        };

        debug_assert!(
            !matches!(self.nodes[id].payload, NodePayload::Copy(_)),
            "releasing {reg} while a copy record refers to it"
        );

        self.unlink_prev(id);
        self.unlink(id);
        self.heads.remove(&id);
        self.by_reg.remove(&reg);
        self.nodes.remove(id);

        trace!("released node {id:?} for {reg}");

        true
    }

    /// Gets a node.
    #[inline]
    pub fn node(&self, id: GroupNodeId) -> &GroupNode {
        &self.nodes[id]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: GroupNodeId) -> &mut GroupNode {
        &mut self.nodes[id]
    }

    /// How many nodes exist.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no register has been constrained yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node without a `prev`, in key order.
    pub fn heads(&self) -> impl Iterator<Item = GroupNodeId> + '_ {
        self.heads.iter().copied()
    }

    pub(crate) fn mark_head(&mut self, id: GroupNodeId) {
        self.heads.insert(id);
    }

    pub(crate) fn unmark_head(&mut self, id: GroupNodeId) {
        self.heads.remove(&id);
    }

    /// Walks the chain starting at `head` through every link.
    pub fn chain(&self, head: GroupNodeId) -> ChainIter<'_> {
        ChainIter {
            registry: self,
            next: Some(head),
        }
    }

    /// The first node of the chain `id` is in.
    pub fn head_of(&self, id: GroupNodeId) -> GroupNodeId {
        self.segment(id, false).head
    }

    /// Computes the run `id` is part of. With `mandatory_only`, optional
    /// links are treated as if they were already broken.
    pub fn segment(&self, id: GroupNodeId, mandatory_only: bool) -> Segment {
        let follows = |from: &GroupNode| from.next.is_some() && (!mandatory_only || !from.optional_link);

        let mut head = id;
        let mut position = 0;

        while let Some(prev) = self.nodes[head].prev {
            if !follows(&self.nodes[prev]) || position > self.nodes.len() {
                break;
            }

            head = prev;
            position += 1;
        }

        let mut len = 1;
        let mut fixed_bank = self.nodes[head].fixed.map(|f| f.bank);
        let mut cursor = head;

        while follows(&self.nodes[cursor]) && len <= self.nodes.len() {
            let Some(next) = self.nodes[cursor].next else {
                break;
            };

            fixed_bank = fixed_bank.or(self.nodes[next].fixed.map(|f| f.bank));
            cursor = next;
            len += 1;
        }

        Segment {
            head,
            position,
            len,
            fixed_bank,
        }
    }

    /// The bank the chain containing `id` lives in.
    pub fn bank_of(&self, id: GroupNodeId) -> Bank {
        self.segment(id, false).fixed_bank.unwrap_or(Bank::Temp)
    }

    /// Checks every structural invariant of the constraint graph:
    ///
    /// - `n.next.prev == n` and `n.prev.next == n`
    /// - the head set is exactly the nodes without a `prev`
    /// - chains are acyclic and no longer than their bank allows
    /// - alignment alternates along every link
    /// - adjacent fixed nodes are compatible
    pub fn check_well_formed(&self) -> GroupResult<()> {
        for (id, node) in self.nodes.iter() {
            if self.find(node.reg) != Some(id) {
                return Err(GroupError::internal(format!("{id:?} is not registered for {}", node.reg)));
            }

            if let Some(next) = node.next {
                if self.nodes.get(next).and_then(|n| n.prev) != Some(id) {
                    return Err(GroupError::internal(format!("{id:?}.next.prev is not {id:?}")));
                }

                let (a, b) = (node.alignment, self.nodes[next].alignment);

                if !a.is_none() && !b.is_none() && b != a.complement() {
                    return Err(GroupError::internal(format!(
                        "alignment does not alternate between {} and {}",
                        node.reg, self.nodes[next].reg
                    )));
                }

                if let (Some(f), Some(g)) = (node.fixed, self.nodes[next].fixed) {
                    if !f.can_precede(&g) {
                        return Err(GroupError::internal(format!(
                            "fixed registers {} and {} cannot be adjacent",
                            node.reg, self.nodes[next].reg
                        )));
                    }
                }
            }

            if let Some(prev) = node.prev {
                if self.nodes.get(prev).and_then(|p| p.next) != Some(id) {
                    return Err(GroupError::internal(format!("{id:?}.prev.next is not {id:?}")));
                }
            }

            if node.prev.is_none() != self.heads.contains(&id) {
                return Err(GroupError::internal(format!("head set is wrong about {id:?}")));
            }
        }

        for head in self.heads() {
            let mut len = 0;
            let mut bank = None;

            for id in self.chain(head) {
                len += 1;
                bank = bank.or(self.nodes[id].fixed.map(|f| f.bank));

                if len > self.nodes.len() {
                    return Err(GroupError::internal(format!("chain at {head:?} has a cycle")));
                }
            }

            let max = self.max_len(bank.unwrap_or(Bank::Temp));

            if len > max {
                return Err(GroupError::internal(format!(
                    "chain at {head:?} has {len} registers, the maximum is {max}"
                )));
            }
        }

        Ok(())
    }
}

/// Iterates over the nodes of a chain from its head.
#[derive(Clone, Debug)]
pub struct ChainIter<'r> {
    registry: &'r GroupRegistry,
    next: Option<GroupNodeId>,
}

impl<'r> Iterator for ChainIter<'r> {
    type Item = GroupNodeId;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|id| {
            self.next = self.registry.nodes[id].next;

            id
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::registry;

    #[test]
    fn nodes_are_created_once() {
        let mut reg = registry();

        assert_eq!(reg.find(Reg::temp(3)), None);

        let a = reg.find_or_create(Reg::temp(3));
        let b = reg.find_or_create(Reg::temp(3));

        assert_eq!(a, b);
        assert_eq!(reg.find(Reg::temp(3)), Some(a));
        assert_eq!(reg.heads().collect::<Vec<_>>(), [a]);
        assert_eq!(reg.node(a).reg(), Reg::temp(3));
        assert!(reg.check_well_formed().is_ok());
    }

    #[test]
    fn release_splits_chain() {
        let mut reg = registry();

        assert!(reg.link(Reg::temp(1), None, Reg::temp(2), None, true, false));
        assert!(reg.link(Reg::temp(2), None, Reg::temp(3), None, true, false));
        assert!(reg.release(Reg::temp(2)));
        assert!(!reg.release(Reg::temp(2)));

        let one = reg.find(Reg::temp(1)).unwrap();
        let three = reg.find(Reg::temp(3)).unwrap();

        assert_eq!(reg.node(one).next(), None);
        assert_eq!(reg.node(three).prev(), None);
        assert_eq!(reg.heads().count(), 2);
        assert_eq!(reg.len(), 2);
        assert!(reg.check_well_formed().is_ok());
    }

    #[test]
    fn segments() {
        let mut reg = registry();

        assert!(reg.link(Reg::temp(1), None, Reg::temp(2), None, true, false));
        assert!(reg.link(Reg::temp(2), None, Reg::temp(3), None, false, false));

        let two = reg.find(Reg::temp(2)).unwrap();
        let three = reg.find(Reg::temp(3)).unwrap();
        let full = reg.segment(three, false);
        let hard = reg.segment(three, true);

        assert_eq!((full.position, full.len), (2, 3));
        assert_eq!((hard.head, hard.position, hard.len), (three, 0, 1));
        assert_eq!(reg.segment(two, true).len, 2);
        assert_eq!(reg.head_of(three), reg.find(Reg::temp(1)).unwrap());
        assert_eq!(reg.bank_of(three), Bank::Temp);
    }
}
