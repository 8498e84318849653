//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::error::{GroupError, GroupResult};
use crate::group::{ChainIter, FixedBinding, GroupNodeId, GroupRegistry};
use crate::ir::{Alignment, Bank, Reg};
use crate::utility::SaHashMap;
use log::error;

/// The finished constraint graph, handed to the physical allocator.
///
/// Every chain has to be assigned a base number, and its members then take
/// the following numbers in chain order. The graph can no longer change,
/// only the assignments can be recorded (and checked).
#[derive(Clone, Debug)]
pub struct GroupChains {
    registry: GroupRegistry,
    assigned: SaHashMap<GroupNodeId, u32>,
    verify: bool,
}

impl GroupChains {
    pub(crate) fn new(registry: GroupRegistry, verify: bool) -> Self {
        Self {
            registry,
            assigned: SaHashMap::default(),
            verify,
        }
    }

    /// The underlying graph.
    #[inline]
    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// The node of `reg`, if it is constrained at all.
    #[inline]
    pub fn node(&self, reg: Reg) -> Option<GroupNodeId> {
        self.registry.find(reg)
    }

    /// The register a node stands for.
    #[inline]
    pub fn reg(&self, node: GroupNodeId) -> Reg {
        self.registry.node(node).reg()
    }

    /// Every chain head.
    pub fn heads(&self) -> impl Iterator<Item = GroupNodeId> + '_ {
        self.registry.heads()
    }

    /// The members of the chain starting at `head`.
    pub fn chain(&self, head: GroupNodeId) -> ChainIter<'_> {
        self.registry.chain(head)
    }

    /// The parity the node's number needs.
    #[inline]
    pub fn alignment(&self, node: GroupNodeId) -> Alignment {
        self.registry.node(node).alignment()
    }

    /// The fixed binding of a node.
    #[inline]
    pub fn fixed(&self, node: GroupNodeId) -> Option<FixedBinding> {
        self.registry.node(node).fixed()
    }

    /// The bank the node's chain has to be allocated in.
    pub fn bank(&self, node: GroupNodeId) -> Bank {
        self.registry.bank_of(node)
    }

    /// The longest chain `bank` can hold.
    #[inline]
    pub fn max_group_len(&self, bank: Bank) -> usize {
        self.registry.max_len(bank)
    }

    /// Checks that numbering the chain at `head` from `base` upwards meets
    /// every constraint on its members.
    pub fn check_assignment(&self, head: GroupNodeId, base: u32) -> GroupResult<()> {
        if self.registry.node(head).prev().is_some() {
            return Err(GroupError::internal(format!("{head:?} is not the head of a chain")));
        }

        let bank = self.bank(head);
        let len = self.chain(head).count();
        let max = self.max_group_len(bank);

        if len > max {
            return Err(GroupError::internal(format!(
                "chain at {head:?} has {len} registers, {bank:?} allows {max}"
            )));
        }

        for (i, id) in self.chain(head).enumerate() {
            let node = self.registry.node(id);
            let number = base
                .checked_add(i as u32)
                .ok_or_else(|| GroupError::internal(format!("numbering {head:?} from {base} overflows")))?;

            if !node.alignment().allows(number) {
                return Err(GroupError::internal(format!(
                    "{} needs an {} number, got {number}",
                    node.reg(),
                    node.alignment()
                )));
            }

            if let Some(physical) = node.fixed().and_then(|f| f.physical) {
                if physical != number {
                    return Err(GroupError::internal(format!(
                        "{} is fixed to {physical}, got {number}",
                        node.reg()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Records that the chain at `head` was numbered from `base` upwards.
    ///
    /// When verification is on the assignment is checked first, and a bad
    /// one is a bug in the allocator: debug builds panic, release builds
    /// return the error.
    pub fn set_assigned_number(&mut self, head: GroupNodeId, base: u32) -> GroupResult<()> {
        if self.verify {
            if let Err(e) = self.check_assignment(head, base) {
                error!("invalid assignment: {e}");

                if cfg!(debug_assertions) {
                    panic!("invalid assignment: {e}");
                }

                return Err(e);
            }
        }

        let members: Vec<GroupNodeId> = self.chain(head).collect();

        for (i, id) in members.into_iter().enumerate() {
            self.assigned.insert(id, base.wrapping_add(i as u32));
        }

        Ok(())
    }

    /// The number assigned to `reg`, once its chain has been numbered.
    pub fn assigned_number(&self, reg: Reg) -> Option<u32> {
        self.node(reg).and_then(|id| self.assigned.get(&id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::registry;

    fn chains(verify: bool) -> GroupChains {
        let mut reg = registry();

        // r1 r2 r3, r1 even
        assert!(reg
            .make_group(&[Reg::temp(1), Reg::temp(2), Reg::temp(3)], Alignment::Even, true)
            .is_ok());

        GroupChains::new(reg, verify)
    }

    #[test]
    fn valid_assignment() {
        let mut chains = chains(true);
        let head = chains.node(Reg::temp(1)).unwrap();

        assert_eq!(chains.heads().collect::<Vec<_>>(), [head]);
        assert_eq!(chains.chain(head).map(|id| chains.reg(id)).collect::<Vec<_>>(), [
            Reg::temp(1),
            Reg::temp(2),
            Reg::temp(3)
        ]);
        assert!(chains.set_assigned_number(head, 4).is_ok());
        assert_eq!(chains.assigned_number(Reg::temp(3)), Some(6));
        assert_eq!(chains.assigned_number(Reg::temp(9)), None);
    }

    #[test]
    fn invalid_assignments() {
        let chains = chains(true);
        let head = chains.node(Reg::temp(1)).unwrap();
        let second = chains.node(Reg::temp(2)).unwrap();

        assert!(chains.check_assignment(head, 2).is_ok());
        assert!(chains.check_assignment(head, 3).is_err());
        assert!(chains.check_assignment(second, 3).is_err());
        assert!(chains.check_assignment(head, u32::MAX - 1).is_err());
    }

    #[test]
    fn unverified_assignments_are_recorded() {
        let mut chains = chains(false);
        let head = chains.node(Reg::temp(1)).unwrap();

        assert!(chains.set_assigned_number(head, 3).is_ok());
        assert_eq!(chains.assigned_number(Reg::temp(1)), Some(3));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "invalid assignment")]
    fn verified_assignments_assert() {
        let mut chains = chains(true);
        let head = chains.node(Reg::temp(1)).unwrap();

        let _ = chains.set_assigned_number(head, 3);
    }
}
