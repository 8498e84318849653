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
use crate::group::{GroupNodeId, GroupRegistry};
use crate::ir::{Alignment, Bank, Reg};
use log::trace;
use smallvec::SmallVec;

impl GroupRegistry {
    /// Requires `next_reg` to get the hardware number directly after `prev_reg`.
    ///
    /// `prev_node`/`next_node` may be passed when the caller already looked
    /// them up, otherwise they are found (and created on success). Returns
    /// `false` without changing anything if the link would break one of the
    /// chain invariants. A mandatory link is allowed to displace optional
    /// links, and when it succeeds every optional link in the two chains
    /// it joins is dropped.
    pub fn link(
        &mut self,
        prev_reg: Reg,
        prev_node: Option<GroupNodeId>,
        next_reg: Reg,
        next_node: Option<GroupNodeId>,
        mandatory: bool,
        via_instruction: bool,
    ) -> bool {
        if prev_reg == next_reg || !prev_reg.is_virtual() || !next_reg.is_virtual() {
            return false;
        }

        let p = prev_node.or_else(|| self.find(prev_reg));
        let n = next_node.or_else(|| self.find(next_reg));

        debug_assert!(p.map_or(true, |p| self.nodes[p].reg == prev_reg));
        debug_assert!(n.map_or(true, |n| self.nodes[n].reg == next_reg));

        if let (Some(p), Some(n)) = (p, n) {
            if self.nodes[p].next == Some(n) {
                self.strengthen(p, mandatory, via_instruction);

                return true;
            }
        }

        if !self.can_link(p, n, mandatory) {
            trace!("refusing to link {prev_reg} -> {next_reg}");

            return false;
        }

        if mandatory {
            for id in [p, n].into_iter().flatten() {
                self.drop_optional_links(id);
            }
        }

        let p = p.unwrap_or_else(|| self.find_or_create(prev_reg));
        let n = n.unwrap_or_else(|| self.find_or_create(next_reg));

        let node = self.node_mut(p);
        node.next = Some(n);
        node.optional_link = !mandatory;
        node.instruction_linked = via_instruction;

        self.node_mut(n).prev = Some(p);
        self.unmark_head(n);

        let source = if self.nodes[p].alignment.is_none() { n } else { p };

        self.propagate_alignment(source);

        trace!(
            "linked {prev_reg} -> {next_reg}{}",
            if mandatory { "" } else { " (optional)" }
        );

        true
    }

    /// Removes the link after `id`. Returns `false` if there was none.
    pub fn unlink(&mut self, id: GroupNodeId) -> bool {
        let node = self.node_mut(id);

        let Some(next) = node.next.take() else {
            return false;
        };

        node.optional_link = false;
        node.instruction_linked = false;

        self.node_mut(next).prev = None;
        self.mark_head(next);

        trace!("unlinked {} -> {}", self.nodes[id].reg, self.nodes[next].reg);

        true
    }

    /// Removes the link before `id`. Returns `false` if there was none.
    pub fn unlink_prev(&mut self, id: GroupNodeId) -> bool {
        match self.nodes[id].prev {
            Some(prev) => self.unlink(prev),
            None => false,
        }
    }

    /// Requires the register at `id` to have the given parity, and every
    /// other register in its chain the matching alternating one.
    ///
    /// Fails if the chain already has a different alignment at `id`.
    pub fn set_alignment(&mut self, id: GroupNodeId, alignment: Alignment, mandatory: bool) -> bool {
        if alignment.is_none() {
            return true;
        }

        let current = self.nodes[id].alignment;

        if !current.is_none() && current != alignment {
            return false;
        }

        let node = self.node_mut(id);
        node.alignment = alignment;
        node.alignment_mandatory |= mandatory;

        self.propagate_alignment(id);

        true
    }

    /// Commits a validated candidate: links every register to the next one
    /// with mandatory links, and pins the alignment of the first register.
    ///
    /// Runs of hardware-numbered registers are already consecutive and
    /// have nothing to record.
    pub fn make_group(&mut self, regs: &[Reg], alignment: Alignment, via_instruction: bool) -> GroupResult<()> {
        if regs.iter().any(|r| !r.is_virtual()) {
            debug_assert!(regs.iter().all(|r| r.hw_bank().is_some()));

            return Ok(());
        }

        for pair in regs.windows(2) {
            if !self.link(pair[0], None, pair[1], None, true, via_instruction) {
                return Err(GroupError::internal(format!(
                    "{} cannot follow {} in a group that was validated",
                    pair[1], pair[0]
                )));
            }
        }

        if let (Some(&first), false) = (regs.first(), alignment.is_none()) {
            let id = self.find_or_create(first);

            if !self.set_alignment(id, alignment, true) {
                return Err(GroupError::internal(format!(
                    "{first} cannot be {alignment} in a group that was validated"
                )));
            }
        }

        Ok(())
    }

    fn can_link(&self, p: Option<GroupNodeId>, n: Option<GroupNodeId>, mandatory: bool) -> bool {
        if let (Some(p), Some(n)) = (p, n) {
            let (prev, next) = (&self.nodes[p], &self.nodes[n]);

            if let (Some(f), Some(g)) = (prev.fixed, next.fixed) {
                if !f.can_precede(&g) {
                    return false;
                }
            }

            if !prev.alignment.is_none()
                && !next.alignment.is_none()
                && next.alignment != prev.alignment.complement()
            {
                return false;
            }
        }

        // an occupied slot only gives way if a mandatory link displaces an optional one
        if let Some(p) = p {
            if self.nodes[p].next.is_some() && !(mandatory && self.nodes[p].optional_link) {
                return false;
            }
        }

        if let Some(y) = n.and_then(|n| self.nodes[n].prev) {
            if !(mandatory && self.nodes[y].optional_link) {
                return false;
            }
        }

        let before = p.map(|p| self.segment(p, mandatory));
        let after = n.map(|n| self.segment(n, mandatory));

        if let (Some(a), Some(b)) = (before, after) {
            if a.head == b.head {
                return false;
            }
        }

        let bank = match (before.and_then(|s| s.fixed_bank), after.and_then(|s| s.fixed_bank)) {
            (Some(a), Some(b)) if a != b => return false,
            (a, b) => a.or(b).unwrap_or(Bank::Temp),
        };

        let prefix = before.map_or(1, |s| s.position + 1);
        let suffix = after.map_or(1, |s| s.len - s.position);

        prefix + suffix <= self.max_len(bank)
    }

    fn strengthen(&mut self, p: GroupNodeId, mandatory: bool, via_instruction: bool) {
        if via_instruction {
            self.node_mut(p).instruction_linked = true;
        }

        if mandatory && self.nodes[p].optional_link {
            self.node_mut(p).optional_link = false;
            self.drop_optional_links(p);
        }
    }

    fn drop_optional_links(&mut self, id: GroupNodeId) {
        let head = self.head_of(id);
        let optional: SmallVec<[GroupNodeId; 4]> = self
            .chain(head)
            .filter(|&x| self.nodes[x].optional_link)
            .collect();

        for x in optional {
            self.unlink(x);
        }
    }

    fn propagate_alignment(&mut self, id: GroupNodeId) {
        let alignment = self.nodes[id].alignment;

        if alignment.is_none() {
            return;
        }

        let segment = self.segment(id, false);
        let base = alignment.at_offset(segment.position);
        let members: SmallVec<[GroupNodeId; 8]> = self.chain(segment.head).collect();
        let mandatory = members.iter().any(|&m| self.nodes[m].alignment_mandatory);

        for (i, m) in members.into_iter().enumerate() {
            let node = self.node_mut(m);

            node.alignment = base.at_offset(i);
            node.alignment_mandatory = mandatory;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::ArenaKey;
    use crate::error::GroupError;
    use crate::group::tests::registry;
    use crate::group::*;
    use crate::ir::*;

    fn r(n: u32) -> Reg {
        Reg::temp(n)
    }

    fn chain_regs(reg: &GroupRegistry, head: Reg) -> Vec<Reg> {
        let head = reg.find(head).unwrap();

        reg.chain(head).map(|id| reg.node(id).reg()).collect()
    }

    #[test]
    fn alignment_spreads_through_chain() {
        let mut reg = registry();

        assert!(reg.link(r(5), None, r(6), None, true, true));
        assert!(reg.link(r(6), None, r(7), None, true, true));

        let six = reg.find(r(6)).unwrap();

        assert!(reg.set_alignment(six, Alignment::Odd, true));

        let aligns: Vec<Alignment> = [5, 6, 7]
            .iter()
            .map(|&n| reg.node(reg.find(r(n)).unwrap()).alignment())
            .collect();

        assert_eq!(aligns, [Alignment::Even, Alignment::Odd, Alignment::Even]);
        assert!(reg.node(reg.find(r(7)).unwrap()).is_alignment_mandatory());
        assert!(!reg.set_alignment(six, Alignment::Even, true));

        // a new node joining later picks the alignment up
        assert!(reg.link(r(7), None, r(8), None, true, false));
        assert_eq!(reg.node(reg.find(r(8)).unwrap()).alignment(), Alignment::Odd);
        assert!(reg.check_well_formed().is_ok());
    }

    #[test]
    fn failures_do_not_mutate() {
        let mut reg = registry();

        assert!(reg.link(r(1), None, r(2), None, true, false));
        assert!(reg.link(r(2), None, r(3), None, true, false));

        let nodes = reg.len();

        // identical
        assert!(!reg.link(r(1), None, r(1), None, true, false));
        // slot taken
        assert!(!reg.link(r(1), None, r(9), None, true, false));
        assert!(!reg.link(r(9), None, r(2), None, true, false));
        // cycle
        assert!(!reg.link(r(3), None, r(1), None, true, false));
        // not registers
        assert!(!reg.link(Reg::imm(0), None, r(9), None, true, false));

        assert_eq!(reg.len(), nodes);
        assert_eq!(reg.find(r(9)), None);
        assert_eq!(chain_regs(&reg, r(1)), [r(1), r(2), r(3)]);
    }

    #[test]
    fn alignments_must_be_complementary() {
        let mut reg = registry();
        let a = reg.find_or_create(r(1));
        let b = reg.find_or_create(r(2));

        assert!(reg.set_alignment(a, Alignment::Even, true));
        assert!(reg.set_alignment(b, Alignment::Even, true));
        assert!(!reg.link(r(1), Some(a), r(2), Some(b), true, false));

        let c = reg.find_or_create(r(3));

        assert!(reg.set_alignment(c, Alignment::Odd, false));
        assert!(reg.link(r(1), Some(a), r(3), Some(c), true, false));
        assert!(reg.node(c).is_alignment_mandatory());
    }

    #[test]
    fn length_is_bounded_for_every_maximum() {
        for max in 1..=6 {
            let mut reg = GroupRegistry::new(|_| max);

            for n in 1..max as u32 {
                assert!(reg.link(r(n - 1), None, r(n), None, true, false));
            }

            assert!(!reg.link(r(max as u32 - 1), None, r(max as u32), None, true, false));

            // joining two chains counts both
            if max >= 2 {
                assert!(!reg.link(r(100), None, r(0), None, true, false));
            }

            assert!(reg.check_well_formed().is_ok());
        }
    }

    #[test]
    fn mandatory_displaces_optional() {
        let mut reg = registry();

        assert!(reg.link(r(1), None, r(2), None, false, false));
        assert!(reg.node(reg.find(r(1)).unwrap()).is_optional_link());

        // optional never displaces optional
        assert!(!reg.link(r(1), None, r(3), None, false, false));
        assert!(reg.link(r(1), None, r(3), None, true, true));

        let one = reg.find(r(1)).unwrap();
        let two = reg.find(r(2)).unwrap();

        assert_eq!(reg.node(one).next(), reg.find(r(3)));
        assert!(!reg.node(one).is_optional_link());
        assert!(reg.node(one).is_instruction_linked());
        assert_eq!(reg.node(two).prev(), None);
        assert!(reg.check_well_formed().is_ok());
    }

    #[test]
    fn mandatory_link_upgrades_optional() {
        let mut reg = registry();

        assert!(reg.link(r(1), None, r(2), None, false, false));
        assert!(reg.link(r(2), None, r(3), None, false, false));
        assert!(reg.link(r(1), None, r(2), None, true, false));

        let one = reg.find(r(1)).unwrap();
        let two = reg.find(r(2)).unwrap();

        assert!(!reg.node(one).is_optional_link());
        assert_eq!(reg.node(two).next(), None);
    }

    #[test]
    fn unlink_clears_flags() {
        let mut reg = registry();

        assert!(reg.link(r(1), None, r(2), None, true, true));
        assert!(reg.link(r(2), None, r(3), None, true, true));

        let two = reg.find(r(2)).unwrap();

        assert!(reg.unlink_prev(two));
        assert!(!reg.unlink_prev(two));

        let one = reg.find(r(1)).unwrap();

        assert_eq!(reg.node(one).next(), None);
        assert!(!reg.node(one).is_instruction_linked());
        assert!(reg.heads().any(|h| h == two));
        assert!(reg.unlink(two));
        assert!(!reg.unlink(two));
        assert!(reg.check_well_formed().is_ok());
    }

    #[test]
    fn fixed_nodes_need_compatible_bindings() {
        let mut reg = registry();
        let a = reg.find_or_create(r(1));
        let b = reg.find_or_create(r(2));
        let c = reg.find_or_create(r(3));
        let fixed = |offset, physical| FixedBinding {
            binding: Binding::key_new(0),
            offset,
            bank: Bank::Output,
            physical,
        };

        reg.node_mut(a).fixed = Some(fixed(0, Some(0)));
        reg.node_mut(b).fixed = Some(fixed(2, Some(2)));
        reg.node_mut(c).fixed = Some(fixed(1, Some(1)));

        assert!(!reg.link(r(1), Some(a), r(2), Some(b), true, false));
        assert!(reg.link(r(1), Some(a), r(3), Some(c), true, false));
        assert!(reg.link(r(3), Some(c), r(2), Some(b), true, false));
        assert_eq!(reg.bank_of(a), Bank::Output);
    }

    #[test]
    fn make_group_links_and_aligns() {
        let mut reg = registry();

        assert!(reg.make_group(&[r(4), r(5), r(6)], Alignment::Odd, true).is_ok());
        assert_eq!(chain_regs(&reg, r(4)), [r(4), r(5), r(6)]);
        assert_eq!(reg.node(reg.find(r(5)).unwrap()).alignment(), Alignment::Even);

        // nothing to record for hardware runs
        assert!(reg
            .make_group(&[Reg::constant(0), Reg::constant(1)], Alignment::None, true)
            .is_ok());
        assert_eq!(reg.find(Reg::constant(0)), None);

        assert!(matches!(
            reg.make_group(&[r(6), r(4)], Alignment::None, true),
            Err(GroupError::Internal(_))
        ));
    }
}
