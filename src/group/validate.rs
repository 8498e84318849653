//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::group::{GroupNodeId, GroupRegistry};
use crate::ir::{Alignment, Bank, Reg};
use log::trace;
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// One position of a candidate group.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Slot {
    /// An existing operand.
    Reg(Reg),
    /// A register that hasn't been allocated yet, and so has no constraints.
    Fresh,
    /// A position that hasn't been decided yet. Any neighbour requirement
    /// on it is assumed to be met.
    Open,
}

/// Why a candidate group can't be committed. The index is the position in
/// the candidate that was being checked when the problem was found.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Conflict {
    /// The same register appears twice.
    Duplicate(usize),
    /// The operand is an immediate, which has no register number at all.
    NotGroupable(usize),
    /// Hardware-numbered operands that aren't an ascending run in one bank,
    /// or a mix of hardware-numbered and virtual operands.
    Numbering(usize),
    /// The parity the position needs disagrees with what the register has.
    Alignment(usize),
    /// The register is already required next to a different register.
    Neighbour(usize),
    /// The register is in a chain at a position that doesn't match its
    /// position in the candidate.
    Position(usize),
    /// Fixed bindings that can't be consecutive in this order.
    FixedBinding(usize),
    /// Registers pinned to different banks.
    Bank(usize),
    /// The merged chain would be longer than the bank allows.
    TooLong {
        /// How long the merged chain would be.
        len: usize,
        /// The longest allowed.
        max: usize,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::Duplicate(i) => write!(f, "operand {i} is a duplicate"),
            Conflict::NotGroupable(i) => write!(f, "operand {i} is an immediate"),
            Conflict::Numbering(i) => write!(f, "operand {i} breaks the hardware numbering"),
            Conflict::Alignment(i) => write!(f, "operand {i} has the wrong alignment"),
            Conflict::Neighbour(i) => write!(f, "operand {i} already has another neighbour"),
            Conflict::Position(i) => write!(f, "operand {i} is at a different chain position"),
            Conflict::FixedBinding(i) => write!(f, "operand {i} has an incompatible fixed binding"),
            Conflict::Bank(i) => write!(f, "operand {i} is pinned to another bank"),
            Conflict::TooLong { len, max } => {
                write!(f, "group would be {len} registers long, the maximum is {max}")
            }
        }
    }
}

/// What a successful validation found out about the candidate.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Validation {
    /// The node each position already has, if any.
    pub existing: SmallVec<[Option<GroupNodeId>; 4]>,
    /// The alignment the first register ends up with, combining the request
    /// with what the chains already require.
    pub alignment: Alignment,
    /// The bank the group lives in.
    pub bank: Bank,
}

impl GroupRegistry {
    /// Checks whether `candidates` could be made consecutive, in order, with
    /// the first one aligned as `alignment` requires.
    pub fn validate(&self, candidates: &[Reg], alignment: Alignment) -> Result<Validation, Conflict> {
        let slots: SmallVec<[Slot; 4]> = candidates.iter().map(|&r| Slot::Reg(r)).collect();

        self.validate_slots(&slots, alignment)
    }

    /// Like [`Self::validate`], but some positions may be registers that
    /// don't exist yet.
    pub fn validate_slots(&self, slots: &[Slot], alignment: Alignment) -> Result<Validation, Conflict> {
        let result = if slots.iter().any(|s| matches!(s, Slot::Reg(r) if r.hw_bank().is_some())) {
            self.validate_numbered(slots, alignment)
        } else {
            self.validate_virtual(slots, alignment)
        };

        if let Err(conflict) = result {
            trace!("candidate {slots:?} rejected: {conflict}");
        }

        result
    }

    fn validate_numbered(&self, slots: &[Slot], alignment: Alignment) -> Result<Validation, Conflict> {
        let first = match slots[0] {
            Slot::Reg(r) if r.hw_bank().is_some() => r,
            _ => return Err(Conflict::Numbering(0)),
        };

        for (i, slot) in slots.iter().enumerate() {
            let expected = first.number().checked_add(i as u32);

            match slot {
                Slot::Reg(r) if r.kind() == first.kind() && Some(r.number()) == expected => {}
                _ => return Err(Conflict::Numbering(i)),
            }
        }

        if !alignment.allows(first.number()) {
            return Err(Conflict::Alignment(0));
        }

        let bank = first.hw_bank().unwrap_or(Bank::Temp);
        let max = self.max_len(bank);

        if slots.len() > max {
            return Err(Conflict::TooLong { len: slots.len(), max });
        }

        Ok(Validation {
            existing: smallvec![None; slots.len()],
            alignment,
            bank,
        })
    }

    fn validate_virtual(&self, slots: &[Slot], alignment: Alignment) -> Result<Validation, Conflict> {
        let n = slots.len();

        for (i, slot) in slots.iter().enumerate() {
            if let Slot::Reg(r) = slot {
                if r.is_immediate() {
                    return Err(Conflict::NotGroupable(i));
                }

                if slots[..i].contains(slot) {
                    return Err(Conflict::Duplicate(i));
                }
            }
        }

        let existing: SmallVec<[Option<GroupNodeId>; 4]> = slots
            .iter()
            .map(|slot| match slot {
                Slot::Reg(r) => self.find(*r),
                Slot::Fresh | Slot::Open => None,
            })
            .collect();

        let members = || {
            existing
                .iter()
                .enumerate()
                .filter_map(|(i, id)| id.map(|id| (i, id, self.node(id))))
        };

        // every aligned member implies an alignment for position 0
        let mut base = alignment;

        for (i, _, node) in members() {
            if node.alignment().is_none() {
                continue;
            }

            let implied = node.alignment().at_offset(i);

            if base.is_none() {
                base = implied;
            } else if base != implied {
                return Err(Conflict::Alignment(i));
            }
        }

        let mut physical_base: Option<u32> = None;

        for (i, _, node) in members() {
            let Some(fixed) = node.fixed() else {
                continue;
            };

            if let Some(physical) = fixed.physical {
                let implied = physical.checked_sub(i as u32).ok_or(Conflict::FixedBinding(i))?;

                match physical_base {
                    Some(b) if b != implied => return Err(Conflict::FixedBinding(i)),
                    _ => physical_base = Some(implied),
                }
            }

            if i == 0 {
                continue;
            }

            if let Some(prev) = existing[i - 1].and_then(|id| self.node(id).fixed()) {
                if !prev.can_precede(&fixed) {
                    return Err(Conflict::FixedBinding(i));
                }
            }
        }

        let decided = |i: usize| slots[i] != Slot::Open;

        for (i, _, node) in members() {
            if let Some(prev) = node.prev() {
                if i > 0 && decided(i - 1) && !self.node(prev).is_optional_link() && existing[i - 1] != Some(prev) {
                    return Err(Conflict::Neighbour(i));
                }
            }

            if let Some(next) = node.next() {
                if i + 1 < n && decided(i + 1) && !node.is_optional_link() && existing[i + 1] != Some(next) {
                    return Err(Conflict::Neighbour(i));
                }
            }
        }

        // chains are measured without optional links, committing drops them
        let mut bank = None;
        let mut starts: SmallVec<[(GroupNodeId, isize); 4]> = SmallVec::new();
        let mut lo = 0isize;
        let mut hi = n as isize;

        for (i, id, _) in members() {
            let segment = self.segment(id, true);
            let start = i as isize - segment.position as isize;

            match starts.iter().find(|(head, _)| *head == segment.head) {
                Some(&(_, s)) if s != start => return Err(Conflict::Position(i)),
                Some(_) => {}
                None => starts.push((segment.head, start)),
            }

            match (bank, segment.fixed_bank) {
                (Some(a), Some(b)) if a != b => return Err(Conflict::Bank(i)),
                (None, Some(b)) => bank = Some(b),
                _ => {}
            }

            lo = lo.min(start);
            hi = hi.max(start + segment.len as isize);
        }

        let bank = bank.unwrap_or(Bank::Temp);
        let len = (hi - lo) as usize;
        let max = self.max_len(bank);

        if len > max {
            return Err(Conflict::TooLong { len, max });
        }

        Ok(Validation {
            existing,
            alignment: base,
            bank,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::ArenaKey;
    use crate::group::tests::registry;
    use crate::group::*;
    use crate::ir::*;

    fn r(n: u32) -> Reg {
        Reg::temp(n)
    }

    #[test]
    fn extending_a_chain() {
        // 5 -> 6 -> 7, 5 is even
        let mut reg = registry();

        assert!(reg.make_group(&[r(5), r(6), r(7)], Alignment::Even, true).is_ok());

        let valid = reg.validate(&[r(6), r(7), r(8)], Alignment::None).unwrap();

        assert_eq!(valid.existing.as_slice(), &[reg.find(r(6)), reg.find(r(7)), None]);
        assert_eq!(valid.alignment, Alignment::Odd);

        assert!(reg.make_group(&[r(6), r(7), r(8)], valid.alignment, true).is_ok());

        let seven = reg.find(r(7)).unwrap();

        assert_eq!(reg.node(seven).next(), reg.find(r(8)));
        assert_eq!(reg.node(reg.find(r(8)).unwrap()).alignment(), Alignment::Odd);
        assert!(reg.check_well_formed().is_ok());
    }

    #[test]
    fn conflicts() {
        let mut reg = registry();

        assert!(reg.make_group(&[r(1), r(2), r(3)], Alignment::Even, true).is_ok());

        // a different neighbour in the middle
        assert_eq!(
            reg.validate(&[r(1), r(9), r(3)], Alignment::None),
            Err(Conflict::Neighbour(0))
        );
        // right chain, wrong order
        assert_eq!(
            reg.validate(&[r(2), r(1)], Alignment::None),
            Err(Conflict::Neighbour(0))
        );
        assert_eq!(
            reg.validate(&[r(3), r(8), r(1)], Alignment::None),
            Err(Conflict::Position(2))
        );
        // wrong alignment
        assert_eq!(
            reg.validate(&[r(1), r(2)], Alignment::Odd),
            Err(Conflict::Alignment(0))
        );
        // too long once the prefix is counted
        assert_eq!(
            reg.validate(&[r(3), r(10), r(11)], Alignment::None),
            Err(Conflict::TooLong { len: 5, max: 4 })
        );
        assert_eq!(
            reg.validate(&[r(4), r(4)], Alignment::None),
            Err(Conflict::Duplicate(1))
        );
        assert_eq!(
            reg.validate(&[r(4), Reg::imm(0)], Alignment::None),
            Err(Conflict::NotGroupable(1))
        );
    }

    #[test]
    fn position_mismatch_without_direct_neighbours() {
        let mut reg = registry();

        assert!(reg.make_group(&[r(1), r(2), r(3)], Alignment::None, true).is_ok());

        // 3 is two after 1 in its chain, but only one after it here
        assert_eq!(
            reg.validate_slots(&[Slot::Reg(r(3)), Slot::Fresh, Slot::Reg(r(1))], Alignment::None),
            Err(Conflict::Position(2))
        );

        assert!(reg.unlink(reg.find(r(1)).unwrap()));
        assert!(reg.unlink(reg.find(r(2)).unwrap()));
        assert!(reg.make_group(&[r(1), r(2)], Alignment::None, true).is_ok());

        assert_eq!(
            reg.validate(&[r(2), r(1)], Alignment::None),
            Err(Conflict::Position(1))
        );
    }

    #[test]
    fn fresh_slots_are_unconstrained() {
        let mut reg = registry();

        assert!(reg.make_group(&[r(1), r(2)], Alignment::None, true).is_ok());

        let slots = [Slot::Reg(r(2)), Slot::Fresh, Slot::Fresh];

        assert!(reg.validate_slots(&slots, Alignment::None).is_ok());

        let too_many = [Slot::Reg(r(2)), Slot::Fresh, Slot::Fresh, Slot::Fresh];

        assert!(matches!(
            reg.validate_slots(&too_many, Alignment::None),
            Err(Conflict::TooLong { .. })
        ));

        // the fresh register can't be 1's mandatory prev
        assert_eq!(
            reg.validate_slots(&[Slot::Fresh, Slot::Reg(r(2))], Alignment::None),
            Err(Conflict::Neighbour(1))
        );
        // but an undecided one might still turn out to be 1
        assert!(reg
            .validate_slots(&[Slot::Open, Slot::Reg(r(2))], Alignment::None)
            .is_ok());
    }

    #[test]
    fn hardware_numbered_runs() {
        let reg = registry();

        assert!(reg
            .validate(&[Reg::constant(2), Reg::constant(3)], Alignment::Even)
            .is_ok());
        assert_eq!(
            reg.validate(&[Reg::constant(3), Reg::constant(4)], Alignment::Even),
            Err(Conflict::Alignment(0))
        );
        assert_eq!(
            reg.validate(&[Reg::constant(2), Reg::constant(4)], Alignment::None),
            Err(Conflict::Numbering(1))
        );
        assert_eq!(
            reg.validate(&[Reg::primary(0), Reg::output(1)], Alignment::None),
            Err(Conflict::Numbering(1))
        );
        assert_eq!(
            reg.validate(&[r(0), Reg::primary(1)], Alignment::None),
            Err(Conflict::Numbering(0))
        );
        assert!(reg.validate(&[Reg::output(5)], Alignment::Odd).is_ok());
    }

    #[test]
    fn optional_links_give_way() {
        let mut reg = registry();

        assert!(reg.link(r(1), None, r(2), None, false, false));
        assert!(reg.validate(&[r(1), r(3)], Alignment::None).is_ok());
        assert!(reg.validate(&[r(4), r(2)], Alignment::None).is_ok());
    }

    #[test]
    fn fixed_members() {
        let mut reg = registry();
        let binding = Binding::key_new(0);
        let fixed = |offset| FixedBinding {
            binding,
            offset,
            bank: Bank::Output,
            physical: Some(4 + offset),
        };

        for n in 0..2 {
            let id = reg.find_or_create(r(n));

            reg.node_mut(id).fixed = Some(fixed(n));
        }

        assert_eq!(
            reg.validate(&[r(1), r(0)], Alignment::None),
            Err(Conflict::FixedBinding(1))
        );

        let valid = reg.validate(&[r(0), r(1)], Alignment::None).unwrap();

        assert_eq!(valid.bank, Bank::Output);
        assert_eq!(
            reg.validate(&[r(0), r(7), r(1)], Alignment::None),
            Err(Conflict::FixedBinding(2))
        );
    }
}
