//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena_key;
use crate::group::CopyRecordId;
use crate::ir::{Alignment, Bank, Binding, Reg};

arena_key! {
    /// Refers to a [`GroupNode`] inside of a [`GroupRegistry`](crate::group::GroupRegistry).
    pub struct GroupNodeId;
}

/// Where a fixed-bound register has to live.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FixedBinding {
    /// The descriptor that pins the register.
    pub binding: Binding,
    /// Which member of the descriptor the register is.
    pub offset: u32,
    /// The bank the descriptor is in.
    pub bank: Bank,
    /// The exact hardware number, if the descriptor has one.
    pub physical: Option<u32>,
}

impl FixedBinding {
    /// Whether a register bound by `next` can take the number directly after
    /// a register bound by `self`.
    ///
    /// Two exact numbers have to be consecutive in the same bank. Two
    /// bank-only bindings have to be consecutive members of the same
    /// descriptor. Anything else can't be proven adjacent.
    pub fn can_precede(&self, next: &FixedBinding) -> bool {
        match (self.physical, next.physical) {
            (Some(a), Some(b)) => self.bank == next.bank && a.checked_add(1) == Some(b),
            (None, None) => self.binding == next.binding && self.offset + 1 == next.offset,
            _ => false,
        }
    }
}

/// Extra data a node can carry.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum NodePayload {
    /// Nothing.
    #[default]
    Empty,
    /// The register is the destination of a copy the current block's
    /// equivalence cache knows about.
    Copy(CopyRecordId),
    /// The register is an element of a runtime-indexed array.
    ArrayMember(Binding),
}

/// One virtual register that has taken part in a grouping constraint.
///
/// `prev` needs the hardware number directly below this one and `next`
/// the one directly above.
#[derive(Clone, Debug)]
pub struct GroupNode {
    pub(crate) reg: Reg,
    pub(crate) prev: Option<GroupNodeId>,
    pub(crate) next: Option<GroupNodeId>,
    pub(crate) alignment: Alignment,
    pub(crate) alignment_mandatory: bool,
    pub(crate) fixed: Option<FixedBinding>,
    // these two describe the link to `next`
    pub(crate) optional_link: bool,
    pub(crate) instruction_linked: bool,
    pub(crate) payload: NodePayload,
}

impl GroupNode {
    pub(crate) fn new(reg: Reg) -> Self {
        Self {
            reg,
            prev: None,
            next: None,
            alignment: Alignment::None,
            alignment_mandatory: false,
            fixed: None,
            optional_link: false,
            instruction_linked: false,
            payload: NodePayload::Empty,
        }
    }

    /// The register this node stands for.
    #[inline]
    pub fn reg(&self) -> Reg {
        self.reg
    }

    /// The node that needs the number directly below.
    #[inline]
    pub fn prev(&self) -> Option<GroupNodeId> {
        self.prev
    }

    /// The node that needs the number directly above.
    #[inline]
    pub fn next(&self) -> Option<GroupNodeId> {
        self.next
    }

    /// The parity this register's number needs.
    #[inline]
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Whether the alignment is required by an instruction or binding, as
    /// opposed to derived from a known hardware number.
    #[inline]
    pub fn is_alignment_mandatory(&self) -> bool {
        self.alignment_mandatory
    }

    /// The fixed binding, if the register is pinned.
    #[inline]
    pub fn fixed(&self) -> Option<FixedBinding> {
        self.fixed
    }

    /// Whether the link to `next` is only a preference.
    #[inline]
    pub fn is_optional_link(&self) -> bool {
        self.optional_link
    }

    /// Whether the link to `next` exists because both registers appear in
    /// one instruction's operand run.
    #[inline]
    pub fn is_instruction_linked(&self) -> bool {
        self.instruction_linked
    }

    /// The payload.
    #[inline]
    pub fn payload(&self) -> NodePayload {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaKey;

    fn binding(offset: u32, bank: Bank, physical: Option<u32>) -> FixedBinding {
        FixedBinding {
            binding: Binding::key_new(0),
            offset,
            bank,
            physical,
        }
    }

    #[test]
    fn fixed_adjacency() {
        let a = binding(0, Bank::Output, Some(4));
        let b = binding(1, Bank::Output, Some(5));

        assert!(a.can_precede(&b));
        assert!(!b.can_precede(&a));

        let in_other_bank = FixedBinding { bank: Bank::Primary, ..b };

        assert!(!a.can_precede(&in_other_bank));

        let c = binding(0, Bank::Temp, None);
        let d = binding(1, Bank::Temp, None);
        let elsewhere = FixedBinding {
            binding: Binding::key_new(1),
            ..d
        };

        assert!(c.can_precede(&d));
        assert!(!c.can_precede(&elsewhere));
        assert!(!a.can_precede(&d));
    }
}
