//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Alignment, Bank, Reg};
use smallvec::SmallVec;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// What a fixed register descriptor is pinning down.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum BindingKind {
    /// Shader inputs. The hardware writes these before the shader starts.
    Input,
    /// Shader outputs. The hardware reads these after the shader ends.
    Output,
    /// A register array that is indexed at runtime and so must be contiguous.
    Array,
}

/// Describes a set of virtual registers that have to live at a fixed place.
///
/// The registers in [`FixedRegister::regs`] are consecutive in that order.
/// The descriptor either names an exact hardware number for the first one,
/// or only the bank.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FixedRegister {
    /// Why the registers are pinned.
    pub kind: BindingKind,
    /// The bank they have to be allocated in.
    pub bank: Bank,
    /// The hardware number of `regs[0]`, if it is known.
    pub physical: Option<u32>,
    /// An extra alignment for `regs[0]`, on top of what `physical` implies.
    pub alignment: Alignment,
    /// When set, adjacency is only a preference and may be broken in favour
    /// of an instruction's requirement.
    pub advisory: bool,
    /// The member registers, in hardware order.
    pub regs: SmallVec<[Reg; 4]>,
}

impl FixedRegister {
    fn with(kind: BindingKind, bank: Bank, physical: Option<u32>, regs: &[Reg]) -> Self {
        Self {
            kind,
            bank,
            physical,
            alignment: Alignment::None,
            advisory: false,
            regs: SmallVec::from_slice(regs),
        }
    }

    /// Shader inputs landing at `physical` in `bank`, or anywhere in the bank.
    pub fn input(bank: Bank, physical: Option<u32>, regs: &[Reg]) -> Self {
        Self::with(BindingKind::Input, bank, physical, regs)
    }

    /// Shader outputs that have to end up at `physical` in `bank`.
    pub fn output(bank: Bank, physical: Option<u32>, regs: &[Reg]) -> Self {
        Self::with(BindingKind::Output, bank, physical, regs)
    }

    /// A runtime-indexed array of temporaries.
    pub fn array(regs: &[Reg]) -> Self {
        Self::with(BindingKind::Array, Bank::Temp, None, regs)
    }

    /// Adds an alignment requirement for the first register.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Turns the adjacency between members into a preference.
    pub fn advisory(mut self) -> Self {
        self.advisory = true;
        self
    }

    /// The hardware number of the member at `offset`, if known.
    #[inline]
    pub fn physical_at(&self, offset: usize) -> Option<u32> {
        self.physical.map(|base| base + offset as u32)
    }

    /// Which member `reg` is, if any.
    pub fn offset_of(&self, reg: Reg) -> Option<usize> {
        self.regs.iter().position(|&r| r == reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_lookup() {
        let fixed = FixedRegister::output(Bank::Output, Some(4), &[Reg::temp(1), Reg::temp(2)]);

        assert_eq!(fixed.physical_at(1), Some(5));
        assert_eq!(fixed.offset_of(Reg::temp(2)), Some(1));
        assert_eq!(fixed.offset_of(Reg::temp(3)), None);
        assert_eq!(FixedRegister::array(&[Reg::temp(1)]).physical_at(0), None);
    }
}
