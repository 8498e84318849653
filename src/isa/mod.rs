//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Target descriptions.
//!
//! The grouping pass never hard-codes anything about instruction encodings.
//! Everything it needs to know is asked through [`ShaderTarget`], which is
//! split into the structural questions (which operand runs must be
//! consecutive, how long they may be) and the [`LegalityOracle`] questions
//! (can this operand come from that bank, can this run be reordered).

mod usc;

pub use usc::*;

use crate::ir::{Alignment, Bank, InstData, Reg};
use smallvec::SmallVec;

/// Which operand list a [`ConsecutiveGroup`] lives in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum OperandSide {
    /// The group is a run of destinations.
    Dest,
    /// The group is a run of sources.
    Source,
}

/// How an operand is addressed inside its bank.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum IndexMode {
    /// The register number is encoded directly.
    Direct,
    /// The register number is offset by a runtime index.
    Dynamic,
}

/// A run of operands of one instruction that must be assigned consecutive
/// hardware registers, in operand order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConsecutiveGroup {
    /// The operand list the run is in.
    pub side: OperandSide,
    /// Index of the first operand of the run in that list.
    pub start: usize,
    /// How many operands are in the run.
    pub count: usize,
    /// What parity the first register needs.
    pub alignment: Alignment,
    /// If the run is read through a swizzle, the index of that swizzle in
    /// [`InstData::swizzles`].
    pub swizzle: Option<usize>,
}

impl ConsecutiveGroup {
    /// A destination run.
    pub fn dests(start: usize, count: usize, alignment: Alignment) -> Self {
        Self {
            side: OperandSide::Dest,
            start,
            count,
            alignment,
            swizzle: None,
        }
    }

    /// A source run, optionally read through the swizzle at `swizzle`.
    pub fn sources(start: usize, count: usize, swizzle: Option<usize>) -> Self {
        Self {
            side: OperandSide::Source,
            start,
            count,
            alignment: Alignment::None,
            swizzle,
        }
    }

    /// Replaces the alignment requirement.
    pub fn aligned(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// The operands of `inst` that form this run.
    pub fn operands<'a>(&self, inst: &'a InstData) -> &'a [Reg] {
        let range = self.start..self.start + self.count;

        match self.side {
            OperandSide::Dest => &inst.dests[range],
            OperandSide::Source => &inst.sources[range],
        }
    }

    /// Mutable version of [`Self::operands`].
    pub fn operands_mut<'a>(&self, inst: &'a mut InstData) -> &'a mut [Reg] {
        let range = self.start..self.start + self.count;

        match self.side {
            OperandSide::Dest => &mut inst.dests[range],
            OperandSide::Source => &mut inst.sources[range],
        }
    }
}

/// A cheaper way to encode an instruction whose grouping constraint can't
/// be met as-is.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Relaxation {
    /// A variant of the same instruction with a smaller run.
    Narrow(InstData),
    /// A sequence of instructions that does the same thing without needing
    /// the run at all.
    Expand(SmallVec<[InstData; 4]>),
}

impl Relaxation {
    /// How many instructions the relaxation adds to the block.
    pub fn added_instructions(&self) -> usize {
        match self {
            Relaxation::Narrow(_) => 0,
            Relaxation::Expand(seq) => seq.len().saturating_sub(1),
        }
    }
}

/// Answers questions about what an encoding can and can't do.
pub trait LegalityOracle {
    /// Whether operand `slot` on `side` of `inst` could name a register in
    /// `bank` with the given addressing.
    fn can_use_operand_bank(
        &self,
        inst: &InstData,
        side: OperandSide,
        slot: usize,
        bank: Bank,
        mode: IndexMode,
    ) -> bool;

    /// Whether `inst` can still be encoded if the operands of `group` are
    /// permuted so that position `p` holds the old operand `order[p]`.
    fn is_encoding_supported(&self, inst: &InstData, group: &ConsecutiveGroup, order: &[usize]) -> bool;

    /// Permutes the operands of `group` by `order` and adjusts whatever else
    /// the encoding needs so `inst` computes the same result. Returns `false`
    /// (leaving `inst` untouched) if that isn't possible.
    fn reorder_group(&self, inst: &mut InstData, group: &ConsecutiveGroup, order: &[usize]) -> bool {
        if order.len() != group.count || !self.is_encoding_supported(inst, group, order) {
            return false;
        }

        let Some(slot) = group.swizzle else {
            return false;
        };

        let old: SmallVec<[Reg; 4]> = SmallVec::from_slice(group.operands(inst));

        for (operand, &from) in group.operands_mut(inst).iter_mut().zip(order) {
            *operand = old[from];
        }

        inst.swizzles[slot] = inst.swizzles[slot].permuted(order);

        true
    }

    /// A cheaper encoding of `inst` that avoids the constraint of `group`.
    fn relax(&self, inst: &InstData, group: &ConsecutiveGroup) -> Option<Relaxation>;

    /// The value of a hardware constant register, if it has one.
    fn constant_value(&self, number: u32) -> Option<u32>;

    /// Finds a run of hardware constant registers holding `values` in order,
    /// whose first register satisfies `alignment`. Returns the number of
    /// the first register.
    fn constant_run(&self, values: &[u32], alignment: Alignment) -> Option<u32>;

    /// The widest copy a single instruction can perform.
    fn max_pack_width(&self) -> usize;
}

/// Everything the grouping pass needs to know about a target.
pub trait ShaderTarget: LegalityOracle {
    /// The operand runs of `inst` that have to be consecutive.
    fn consecutive_groups(&self, inst: &InstData) -> SmallVec<[ConsecutiveGroup; 2]>;

    /// The longest run of consecutive registers the target supports in `bank`.
    fn max_group_len(&self, bank: Bank) -> usize;

    /// Whether `inst` is a point where the shader may be descheduled.
    fn is_deschedule_point(&self, inst: &InstData) -> bool;
}
