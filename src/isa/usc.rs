//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Alignment, Bank, InstData, Opcode};
use crate::isa::*;
use smallvec::SmallVec;

/// A unified shader core target.
///
/// Sampling instructions write their results into an even-aligned run and
/// read coordinates through a swizzle, dot products read both vectors
/// through swizzles, and wide moves need both sides consecutive. Wide moves
/// and packs can always be split into scalar moves, and samples can drop
/// channels nobody reads.
#[derive(Clone, Debug)]
pub struct UscTarget {
    max_group: [usize; 4],
    constants: Vec<u32>,
    pack_width: usize,
}

impl UscTarget {
    /// The contents of the hardware constant bank unless configured otherwise.
    pub const DEFAULT_CONSTANTS: [u32; 8] = [
        0x0000_0000, // 0.0
        0x3f80_0000, // 1.0
        0x0000_0000,
        0x0000_0000,
        0x3f80_0000,
        0x3f80_0000,
        0x4000_0000, // 2.0
        0xbf80_0000, // -1.0
    ];

    /// Creates the target with default limits.
    pub fn new() -> Self {
        Self {
            max_group: [4, 8, 4, 8],
            constants: Self::DEFAULT_CONSTANTS.to_vec(),
            pack_width: 4,
        }
    }

    /// Changes the longest run allowed in `bank`.
    pub fn with_max_group_len(mut self, bank: Bank, len: usize) -> Self {
        self.max_group[bank as usize] = len;
        self
    }

    /// Replaces the contents of the constant bank.
    pub fn with_constants(mut self, constants: &[u32]) -> Self {
        self.constants = constants.to_vec();
        self
    }

    /// Changes how many registers a single pack can write. Anything below
    /// two disables packing.
    pub fn with_pack_width(mut self, width: usize) -> Self {
        self.pack_width = width;
        self
    }

    fn split_into_moves(inst: &InstData) -> Option<Relaxation> {
        // splitting is only sound if no move clobbers a source a later move reads
        let clobbers = inst
            .dests
            .iter()
            .enumerate()
            .any(|(i, d)| inst.sources.get(i + 1..).map_or(false, |rest| rest.contains(d)));

        if clobbers {
            return None;
        }

        let moves = inst
            .dests
            .iter()
            .zip(inst.sources.iter())
            .map(|(&d, &s)| InstData::mov(d, s))
            .collect();

        Some(Relaxation::Expand(moves))
    }

    fn narrow_sample(inst: &InstData) -> Option<Relaxation> {
        let first = inst.first_channel as usize;
        let used = |i: &usize| inst.write_mask & (1 << (first + *i)) != 0;
        let lo = (0..inst.dests.len()).find(used)?;
        let hi = (0..inst.dests.len()).rev().find(used)?;

        if hi - lo + 1 == inst.dests.len() {
            return None;
        }

        let mut narrowed = inst.clone();

        narrowed.dests = SmallVec::from_slice(&inst.dests[lo..=hi]);
        narrowed.first_channel = (first + lo) as u8;

        Some(Relaxation::Narrow(narrowed))
    }
}

impl Default for UscTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl LegalityOracle for UscTarget {
    fn can_use_operand_bank(
        &self,
        inst: &InstData,
        side: OperandSide,
        _: usize,
        bank: Bank,
        mode: IndexMode,
    ) -> bool {
        match side {
            OperandSide::Dest => matches!(bank, Bank::Temp | Bank::Output),
            OperandSide::Source => match bank {
                Bank::Temp | Bank::Primary => true,
                Bank::Output => false,
                Bank::Constant => !(inst.opcode == Opcode::Smp && mode == IndexMode::Dynamic),
            },
        }
    }

    fn is_encoding_supported(&self, inst: &InstData, group: &ConsecutiveGroup, order: &[usize]) -> bool {
        let is_permutation = order.len() == group.count
            && (0..group.count).all(|i| order.contains(&i));

        let swizzled = match group.swizzle {
            Some(slot) => slot < inst.swizzles.len(),
            None => false,
        };

        group.side == OperandSide::Source && is_permutation && swizzled
    }

    fn relax(&self, inst: &InstData, group: &ConsecutiveGroup) -> Option<Relaxation> {
        match (inst.opcode, group.side) {
            (Opcode::VMov | Opcode::Pack, _) => Self::split_into_moves(inst),
            (Opcode::Smp, OperandSide::Dest) => Self::narrow_sample(inst),
            _ => None,
        }
    }

    fn constant_value(&self, number: u32) -> Option<u32> {
        self.constants.get(number as usize).copied()
    }

    fn constant_run(&self, values: &[u32], alignment: Alignment) -> Option<u32> {
        if values.is_empty() {
            return None;
        }

        (0..self.constants.len())
            .filter(|&start| alignment.allows(start as u32))
            .find(|&start| self.constants[start..].starts_with(values))
            .map(|start| start as u32)
    }

    fn max_pack_width(&self) -> usize {
        self.pack_width
    }
}

impl ShaderTarget for UscTarget {
    fn consecutive_groups(&self, inst: &InstData) -> SmallVec<[ConsecutiveGroup; 2]> {
        let mut groups = SmallVec::new();
        let dests = inst.dests.len();
        let sources = inst.sources.len();

        match inst.opcode {
            Opcode::Pack if dests >= 2 => {
                groups.push(ConsecutiveGroup::dests(0, dests, Alignment::None));
            }
            Opcode::VMov if dests >= 2 => {
                groups.push(ConsecutiveGroup::dests(0, dests, Alignment::None));
                groups.push(ConsecutiveGroup::sources(0, sources, None));
            }
            Opcode::Dp if sources >= 4 => {
                let half = sources / 2;

                groups.push(ConsecutiveGroup::sources(0, half, Some(0)));
                groups.push(ConsecutiveGroup::sources(half, half, Some(1)));
            }
            Opcode::Smp => {
                if dests > 0 {
                    groups.push(ConsecutiveGroup::dests(0, dests, Alignment::Even));
                }

                if sources >= 2 {
                    groups.push(ConsecutiveGroup::sources(0, sources, Some(0)));
                }
            }
            _ => {}
        }

        groups
    }

    fn max_group_len(&self, bank: Bank) -> usize {
        self.max_group[bank as usize]
    }

    fn is_deschedule_point(&self, inst: &InstData) -> bool {
        inst.opcode == Opcode::Wdf
    }
}
