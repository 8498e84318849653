//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::Reg;
use smallvec::SmallVec;
use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// The operation an instruction performs.
///
/// Which operand runs have to sit in consecutive hardware registers is not
/// a property of the opcode, it is answered by the target. See
/// [`crate::isa::ShaderTarget::consecutive_groups`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Opcode {
    /// `dests[0] = sources[0]`
    Mov,
    /// `dests[i] = sources[i]` for every `i`, writing a run of registers at once.
    Pack,
    /// A wide copy, `dests[i] = sources[i]` where both sides are register runs.
    VMov,
    /// `dests[0] = sources[0] + sources[1]`
    FAdd,
    /// `dests[0] = sources[0] * sources[1]`
    FMul,
    /// Dot product of the two halves of `sources`, each read through a swizzle.
    Dp,
    /// Texture sample. `sources` are coordinates read through a swizzle,
    /// `dests[i]` receives channel `first_channel + i`.
    Smp,
    /// A descheduling point. Register contents are not preserved across it
    /// except for what the hardware saves, so cached copies die here.
    Wdf,
    /// Does nothing.
    Nop,
}

impl Opcode {
    /// The mnemonic used when printing.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Pack => "pack",
            Opcode::VMov => "vmov",
            Opcode::FAdd => "fadd",
            Opcode::FMul => "fmul",
            Opcode::Dp => "dp",
            Opcode::Smp => "smp",
            Opcode::Wdf => "wdf",
            Opcode::Nop => "nop",
        }
    }
}

/// Selects which operand of a register run each logical lane reads.
///
/// Lane `c` of the logical vector reads operand `lanes[c]` of the run.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Swizzle {
    lanes: [u8; 4],
    len: u8,
}

impl Swizzle {
    /// The swizzle that reads operand `c` for lane `c`.
    pub fn identity(len: usize) -> Self {
        debug_assert!(len <= 4, "swizzles cover at most four lanes");

        let mut lanes = [0; 4];

        for (c, lane) in lanes.iter_mut().enumerate().take(len) {
            *lane = c as u8;
        }

        Self {
            lanes,
            len: len as u8,
        }
    }

    /// Builds a swizzle from explicit lane selections.
    pub fn from_lanes(selection: &[u8]) -> Self {
        debug_assert!(selection.len() <= 4, "swizzles cover at most four lanes");

        let mut lanes = [0; 4];
        lanes[..selection.len()].copy_from_slice(selection);

        Self {
            lanes,
            len: selection.len() as u8,
        }
    }

    /// The operand index each lane reads.
    #[inline]
    pub fn lanes(&self) -> &[u8] {
        &self.lanes[..self.len as usize]
    }

    /// Checks if this reads operand `c` for every lane `c`.
    pub fn is_identity(&self) -> bool {
        self.lanes().iter().enumerate().all(|(c, &l)| c == l as usize)
    }

    /// Adjusts the swizzle for a permuted operand run.
    ///
    /// `order[p]` is the old index of the operand that now lives at position
    /// `p`. The result reads the same values as `self` did before the
    /// operands were moved.
    pub fn permuted(&self, order: &[usize]) -> Self {
        let mut lanes = self.lanes;

        for lane in lanes.iter_mut().take(self.len as usize) {
            let old = *lane as usize;

            // every old index appears exactly once in a permutation
            if let Some(p) = order.iter().position(|&o| o == old) {
                *lane = p as u8;
            }
        }

        Self {
            lanes,
            len: self.len,
        }
    }
}

impl fmt::Display for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [char; 4] = ['x', 'y', 'z', 'w'];

        for &lane in self.lanes() {
            write!(f, "{}", NAMES[lane as usize])?;
        }

        Ok(())
    }
}

/// A single instruction: an opcode and its operand lists.
///
/// Destinations and sources are stored separately so that a register run
/// on one side can be rewritten without shifting the other.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct InstData {
    /// The operation.
    pub opcode: Opcode,
    /// Registers written.
    pub dests: SmallVec<[Reg; 4]>,
    /// Registers and immediates read.
    pub sources: SmallVec<[Reg; 8]>,
    /// Swizzles for source runs that are read through one.
    pub swizzles: SmallVec<[Swizzle; 2]>,
    /// For [`Opcode::Smp`], which channels are actually consumed later.
    pub write_mask: u8,
    /// For [`Opcode::Smp`], the channel written to `dests[0]`.
    pub first_channel: u8,
}

impl InstData {
    fn with(opcode: Opcode, dests: &[Reg], sources: &[Reg]) -> Self {
        Self {
            opcode,
            dests: SmallVec::from_slice(dests),
            sources: SmallVec::from_slice(sources),
            swizzles: SmallVec::new(),
            write_mask: 0,
            first_channel: 0,
        }
    }

    /// `dest = source`
    pub fn mov(dest: Reg, source: Reg) -> Self {
        Self::with(Opcode::Mov, &[dest], &[source])
    }

    /// Writes `sources[i]` into `dests[i]` with a single instruction.
    pub fn pack(dests: &[Reg], sources: &[Reg]) -> Self {
        debug_assert_eq!(dests.len(), sources.len());

        Self::with(Opcode::Pack, dests, sources)
    }

    /// A wide register-run copy.
    pub fn vmov(dests: &[Reg], sources: &[Reg]) -> Self {
        debug_assert_eq!(dests.len(), sources.len());

        Self::with(Opcode::VMov, dests, sources)
    }

    /// `dest = lhs + rhs`
    pub fn fadd(dest: Reg, lhs: Reg, rhs: Reg) -> Self {
        Self::with(Opcode::FAdd, &[dest], &[lhs, rhs])
    }

    /// `dest = lhs * rhs`
    pub fn fmul(dest: Reg, lhs: Reg, rhs: Reg) -> Self {
        Self::with(Opcode::FMul, &[dest], &[lhs, rhs])
    }

    /// `dest = dot(lhs, rhs)` with identity swizzles on both vectors.
    pub fn dp(dest: Reg, lhs: &[Reg], rhs: &[Reg]) -> Self {
        debug_assert_eq!(lhs.len(), rhs.len());

        let mut data = Self::with(Opcode::Dp, &[dest], lhs);

        data.sources.extend_from_slice(rhs);
        data.swizzles.push(Swizzle::identity(lhs.len()));
        data.swizzles.push(Swizzle::identity(rhs.len()));

        data
    }

    /// Samples a texture at `coords`, writing every channel into `dests`.
    pub fn smp(dests: &[Reg], coords: &[Reg]) -> Self {
        let mut data = Self::with(Opcode::Smp, dests, coords);

        data.swizzles.push(Swizzle::identity(coords.len()));
        data.write_mask = ((1u32 << dests.len()) - 1) as u8;

        data
    }

    /// A descheduling point.
    pub fn wdf() -> Self {
        Self::with(Opcode::Wdf, &[], &[])
    }

    /// Replaces the write mask, for sampling instructions whose results are
    /// only partially consumed.
    pub fn with_write_mask(mut self, mask: u8) -> Self {
        self.write_mask = mask;
        self
    }

    /// Registers written by this instruction.
    #[inline]
    pub fn defs(&self) -> &[Reg] {
        &self.dests
    }

    /// Operands read by this instruction.
    #[inline]
    pub fn uses(&self) -> &[Reg] {
        &self.sources
    }

    /// If this is a plain `dest = source` move, gives `(dest, source)`.
    pub fn as_copy(&self) -> Option<(Reg, Reg)> {
        match (self.opcode, self.dests.as_slice(), self.sources.as_slice()) {
            (Opcode::Mov, &[dest], &[source]) => Some((dest, source)),
            _ => None,
        }
    }

    /// Replaces every occurrence of `from` with `to`, in either operand list.
    pub fn rename(&mut self, from: Reg, to: Reg) {
        for reg in self.dests.iter_mut().chain(self.sources.iter_mut()) {
            if *reg == from {
                *reg = to;
            }
        }
    }
}

impl fmt::Display for InstData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;

        for (i, reg) in self.dests.iter().enumerate() {
            write!(f, "{}{reg}", if i == 0 { " " } else { ", " })?;
        }

        if !self.dests.is_empty() && !self.sources.is_empty() {
            write!(f, " <-")?;
        }

        for (i, reg) in self.sources.iter().enumerate() {
            write!(f, "{}{reg}", if i == 0 { " " } else { ", " })?;
        }

        for swizzle in self.swizzles.iter().filter(|s| !s.is_identity()) {
            write!(f, " .{swizzle}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permuted_swizzle_reads_same_operands() {
        let before = [Reg::temp(2), Reg::temp(1), Reg::temp(3)];
        let swizzle = Swizzle::identity(3);

        // move old operand 1 to the front and old operand 0 to the middle
        let order = [1, 0, 2];
        let after: Vec<Reg> = order.iter().map(|&o| before[o]).collect();
        let permuted = swizzle.permuted(&order);

        for (c, &lane) in swizzle.lanes().iter().enumerate() {
            assert_eq!(before[lane as usize], after[permuted.lanes()[c] as usize]);
        }

        assert_eq!(permuted.lanes(), &[1, 0, 2]);
        assert_eq!(permuted.to_string(), "yxz");
    }

    #[test]
    fn constructors() {
        let dp = InstData::dp(Reg::temp(0), &[Reg::temp(1), Reg::temp(2)], &[Reg::temp(3), Reg::temp(4)]);

        assert_eq!(dp.uses().len(), 4);
        assert_eq!(dp.swizzles.len(), 2);

        let smp = InstData::smp(&[Reg::temp(5), Reg::temp(6), Reg::temp(7), Reg::temp(8)], &[Reg::temp(1)]);

        assert_eq!(smp.write_mask, 0b1111);
        assert_eq!(smp.with_write_mask(0b0010).write_mask, 0b0010);
    }

    #[test]
    fn rename_touches_both_sides() {
        let mut add = InstData::fadd(Reg::temp(1), Reg::temp(1), Reg::temp(2));

        add.rename(Reg::temp(1), Reg::temp(9));

        assert_eq!(add.to_string(), "fadd r9 <- r9, r2");
    }

    #[test]
    fn only_moves_are_copies() {
        let mov = InstData::mov(Reg::temp(1), Reg::temp(2));
        let pack = InstData::pack(&[Reg::temp(1), Reg::temp(2)], &[Reg::temp(3), Reg::temp(4)]);

        assert_eq!(mov.as_copy(), Some((Reg::temp(1), Reg::temp(2))));
        assert_eq!(pack.as_copy(), None);
        assert_eq!(InstData::fadd(Reg::temp(1), Reg::temp(2), Reg::temp(3)).as_copy(), None);
    }
}
