//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// The different kinds of operands an instruction can name.
///
/// Only [`RegKind::Temp`] registers are virtual. Everything else either already
/// has a hardware number (primary attributes, outputs, the constant bank) or
/// is not a register at all (immediates).
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum RegKind {
    /// A virtual temporary, numbered freely by the front-end.
    Temp,
    /// A hardware primary-attribute register, where shader inputs land.
    Primary,
    /// A hardware output register.
    Output,
    /// A read-only hardware constant register with a value known at compile time.
    Constant,
    /// An immediate value, the number is the raw 32-bit pattern.
    Immediate,
}

/// A physical register bank, i.e. the register file a run of consecutive
/// registers is allocated in.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Bank {
    /// The general temporary register file.
    Temp = 0,
    /// Primary attributes (shader inputs).
    Primary = 1,
    /// Shader outputs.
    Output = 2,
    /// The hardware constant bank.
    Constant = 3,
}

impl Bank {
    /// Every bank, in the order of their discriminants.
    pub const ALL: [Bank; 4] = [Bank::Temp, Bank::Primary, Bank::Output, Bank::Constant];
}

/// An operand: a register kind plus a number within that kind.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Reg {
    kind: RegKind,
    number: u32,
}

impl Reg {
    /// Creates an operand of an arbitrary kind.
    #[inline]
    pub const fn new(kind: RegKind, number: u32) -> Self {
        Self { kind, number }
    }

    /// A virtual temporary.
    #[inline]
    pub const fn temp(number: u32) -> Self {
        Self::new(RegKind::Temp, number)
    }

    /// A primary-attribute register.
    #[inline]
    pub const fn primary(number: u32) -> Self {
        Self::new(RegKind::Primary, number)
    }

    /// An output register.
    #[inline]
    pub const fn output(number: u32) -> Self {
        Self::new(RegKind::Output, number)
    }

    /// A hardware constant register.
    #[inline]
    pub const fn constant(number: u32) -> Self {
        Self::new(RegKind::Constant, number)
    }

    /// An immediate with a raw bit pattern.
    #[inline]
    pub const fn imm(bits: u32) -> Self {
        Self::new(RegKind::Immediate, bits)
    }

    /// An immediate holding an `f32`.
    #[inline]
    pub fn imm_f32(value: f32) -> Self {
        Self::imm(value.to_bits())
    }

    /// The kind of operand this is.
    #[inline]
    pub const fn kind(self) -> RegKind {
        self.kind
    }

    /// The number within [`Self::kind`].
    #[inline]
    pub const fn number(self) -> u32 {
        self.number
    }

    /// Whether this is a virtual register, i.e. one that can take part in a
    /// group chain.
    #[inline]
    pub const fn is_virtual(self) -> bool {
        matches!(self.kind, RegKind::Temp)
    }

    /// Whether this is an immediate rather than a register.
    #[inline]
    pub const fn is_immediate(self) -> bool {
        matches!(self.kind, RegKind::Immediate)
    }

    /// If the operand already has a hardware number, the bank that number is in.
    #[inline]
    pub const fn hw_bank(self) -> Option<Bank> {
        match self.kind {
            RegKind::Primary => Some(Bank::Primary),
            RegKind::Output => Some(Bank::Output),
            RegKind::Constant => Some(Bank::Constant),
            RegKind::Temp | RegKind::Immediate => None,
        }
    }

    /// Whether the value is the same in every invocation of the shader, and
    /// therefore safe to materialise once in a preamble.
    #[inline]
    pub const fn is_compile_time_constant(self) -> bool {
        matches!(self.kind, RegKind::Constant | RegKind::Immediate)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegKind::Temp => write!(f, "r{}", self.number),
            RegKind::Primary => write!(f, "pa{}", self.number),
            RegKind::Output => write!(f, "o{}", self.number),
            RegKind::Constant => write!(f, "c{}", self.number),
            RegKind::Immediate => write!(f, "#{:#x}", self.number),
        }
    }
}

/// The parity a hardware register number has to have.
///
/// For a run of consecutive registers this is the parity of the *first*
/// register, and every following register alternates.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Alignment {
    /// No requirement.
    #[default]
    None,
    /// The register number must be even.
    Even,
    /// The register number must be odd.
    Odd,
}

impl Alignment {
    /// The alignment of a known hardware number.
    #[inline]
    pub const fn of_number(number: u32) -> Self {
        if number % 2 == 0 {
            Alignment::Even
        } else {
            Alignment::Odd
        }
    }

    /// The alignment the next register in a run needs.
    #[inline]
    pub const fn complement(self) -> Self {
        match self {
            Alignment::None => Alignment::None,
            Alignment::Even => Alignment::Odd,
            Alignment::Odd => Alignment::Even,
        }
    }

    /// The alignment of the register `offset` places after a register with
    /// alignment `self`. Because parity alternates, this is its own inverse.
    #[inline]
    pub const fn at_offset(self, offset: usize) -> Self {
        if offset % 2 == 0 {
            self
        } else {
            self.complement()
        }
    }

    /// Whether `self` is [`Alignment::None`].
    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, Alignment::None)
    }

    /// Whether a hardware number satisfies this alignment.
    #[inline]
    pub const fn allows(self, number: u32) -> bool {
        match self {
            Alignment::None => true,
            Alignment::Even => number % 2 == 0,
            Alignment::Odd => number % 2 == 1,
        }
    }

    /// Whether two requirements can hold at the same time.
    #[inline]
    pub fn compatible(self, other: Alignment) -> bool {
        self.is_none() || other.is_none() || self == other
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alignment::None => write!(f, "any"),
            Alignment::Even => write!(f, "even"),
            Alignment::Odd => write!(f, "odd"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(Reg, u64);

    #[test]
    fn alignment_alternates() {
        assert_eq!(Alignment::Even.at_offset(0), Alignment::Even);
        assert_eq!(Alignment::Even.at_offset(1), Alignment::Odd);
        assert_eq!(Alignment::Odd.at_offset(3), Alignment::Even);
        assert_eq!(Alignment::None.at_offset(1), Alignment::None);

        for offset in 0..8 {
            let a = Alignment::Odd.at_offset(offset);

            assert_eq!(a.at_offset(offset), Alignment::Odd);
        }
    }

    #[test]
    fn alignment_allows() {
        assert!(Alignment::of_number(6).allows(6));
        assert!(Alignment::of_number(7).allows(7));
        assert!(!Alignment::Even.allows(3));
        assert!(Alignment::None.allows(3));
        assert!(Alignment::Even.compatible(Alignment::None));
        assert!(!Alignment::Even.compatible(Alignment::Odd));
    }

    #[test]
    fn register_kinds() {
        assert!(Reg::temp(3).is_virtual());
        assert!(!Reg::primary(3).is_virtual());
        assert_eq!(Reg::output(1).hw_bank(), Some(Bank::Output));
        assert_eq!(Reg::temp(1).hw_bank(), None);
        assert!(Reg::imm_f32(1.0).is_compile_time_constant());
        assert_eq!(Reg::imm_f32(1.0).number(), 0x3f80_0000);
        assert_eq!(Reg::imm_f32(0.0).to_string(), "#0x0");
        assert_eq!(Reg::constant(4).to_string(), "c4");
    }

    #[cfg(feature = "enable-serde")]
    #[test]
    fn alignment_tokens() {
        use serde_test::{assert_tokens, Token};

        assert_tokens(
            &Alignment::Odd,
            &[Token::UnitVariant {
                name: "Alignment",
                variant: "Odd",
            }],
        );
    }
}
