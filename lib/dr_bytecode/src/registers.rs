//! Types definitions to address Dalvik registers.
//!
//! Registers are wrapped in a [register](Reg) type over a 16 bits integer, which
//! allows to differentiate them from constant values in instruction operands.
//! Invocation arguments are kept in an ordered [`RegList`], whatever the
//! encoding (five-register form or register range) used by the disassembled
//! instruction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The register type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reg(u16);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u8> for Reg {
    fn from(r: u8) -> Self {
        Self(u16::from(r))
    }
}

impl From<u16> for Reg {
    fn from(r: u16) -> Self {
        Self(r)
    }
}

impl From<Reg> for u16 {
    fn from(r: Reg) -> Self {
        r.0
    }
}

impl Reg {
    /// Returns the wrapped register slot number.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns the following register.
    ///
    /// This function is used to address register pairs without manipulating slot
    /// numbers directly.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// An explicit list of registers, used for methods parameters.
///
/// For non-static invocations the first register holds the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegList(Vec<Reg>);

impl fmt::Display for RegList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, reg) in self.0.iter().enumerate() {
            write!(f, "{reg}")?;
            if i < self.0.len() - 1 {
                write!(f, ", ")?;
            }
        }
        write!(f, "}}")
    }
}

impl<T> From<Vec<T>> for RegList
where
    Reg: From<T>,
{
    fn from(args: Vec<T>) -> Self {
        Self(args.into_iter().map(Reg::from).collect())
    }
}

impl RegList {
    /// Builds the list of a register range invocation (`{vN .. vM}`).
    #[must_use]
    pub fn range(first: Reg, count: u16) -> Self {
        Self((0..count).map(|i| Reg(first.0 + i)).collect())
    }

    /// Checks if the list contains no register.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of registers in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the register at the given operand position.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Reg> {
        self.0.get(i).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn contains(&self, reg: Reg) -> bool {
        self.0.contains(&reg)
    }
}
