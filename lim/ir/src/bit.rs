use crate::BusIdx;
use std::fmt;

/// A single bit of a [crate::Value].
///
/// Bits are plain values. Two bits are the same bit exactly when they compare
/// equal: the four global bits stand for themselves and a local bit is
/// identified by the bus position that produces it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bit {
    /// The value of this bit does not matter.
    DontCare,
    /// The bit matters but nothing more is known about it.
    Care,
    /// Constant zero.
    Zero,
    /// Constant one.
    One,
    /// The bit produced at `position` of `owner`, or its inverse.
    Local {
        owner: BusIdx,
        position: u32,
        inverted: bool,
    },
}

impl Bit {
    /// The local bit produced at `position` of `owner`.
    pub fn local(owner: BusIdx, position: usize) -> Self {
        Bit::Local {
            owner,
            position: position as u32,
            inverted: false,
        }
    }

    pub fn constant(on: bool) -> Self {
        if on { Bit::One } else { Bit::Zero }
    }

    pub fn is_care(&self) -> bool {
        !matches!(self, Bit::DontCare)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Bit::Zero | Bit::One)
    }

    /// True for constant one.
    pub fn is_on(&self) -> bool {
        matches!(self, Bit::One)
    }

    /// True for constant zero.
    pub fn is_off(&self) -> bool {
        matches!(self, Bit::Zero)
    }

    /// Global bits have no owning bus.
    pub fn is_global(&self) -> bool {
        !matches!(self, Bit::Local { .. })
    }

    pub fn owner(&self) -> Option<BusIdx> {
        match self {
            Bit::Local { owner, .. } => Some(*owner),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<usize> {
        match self {
            Bit::Local { position, .. } => Some(*position as usize),
            _ => None,
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!(self, Bit::Local { inverted: true, .. })
    }

    /// The logical inverse. Care and don't-care map onto themselves.
    pub fn invert(self) -> Self {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
            Bit::DontCare | Bit::Care => self,
            Bit::Local {
                owner,
                position,
                inverted,
            } => Bit::Local {
                owner,
                position,
                inverted: !inverted,
            },
        }
    }

    /// Single character rendering used by the [crate::Value] debug form.
    pub fn symbol(&self) -> char {
        match self {
            Bit::DontCare => 'x',
            Bit::Zero => '0',
            Bit::One => '1',
            Bit::Care => 'C',
            Bit::Local { .. } => 'c',
        }
    }
}

impl fmt::Debug for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bit::Local {
                owner,
                position,
                inverted,
            } => write!(
                f,
                "{}bus{}[{position}]",
                if *inverted { "~" } else { "" },
                owner.0
            ),
            _ => write!(f, "{}", self.symbol()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inversion_round_trips() {
        let bit = Bit::local(BusIdx(3), 2);
        assert!(bit.invert().is_inverted());
        assert_eq!(bit.invert().invert(), bit);
        assert_eq!(Bit::One.invert(), Bit::Zero);
        assert_eq!(Bit::Care.invert(), Bit::Care);
        assert_eq!(Bit::DontCare.invert(), Bit::DontCare);
    }

    #[test]
    fn local_bits_keep_identity() {
        let a = Bit::local(BusIdx(1), 4);
        assert_eq!(a.owner(), Some(BusIdx(1)));
        assert_eq!(a.position(), Some(4));
        assert_eq!(a, Bit::local(BusIdx(1), 4));
        assert_ne!(a, Bit::local(BusIdx(1), 5));
        assert!(!a.is_global());
        assert!(a.is_care() && !a.is_constant());
    }
}
