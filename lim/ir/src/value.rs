//! Bit vectors describing what is known about the data on a port or bus.
use crate::{Bit, BusIdx};
use lim_utils::{Error, LimResult};
use std::fmt;

/// An ordered vector of [Bit]s, least significant bit first. The width and
/// signedness are fixed when the value is created.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Value {
    bits: Vec<Bit>,
    signed: bool,
}

impl Value {
    /// A value whose bits are all generic care bits.
    pub fn new(size: usize, signed: bool) -> Self {
        Self {
            bits: vec![Bit::Care; size],
            signed,
        }
    }

    /// A value whose bits are all produced locally by `bus`.
    pub fn local(bus: BusIdx, size: usize, signed: bool) -> Self {
        Self {
            bits: (0..size).map(|i| Bit::local(bus, i)).collect(),
            signed,
        }
    }

    /// Build a value from bits ordered least significant first.
    pub fn from_bits(bits: Vec<Bit>, signed: bool) -> Self {
        Self { bits, signed }
    }

    /// A copy of `value` with every local bit replaced by a generic care bit.
    pub fn generic(value: &Value) -> Self {
        Self {
            bits: value
                .bits
                .iter()
                .map(|b| if b.is_global() { *b } else { Bit::Care })
                .collect(),
            signed: value.signed,
        }
    }

    /// The constant `constant`, at least `min_size` bits wide. Widths below
    /// `min_size` are padded with the sign bit when `signed` holds and with
    /// zeros otherwise.
    pub fn constant(constant: i64, min_size: usize, signed: bool) -> Self {
        let natural = if signed || constant < 0 {
            signed_width(constant)
        } else {
            (64 - constant.leading_zeros() as usize).max(1)
        };
        let size = natural.max(min_size);
        let mut bits = Vec::with_capacity(size);
        for i in 0..natural {
            bits.push(Bit::constant((constant >> i) & 1 == 1));
        }
        let pad = if signed {
            bits[natural - 1]
        } else {
            Bit::Zero
        };
        bits.resize(size, pad);
        Self { bits, signed }
    }

    /// Parse a sequence of `1`, `0`, `c` and `x` characters, most significant
    /// bit first.
    pub fn parse(token: &str, signed: bool) -> LimResult<Self> {
        let mut bits = Vec::with_capacity(token.len());
        for ch in token.chars().rev() {
            let bit = match ch.to_ascii_lowercase() {
                '1' => Bit::One,
                '0' => Bit::Zero,
                'c' => Bit::Care,
                'x' => Bit::DontCare,
                other => {
                    return Err(Error::misc(format!(
                        "invalid bit specifier `{other}' in `{token}'"
                    )));
                }
            };
            bits.push(bit);
        }
        if bits.is_empty() {
            return Err(Error::misc("cannot parse an empty value"));
        }
        Ok(Self { bits, signed })
    }

    pub fn size(&self) -> usize {
        self.bits.len()
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn bit(&self, position: usize) -> Bit {
        self.bits[position]
    }

    pub fn bits(&self) -> &[Bit] {
        &self.bits
    }

    pub fn set_bit(&mut self, position: usize, bit: Bit) {
        self.bits[position] = bit;
    }

    /// Copy bit `from` of `other` into bit `position` of this value.
    pub fn set_bit_from(&mut self, position: usize, other: &Value, from: usize) {
        self.bits[position] = other.bits[from];
    }

    pub fn bit_equals(&self, position: usize, other: &Value, at: usize) -> bool {
        self.bits[position] == other.bits[at]
    }

    pub fn is_care(&self, position: usize) -> bool {
        self.bits[position].is_care()
    }

    /// A global care bit that is not constant.
    pub fn is_generic_care(&self, position: usize) -> bool {
        self.bits[position] == Bit::Care
    }

    pub fn is_global(&self, position: usize) -> bool {
        self.bits[position].is_global()
    }

    pub fn is_on(&self, position: usize) -> bool {
        self.bits[position].is_on()
    }

    pub fn is_off(&self, position: usize) -> bool {
        self.bits[position].is_off()
    }

    /// True if every care bit is a constant.
    pub fn is_constant(&self) -> bool {
        self.bits.iter().all(|b| !b.is_care() || b.is_constant())
    }

    /// True if no bit is a care bit.
    pub fn is_dont_care(&self) -> bool {
        self.bits.iter().all(|b| !b.is_care())
    }

    /// The constant bits as an integer, sign extended to 64 bits when the
    /// value is signed and its most significant bit is one.
    pub fn value_mask(&self) -> i64 {
        let mut mask = 0i64;
        for (i, bit) in self.bits.iter().enumerate().take(64) {
            if bit.is_on() {
                mask |= 1 << i;
            }
        }
        let msb_on = self.bits.last().is_some_and(Bit::is_on);
        if self.signed && msb_on {
            for i in self.size()..64 {
                mask |= 1 << i;
            }
        }
        mask
    }

    pub fn care_mask(&self) -> u64 {
        self.mask_of(Bit::is_care)
    }

    pub fn constant_mask(&self) -> u64 {
        self.mask_of(Bit::is_constant)
    }

    fn mask_of(&self, pred: fn(&Bit) -> bool) -> u64 {
        self.bits
            .iter()
            .enumerate()
            .take(64)
            .filter(|(_, b)| pred(b))
            .fold(0, |acc, (i, _)| acc | (1 << i))
    }

    /// The integer this value represents when every care bit is constant.
    /// Don't-care bits read as zero.
    pub fn as_i64(&self) -> Option<i64> {
        if !self.is_constant() || self.size() > 64 {
            return None;
        }
        Some(self.value_mask())
    }

    /// The fewest low-order bits that carry all the information in this
    /// value. Never less than one, except for an empty value.
    pub fn compacted_size(&self) -> usize {
        let size = self.size();
        let Some(mut msb) = size.checked_sub(1) else {
            return 0;
        };
        if !self.signed && self.is_care(msb) && !self.is_off(msb) {
            return size;
        }
        let mut compacted = size;
        for i in (0..size - 1).rev() {
            let differs = !self.bit_equals(msb, self, i);
            if self.is_generic_care(msb)
                || (!self.is_global(msb) && differs)
                || (self.is_care(msb) && differs)
            {
                break;
            }
            compacted -= 1;
            msb = i;
        }
        compacted.max(1)
    }

    /// Merge two values of the same shape. Positions where both agree keep
    /// their bit; every other position becomes a generic care bit.
    pub fn union(&self, other: &Value) -> LimResult<Value> {
        if self.size() != other.size() {
            return Err(Error::size_mismatch(
                "union of values",
                self.size(),
                other.size(),
            ));
        }
        if self.signed != other.signed {
            return Err(Error::illegal_state("union of values with mixed sign"));
        }
        let bits = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| if a == b { *a } else { Bit::Care })
            .collect();
        Ok(Value {
            bits,
            signed: self.signed,
        })
    }

    /// True if both values describe the same information. A generic care bit
    /// is equivalent to any non-constant care bit.
    pub fn equivalent(&self, other: &Value) -> bool {
        if self.signed != other.signed || self.size() != other.size() {
            return false;
        }
        self.bits.iter().zip(other.bits.iter()).all(|(a, b)| {
            if *a == Bit::Care {
                b.is_care() && !b.is_constant()
            } else if *b == Bit::Care {
                a.is_care() && !a.is_constant()
            } else {
                a == b
            }
        })
    }

    /// Truncate or extend to `size` bits. Extension replicates the sign bit
    /// of signed values and uses zeros otherwise.
    pub fn resized(&self, size: usize, signed: bool) -> Value {
        let mut bits: Vec<Bit> = self.bits.iter().take(size).copied().collect();
        let pad = if self.signed {
            self.bits.last().copied().unwrap_or(Bit::Zero)
        } else {
            Bit::Zero
        };
        bits.resize(size, pad);
        Value { bits, signed }
    }
}

/// Width of the two's complement encoding of `n`.
fn signed_width(n: i64) -> usize {
    let magnitude = if n < 0 { !n } else { n };
    65 - magnitude.leading_zeros() as usize
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size();
        if size < 10 {
            write!(f, " ")?;
        }
        write!(f, "{size}'[")?;
        for bit in self.bits.iter().rev() {
            write!(f, "{}", bit.symbol())?;
        }
        write!(f, "]")?;
        if self.signed {
            write!(f, "+/-")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_values_compact_to_nothing() {
        assert_eq!(Value::new(0, true).compacted_size(), 0);
        assert_eq!(Value::from_bits(vec![], false).compacted_size(), 0);
    }

    #[test]
    fn debug_form() {
        let v = Value::parse("10cx", true).unwrap();
        assert_eq!(v.to_string(), " 4'[10Cx]+/-");
        let l = Value::local(BusIdx(0), 12, false);
        assert_eq!(l.to_string(), "12'[cccccccccccc]");
    }

    #[test]
    fn constants_are_padded_with_the_sign() {
        let three = Value::constant(3, 8, true);
        assert_eq!(three.size(), 8);
        assert_eq!(three.as_i64(), Some(3));
        let neg = Value::constant(-2, 8, true);
        assert_eq!(neg.to_string(), " 8'[11111110]+/-");
        assert_eq!(neg.as_i64(), Some(-2));
        assert_eq!(Value::constant(5, 0, false).size(), 3);
    }

    #[test]
    fn compaction() {
        assert_eq!(Value::parse("0011", false).unwrap().compacted_size(), 3);
        assert_eq!(Value::parse("1111", true).unwrap().compacted_size(), 1);
        assert_eq!(Value::parse("xx01", false).unwrap().compacted_size(), 2);
        assert_eq!(Value::parse("1c00", false).unwrap().compacted_size(), 4);
        assert_eq!(Value::parse("cc00", true).unwrap().compacted_size(), 4);
        assert_eq!(Value::parse("0000", false).unwrap().compacted_size(), 1);
    }

    #[test]
    fn union_keeps_agreement() {
        let a = Value::parse("10x1", false).unwrap();
        let b = Value::parse("11x1", false).unwrap();
        assert_eq!(a.union(&b).unwrap().to_string(), " 4'[1Cx1]");
        assert!(a.union(&Value::new(3, false)).is_err());
    }

    #[test]
    fn constant_and_dont_care_queries() {
        assert!(Value::parse("1x0", false).unwrap().is_constant());
        assert!(!Value::parse("1c0", false).unwrap().is_constant());
        assert!(Value::parse("xxx", false).unwrap().is_dont_care());
        let v = Value::parse("1x0c", false).unwrap();
        assert_eq!(v.care_mask(), 0b1011);
        assert_eq!(v.constant_mask(), 0b1010);
    }

    proptest! {
        #[test]
        fn constant_round_trips(n in -1000i64..1000, min in 0usize..16) {
            let v = Value::constant(n, min, true);
            prop_assert!(v.size() >= min);
            prop_assert_eq!(v.as_i64(), Some(n));
            prop_assert!(v.compacted_size() <= v.size());
        }
    }
}
