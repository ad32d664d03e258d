//! Digital bus words expressed as bit vectors.

use std::fmt::Display;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::waveform::Waveform;

/// Relative tolerance, as a fraction of the supply voltage, within which
/// an analog value counts as a settled logic level.
pub(crate) const DIGITAL_REL_TOL: f64 = 0.2;

/// A bus word expressed as a sequence of bits.
///
/// Bit 0 is the least significant bit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BitSignal {
    bits: BitVec,
}

impl BitSignal {
    /// The number of bits in the word.
    #[inline]
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// The `idx`-th bit of the word.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn bit(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    /// An iterator over the bits, LSB first.
    pub fn bits(&self) -> impl DoubleEndedIterator<Item = bool> + '_ {
        self.bits.iter().by_refs().copied()
    }

    /// An iterator over the bits, MSB first.
    pub fn bits_rev(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits().rev()
    }

    /// Constructs a word of width `width` from the `width` lowest bits of `value`.
    pub fn from_u32(value: u32, width: usize) -> Self {
        assert!(width <= 32);
        let mut bits = BitVec::with_capacity(width);
        for i in 0..width {
            bits.push((value >> i) & 1 == 1);
        }
        Self { bits }
    }

    /// Constructs a word of width `width` from the `width` lowest bits of `value`.
    pub fn from_u64(value: u64, width: usize) -> Self {
        assert!(width <= 64);
        let mut bits = BitVec::with_capacity(width);
        for i in 0..width {
            bits.push((value >> i) & 1 == 1);
        }
        Self { bits }
    }

    /// Constructs a word of width `width` from the `width` lowest bits of `value`.
    pub fn from_u128(value: u128, width: usize) -> Self {
        assert!(width <= 128);
        let mut bits = BitVec::with_capacity(width);
        for i in 0..width {
            bits.push((value >> i) & 1 == 1);
        }
        Self { bits }
    }

    /// Constructs a word with all bits set.
    pub fn ones(width: usize) -> Self {
        Self {
            bits: BitVec::repeat(true, width),
        }
    }

    /// Constructs a word with no bits set.
    pub fn zeros(width: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, width),
        }
    }

    /// Constructs a word from a [`Vec`] of bits, LSB first.
    pub fn from_vec(bits: Vec<bool>) -> Self {
        Self {
            bits: BitVec::from_iter(bits.iter()),
        }
    }

    /// Constructs a word from a slice of bits, LSB first.
    pub fn from_slice(bits: &[bool]) -> Self {
        Self {
            bits: BitVec::from_iter(bits.iter()),
        }
    }

    /// Assigns the `idx`-th bit of the word to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn assign(&mut self, idx: usize, value: bool) {
        self.bits.set(idx, value);
    }

    /// Sets the `idx`-th bit of the word.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn set(&mut self, idx: usize) {
        self.bits.set(idx, true);
    }

    /// Clears the `idx`-th bit of the word.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn clear(&mut self, idx: usize) {
        self.bits.set(idx, false);
    }
}

impl From<u32> for BitSignal {
    fn from(value: u32) -> Self {
        Self::from_u32(value, 32)
    }
}

impl From<u64> for BitSignal {
    fn from(value: u64) -> Self {
        Self::from_u64(value, 64)
    }
}

impl From<u128> for BitSignal {
    fn from(value: u128) -> Self {
        Self::from_u128(value, 128)
    }
}

impl Display for BitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}'b", self.width())?;
        for bit in self.bits_rev() {
            write!(f, "{}", u32::from(bit))?;
        }
        Ok(())
    }
}

/// Returns `true` if `x` is a settled logical low relative to `vdd`.
pub(crate) fn is_logical_low(x: f64, vdd: f64) -> bool {
    (x / vdd).abs() <= DIGITAL_REL_TOL
}

/// Returns `true` if `x` is a settled logical high relative to `vdd`.
pub(crate) fn is_logical_high(x: f64, vdd: f64) -> bool {
    ((x - vdd) / vdd).abs() <= DIGITAL_REL_TOL
}

/// Pushes one bus word onto a set of single-bit waveforms, holding each
/// bit at its value until time `until`.
///
/// # Panics
///
/// Panics if the word width does not match the number of waveforms.
pub fn push_bus(
    waveforms: &mut [Waveform],
    signal: &BitSignal,
    until: f64,
    vdd: f64,
    tr: f64,
    tf: f64,
) {
    assert_eq!(waveforms.len(), signal.width());
    for (waveform, bit) in waveforms.iter_mut().zip(signal.bits()) {
        waveform.push_bit(bit, until, vdd, tr, tf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_signal_from_u32() {
        let word = BitSignal::from_u32(0b1010, 4);
        assert_eq!(word.width(), 4);
        assert!(!word.bit(0));
        assert!(word.bit(1));
        assert!(!word.bit(2));
        assert!(word.bit(3));
    }

    #[test]
    fn bit_signal_display_is_msb_first() {
        assert_eq!(BitSignal::from_u32(0b1010, 4).to_string(), "4'b1010");
        assert_eq!(BitSignal::zeros(3).to_string(), "3'b000");
    }

    #[test]
    fn push_bus_drives_one_waveform_per_bit() {
        let mut waveforms = vec![Waveform::new(); 2];
        push_bus(
            &mut waveforms,
            &BitSignal::from_u32(0b01, 2),
            5e-9,
            1.0,
            1e-10,
            1e-10,
        );
        push_bus(
            &mut waveforms,
            &BitSignal::from_u32(0b10, 2),
            10e-9,
            1.0,
            1e-10,
            1e-10,
        );

        // Bit 0 drove 1 then 0, bit 1 the reverse.
        assert_eq!(waveforms[0].sample_at(4e-9), 1.0);
        assert_eq!(waveforms[0].sample_at(9e-9), 0.0);
        assert_eq!(waveforms[1].sample_at(4e-9), 0.0);
        assert_eq!(waveforms[1].sample_at(9e-9), 1.0);
        assert_eq!(waveforms[0].edges(0.5).count(), 1);
        assert_eq!(waveforms[1].edges(0.5).count(), 1);
    }

    #[test]
    #[should_panic]
    fn push_bus_rejects_width_mismatch() {
        let mut waveforms = vec![Waveform::new(); 2];
        push_bus(&mut waveforms, &BitSignal::ones(3), 1e-9, 1.0, 1e-10, 1e-10);
    }

    #[test]
    fn assign_set_clear() {
        let mut word = BitSignal::zeros(4);
        word.set(2);
        assert_eq!(word, BitSignal::from_u32(0b0100, 4));
        word.assign(0, true);
        word.clear(2);
        assert_eq!(word, BitSignal::from_u32(0b0001, 4));
    }
}
