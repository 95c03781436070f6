//! Random linear combinations over GF(2⁸): the fountain codec's unit
//! of exchange (`spec.md` §4.6 "Fountain sink", "Generation").
//!
//! Each combination carries a sparse coefficient vector over a
//! contiguous block-index range (`first..=last`) plus the GF(2⁸)
//! weighted sum of the corresponding block bytes. A combination with
//! exactly one nonzero coefficient, equal to 1, over a range of width
//! 1 *is* the decoded block.

use std::collections::BTreeMap;

use teapotnet_bytes::{Readable, Reader, Result as BytesResult, Writeable, Writer};

use crate::gf256;

/// Fixed block size in bytes (`spec.md` §4.6 "Store": "Blocks are
/// 1024 bytes").
pub const BLOCK_SIZE: usize = 1024;

/// A random linear combination of one or more blocks in a contiguous
/// index range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    components: BTreeMap<u64, u8>,
    data: Vec<u8>,
}

impl Combination {
    /// The empty combination: no components, no data.
    pub fn empty() -> Self {
        Combination {
            components: BTreeMap::new(),
            data: Vec::new(),
        }
    }

    /// A single raw block at `offset`: coefficient 1, data is a
    /// 2-byte big-endian length prefix followed by `content`,
    /// zero-padded to [`BLOCK_SIZE`].
    pub fn from_block(offset: u64, content: &[u8]) -> Self {
        assert!(content.len() <= BLOCK_SIZE - 2, "block content exceeds BLOCK_SIZE");
        let mut data = vec![0u8; BLOCK_SIZE];
        let len = content.len() as u16;
        data[0..2].copy_from_slice(&len.to_be_bytes());
        data[2..2 + content.len()].copy_from_slice(content);
        let mut components = BTreeMap::new();
        components.insert(offset, 1u8);
        Combination { components, data }
    }

    /// Adds (XORs) `coeff` onto the coefficient of `offset`, removing
    /// the entry if it cancels to zero.
    pub fn add_component(&mut self, offset: u64, coeff: u8) {
        let entry = self.components.entry(offset).or_insert(0);
        *entry = gf256::add(*entry, coeff);
        if *entry == 0 {
            self.components.remove(&offset);
        }
    }

    /// The lowest component index, or 0 if there are none.
    pub fn first_component(&self) -> u64 {
        self.components.keys().next().copied().unwrap_or(0)
    }

    /// The highest component index, or 0 if there are none.
    pub fn last_component(&self) -> u64 {
        self.components.keys().next_back().copied().unwrap_or(0)
    }

    /// Width of the `first..=last` range, or 0 if there are no
    /// components. This is a range width, not a count of nonzero
    /// coefficients — an equation may have "holes".
    pub fn components_count(&self) -> u64 {
        if self.components.is_empty() {
            0
        } else {
            self.last_component() - self.first_component() + 1
        }
    }

    /// The coefficient at `offset`, or 0 if absent.
    pub fn coeff(&self, offset: u64) -> u8 {
        self.components.get(&offset).copied().unwrap_or(0)
    }

    /// `true` if this combination is exactly one decoded block: a
    /// single component with coefficient 1.
    pub fn is_decoded(&self) -> bool {
        self.components.len() == 1 && self.coeff(self.first_component()) == 1
    }

    /// The decoded block's content, stripping the 2-byte length
    /// prefix. Only meaningful when [`Self::is_decoded`] is true.
    pub fn decoded_data(&self) -> &[u8] {
        if !self.is_decoded() || self.data.len() < 2 {
            return &[];
        }
        let len = u16::from_be_bytes([self.data[0], self.data[1]]) as usize;
        let available = self.data.len() - 2;
        &self.data[2..2 + len.min(available)]
    }

    /// Adds `other` onto `self` in place: XORs the data bytes and
    /// merges the coefficient maps.
    pub fn add_assign(&mut self, other: &Combination) {
        if self.data.is_empty() {
            self.data = vec![0u8; other.data.len()];
        }
        for i in 0..self.data.len().min(other.data.len()) {
            self.data[i] = gf256::add(self.data[i], other.data[i]);
        }
        for (&offset, &coeff) in &other.components {
            self.add_component(offset, coeff);
        }
    }

    /// Scales `self` by `coeff` in place: every data byte and every
    /// coefficient is multiplied by `coeff`.
    ///
    /// # Panics
    ///
    /// Panics if `coeff == 0`; a combination is never meaningfully
    /// scaled to the zero vector.
    pub fn scale_assign(&mut self, coeff: u8) {
        assert!(coeff != 0, "combinations are never scaled by zero");
        for byte in &mut self.data {
            *byte = gf256::mul(*byte, coeff);
        }
        for value in self.components.values_mut() {
            *value = gf256::mul(*value, coeff);
        }
    }

    /// `self + other * coeff`, computed in place (the Gauss-Jordan
    /// "row += pivot_row * c" step).
    pub fn add_scaled(&mut self, other: &Combination, coeff: u8) {
        let mut scaled = other.clone();
        scaled.scale_assign(coeff);
        self.add_assign(&scaled);
    }

    /// Divides `self` by `coeff` in place (multiplies by its
    /// multiplicative inverse).
    pub fn div_assign(&mut self, coeff: u8) {
        self.scale_assign(gf256::inv(coeff));
    }
}

impl Writeable for Combination {
    fn write_onto(&self, w: &mut Writer) {
        w.write_u64(self.first_component());
        let count: u16 = self.components_count().try_into().unwrap_or(u16::MAX);
        w.write_u16(count);
        let first = self.first_component();
        for i in first..first + count as u64 {
            w.write_u8(self.coeff(i));
        }
        let mut data = self.data.clone();
        data.resize(BLOCK_SIZE, 0);
        w.write_bytes(&data);
    }
}

impl Readable for Combination {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let first = r.take_u64()?;
        let count = r.take_u16()?;
        let mut components = BTreeMap::new();
        for i in 0..count as u64 {
            let coeff = r.take_u8()?;
            if coeff != 0 {
                components.insert(first + i, coeff);
            }
        }
        let data = r.take(BLOCK_SIZE)?.to_vec();
        Ok(Combination { components, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_round_trips_through_decode() {
        let c = Combination::from_block(5, b"hello");
        assert!(c.is_decoded());
        assert_eq!(c.decoded_data(), b"hello");
        assert_eq!(c.first_component(), 5);
        assert_eq!(c.components_count(), 1);
    }

    #[test]
    fn adding_two_blocks_then_subtracting_one_recovers_the_other() {
        let a = Combination::from_block(0, b"aaaa");
        let b = Combination::from_block(1, b"bbbb");
        let mut sum = a.clone();
        sum.add_assign(&b);
        assert!(!sum.is_decoded());

        // XOR is its own inverse, so adding `a` again recovers `b`.
        let mut recovered = sum.clone();
        recovered.add_assign(&a);
        assert_eq!(recovered.decoded_data(), b.decoded_data());
    }

    #[test]
    fn wire_round_trip_preserves_components_and_data() {
        let mut c = Combination::from_block(10, b"payload");
        c.scale_assign(200);
        let mut w = Writer::new();
        w.write(&c);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: Combination = r.extract().unwrap();
        assert_eq!(back, c);
    }
}
