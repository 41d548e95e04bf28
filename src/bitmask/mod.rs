use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr, BitOrAssign, BitXor};

use fixedbitset::FixedBitSet;

/// Arbitrary-width bit vector used to encode sets of taxa.
///
/// Bit `i` stands for the taxon with index `i` in its namespace. Equality, ordering and
/// hashing only look at the set bits, so two masks built with different capacities compare
/// equal as long as they mark the same taxa. Ordering is the one of the unsigned integers the
/// masks represent.
#[derive(Clone, Default)]
pub struct Bitmask(FixedBitSet);

impl Bitmask {
    pub fn new() -> Self {
        Self(FixedBitSet::new())
    }

    /// Mask with only bit `bit` set.
    pub fn from_bit(bit: usize) -> Self {
        let mut mask = Self::new();
        mask.set(bit);
        mask
    }

    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new();
        for bit in indices {
            mask.set(bit);
        }
        mask
    }

    pub fn set(&mut self, bit: usize) {
        if bit >= self.0.len() {
            self.0.grow(bit + 1);
        }
        self.0.insert(bit);
    }

    pub fn unset(&mut self, bit: usize) {
        if bit < self.0.len() {
            self.0.set(bit, false);
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.0.contains(bit)
    }

    pub fn is_empty(&self) -> bool {
        self.0.ones().next().is_none()
    }

    pub fn num_set_bits(&self) -> usize {
        self.0.count_ones(..)
    }

    /// Positions of the set bits, lowest first.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.ones()
    }

    pub fn lowest_set_bit_index(&self) -> Option<usize> {
        self.0.ones().next()
    }

    pub fn highest_set_bit_index(&self) -> Option<usize> {
        self.0.ones().last()
    }

    pub fn bit_length(&self) -> usize {
        self.highest_set_bit_index().map_or(0, |bit| bit + 1)
    }

    /// Bits of `fill` that are not set in `self`, i.e. `!self & fill`.
    pub fn complement_within(&self, fill: &Bitmask) -> Bitmask {
        let mut complement = fill.0.clone();
        complement.difference_with(&self.0);
        Bitmask(complement)
    }

    pub fn is_subset_of(&self, other: &Bitmask) -> bool {
        self.ones().all(|bit| other.contains(bit))
    }

    pub fn is_disjoint_with(&self, other: &Bitmask) -> bool {
        self.ones().all(|bit| !other.contains(bit))
    }

    /// Value of the mask as an integer, if it fits in 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.bit_length() > 64 {
            return None;
        }
        Some(self.ones().fold(0u64, |acc, bit| acc | (1u64 << bit)))
    }

    fn with_len(&self, len: usize) -> FixedBitSet {
        let mut bits = self.0.clone();
        if bits.len() < len {
            bits.grow(len);
        }
        bits
    }
}

impl From<u64> for Bitmask {
    fn from(value: u64) -> Self {
        Self::from_indices((0..64).filter(|bit| (value >> bit) & 1 == 1))
    }
}

impl PartialEq for Bitmask {
    fn eq(&self, other: &Self) -> bool {
        self.ones().eq(other.ones())
    }
}

impl Eq for Bitmask {}

impl Hash for Bitmask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for bit in self.ones() {
            bit.hash(state);
        }
        self.num_set_bits().hash(state);
    }
}

impl Ord for Bitmask {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self ^ other).highest_set_bit_index() {
            None => Ordering::Equal,
            Some(bit) if self.contains(bit) => Ordering::Greater,
            Some(_) => Ordering::Less,
        }
    }
}

impl PartialOrd for Bitmask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl BitOr for &Bitmask {
    type Output = Bitmask;

    fn bitor(self, rhs: Self) -> Bitmask {
        let mut bits = self.with_len(rhs.0.len());
        bits.union_with(&rhs.0);
        Bitmask(bits)
    }
}

impl BitAnd for &Bitmask {
    type Output = Bitmask;

    fn bitand(self, rhs: Self) -> Bitmask {
        let mut bits = self.with_len(rhs.0.len());
        bits.intersect_with(&rhs.0);
        Bitmask(bits)
    }
}

impl BitXor for &Bitmask {
    type Output = Bitmask;

    fn bitxor(self, rhs: Self) -> Bitmask {
        let mut bits = self.with_len(rhs.0.len());
        bits.symmetric_difference_with(&rhs.0);
        Bitmask(bits)
    }
}

impl BitOrAssign<&Bitmask> for Bitmask {
    fn bitor_assign(&mut self, rhs: &Bitmask) {
        if self.0.len() < rhs.0.len() {
            self.0.grow(rhs.0.len());
        }
        self.0.union_with(&rhs.0);
    }
}

impl Display for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", int_as_bitstring(self, &BitstringFormat::default()))
    }
}

impl Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmask(0b{})", self)
    }
}

/// Population count of `n`.
pub fn num_set_bits(n: &Bitmask) -> usize {
    n.num_set_bits()
}

/// Isolates the lowest set bit of `n`; the empty mask for `n == 0`.
///
/// # Example
/// ```
/// use phylostat::bitmask::{least_significant_set_bit, Bitmask};
/// let lsb = least_significant_set_bit(&Bitmask::from(0b10100));
/// assert_eq!(lsb, Bitmask::from(0b100));
/// ```
pub fn least_significant_set_bit(n: &Bitmask) -> Bitmask {
    match n.lowest_set_bit_index() {
        Some(bit) => Bitmask::from_bit(bit),
        None => Bitmask::new(),
    }
}

/// Number of bits needed to represent `n`, 0 for the empty mask.
pub fn bit_length(n: &Bitmask) -> usize {
    n.bit_length()
}

/// [`bit_length`] for a possibly missing mask, 0 for `None`.
pub fn bit_length_opt(n: Option<&Bitmask>) -> usize {
    n.map_or(0, Bitmask::bit_length)
}

/// Rendering options for [`int_as_bitstring`].
#[derive(Debug, Clone, PartialEq)]
pub struct BitstringFormat {
    /// Minimum width of the output, padded with `symbol0`. Set bits are never cut off.
    pub length: Option<usize>,
    pub symbol0: char,
    pub symbol1: char,
    /// Puts the lowest bit (first taxon) in the leftmost character.
    pub reverse: bool,
}

impl Default for BitstringFormat {
    fn default() -> Self {
        Self {
            length: None,
            symbol0: '0',
            symbol1: '1',
            reverse: false,
        }
    }
}

impl BitstringFormat {
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_symbols(mut self, symbol0: char, symbol1: char) -> Self {
        self.symbol0 = symbol0;
        self.symbol1 = symbol1;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Renders `n` as a binary string, most significant bit first unless `format.reverse` is set.
///
/// # Example
/// ```
/// use phylostat::bitmask::{int_as_bitstring, Bitmask, BitstringFormat};
/// let mask = Bitmask::from(0b0011);
/// assert_eq!(int_as_bitstring(&mask, &BitstringFormat::default().with_length(5)), "00011");
/// let paup = BitstringFormat::default().with_length(5).with_symbols('.', '*').reversed();
/// assert_eq!(int_as_bitstring(&mask, &paup), "**...");
/// ```
pub fn int_as_bitstring(n: &Bitmask, format: &BitstringFormat) -> String {
    let width = format.length.map_or(n.bit_length(), |length| length.max(n.bit_length()));
    let symbol = |bit: usize| {
        if n.contains(bit) {
            format.symbol1
        } else {
            format.symbol0
        }
    };
    if format.reverse {
        (0..width).map(symbol).collect()
    } else {
        (0..width).rev().map(symbol).collect()
    }
}

/// Lazily yields the positions of the bits set in `s & fill_bitmask`.
///
/// With `ordination_in_mask` the yielded index is the rank of the position among the set bits
/// of `fill_bitmask`, which gives local indices within a taxon sub-block. A missing fill mask
/// covers all bits. The iterator is `Clone`, so it can be restarted from any point.
///
/// # Example
/// ```
/// use phylostat::bitmask::{set_bit_index_iter, Bitmask};
/// let s = Bitmask::from(0b101100);
/// let fill = Bitmask::from(0b111100);
/// let global: Vec<_> = set_bit_index_iter(&s, Some(&fill), false, false).collect();
/// assert_eq!(global, vec![2, 3, 5]);
/// let local: Vec<_> = set_bit_index_iter(&s, Some(&fill), false, true).collect();
/// assert_eq!(local, vec![0, 1, 3]);
/// ```
pub fn set_bit_index_iter(
    s: &Bitmask,
    fill_bitmask: Option<&Bitmask>,
    one_based: bool,
    ordination_in_mask: bool,
) -> SetBitIndexIter {
    let masked = match fill_bitmask {
        Some(fill) => s & fill,
        None => s.clone(),
    };
    SetBitIndexIter {
        end: masked.bit_length(),
        masked,
        fill: fill_bitmask.cloned(),
        offset: usize::from(one_based),
        ordination_in_mask,
        pos: 0,
        rank: 0,
    }
}

#[derive(Debug, Clone)]
pub struct SetBitIndexIter {
    masked: Bitmask,
    fill: Option<Bitmask>,
    offset: usize,
    ordination_in_mask: bool,
    end: usize,
    pos: usize,
    rank: usize,
}

impl Iterator for SetBitIndexIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.pos < self.end {
            let bit = self.pos;
            let rank = self.rank;
            self.pos += 1;
            let in_fill = self.fill.as_ref().map_or(true, |fill| fill.contains(bit));
            if in_fill {
                self.rank += 1;
            }
            if self.masked.contains(bit) {
                let index = if self.ordination_in_mask { rank } else { bit };
                return Some(index + self.offset);
            }
        }
        None
    }
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
