use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use anyhow::bail;

use crate::bitmask::{int_as_bitstring, least_significant_set_bit, Bitmask, BitstringFormat};
use crate::taxa::{Taxon, TaxonNamespace};
use crate::Result;

pub mod encoding;
pub use encoding::{
    encode_bipartitions, false_positives_and_negatives, symmetric_difference, EncodingOptions,
    TreeBipartitions,
};

/// Canonical form of `bitmask` within `fill_bitmask`.
///
/// If `bitmask` shares a bit with `lowest_relevant_bit` the complement within the fill mask is
/// returned, otherwise the masked value itself. With the lowest taxon of a tree as
/// `lowest_relevant_bit`, that taxon always ends up on the unset side.
///
/// # Example
/// ```
/// use phylostat::bipartition::normalize_bitmask;
/// use phylostat::bitmask::Bitmask;
/// let fill = Bitmask::from(0b1111);
/// let lowest = Bitmask::from(0b0001);
/// assert_eq!(normalize_bitmask(&Bitmask::from(0b0011), &fill, &lowest), Bitmask::from(0b1100));
/// assert_eq!(normalize_bitmask(&Bitmask::from(0b1100), &fill, &lowest), Bitmask::from(0b1100));
/// ```
pub fn normalize_bitmask(
    bitmask: &Bitmask,
    fill_bitmask: &Bitmask,
    lowest_relevant_bit: &Bitmask,
) -> Bitmask {
    if (bitmask & lowest_relevant_bit).is_empty() {
        bitmask & fill_bitmask
    } else {
        bitmask.complement_within(fill_bitmask)
    }
}

/// Checks whether a split separates at most one taxon of `fill_bitmask` from the others.
pub fn is_trivial_bitmask(bitmask: &Bitmask, fill_bitmask: &Bitmask) -> bool {
    let masked = bitmask & fill_bitmask;
    masked.num_set_bits() <= 1 || bitmask.complement_within(fill_bitmask).num_set_bits() <= 1
}

/// Four-point test: two splits can be on the same tree iff one of the intersections of
/// `{m1, !m1} x {m2, !m2}` within `fill_bitmask` is empty.
///
/// An empty fill mask means no masking, the complements then being taken within `m1 | m2`.
pub fn is_compatible_bitmasks(m1: &Bitmask, m2: &Bitmask, fill_bitmask: &Bitmask) -> bool {
    let fill = if fill_bitmask.is_empty() {
        m1 | m2
    } else {
        fill_bitmask.clone()
    };
    let m1 = m1 & &fill;
    let m2 = m2 & &fill;
    if (&m1 & &m2).is_empty() {
        return true;
    }
    let c1 = m1.complement_within(&fill);
    if (&c1 & &m2).is_empty() {
        return true;
    }
    let c2 = m2.complement_within(&fill);
    if (&m1 & &c2).is_empty() {
        return true;
    }
    (&c1 & &c2).is_empty()
}

/// Mutable description of a bipartition, frozen into a [`Bipartition`] by [`Self::build`].
#[derive(Debug, Clone, Default)]
pub struct BipartitionBuilder {
    pub leafset_bitmask: Bitmask,
    pub tree_leafset_bitmask: Bitmask,
    pub is_rooted: bool,
}

impl BipartitionBuilder {
    pub fn new(leafset_bitmask: Bitmask, tree_leafset_bitmask: Bitmask) -> Self {
        Self {
            leafset_bitmask,
            tree_leafset_bitmask,
            is_rooted: false,
        }
    }

    pub fn rooted(mut self, is_rooted: bool) -> Self {
        self.is_rooted = is_rooted;
        self
    }

    /// Compiles the split bitmask.
    ///
    /// Rooted splits are the leafset itself. Unrooted ones are normalised so that the lowest
    /// taxon of the tree is never in the split.
    pub fn build(self) -> Result<Bipartition> {
        if !self.leafset_bitmask.is_subset_of(&self.tree_leafset_bitmask) {
            bail!(
                "Leafset {} is not within the tree leafset {}",
                self.leafset_bitmask,
                self.tree_leafset_bitmask
            );
        }
        let split_bitmask = if self.is_rooted {
            self.leafset_bitmask.clone()
        } else {
            normalize_bitmask(
                &self.leafset_bitmask,
                &self.tree_leafset_bitmask,
                &least_significant_set_bit(&self.tree_leafset_bitmask),
            )
        };
        Ok(Bipartition {
            leafset_bitmask: self.leafset_bitmask,
            split_bitmask,
            tree_leafset_bitmask: self.tree_leafset_bitmask,
            is_rooted: self.is_rooted,
        })
    }
}

/// Partition of the taxa of a tree induced by one edge.
///
/// Equality, ordering and hashing only use the split bitmask.
#[derive(Debug, Clone)]
pub struct Bipartition {
    leafset_bitmask: Bitmask,
    split_bitmask: Bitmask,
    tree_leafset_bitmask: Bitmask,
    is_rooted: bool,
}

impl Bipartition {
    /// Taxa below the edge.
    pub fn leafset_bitmask(&self) -> &Bitmask {
        &self.leafset_bitmask
    }

    pub fn split_bitmask(&self) -> &Bitmask {
        &self.split_bitmask
    }

    pub fn tree_leafset_bitmask(&self) -> &Bitmask {
        &self.tree_leafset_bitmask
    }

    pub fn is_rooted(&self) -> bool {
        self.is_rooted
    }

    pub fn is_trivial(&self) -> bool {
        is_trivial_bitmask(&self.split_bitmask, &self.tree_leafset_bitmask)
    }

    pub fn is_compatible_with(&self, other: &Bipartition) -> bool {
        is_compatible_bitmasks(
            &self.split_bitmask,
            &other.split_bitmask,
            &self.tree_leafset_bitmask,
        )
    }

    pub fn is_incompatible_with(&self, other: &Bipartition) -> bool {
        !self.is_compatible_with(other)
    }

    /// Checks whether the leafset of `self` lies within the leafset of `other`.
    pub fn is_nested_within(&self, other: &Bipartition) -> bool {
        self.leafset_bitmask.is_subset_of(&other.leafset_bitmask)
    }

    /// Normalises `bitmask` the way unrooted splits of this tree are.
    pub fn normalize(&self, bitmask: &Bitmask) -> Bitmask {
        normalize_bitmask(
            bitmask,
            &self.tree_leafset_bitmask,
            &least_significant_set_bit(&self.tree_leafset_bitmask),
        )
    }

    /// Taxa below the edge, in namespace order.
    pub fn leafset_taxa(&self, namespace: &TaxonNamespace) -> Vec<Taxon> {
        namespace.bitmask_taxa_list(&self.leafset_bitmask)
    }

    /// Renders the leafset, as wide as the tree leafset unless `format` sets a length.
    pub fn leafset_as_bitstring(&self, format: &BitstringFormat) -> String {
        int_as_bitstring(&self.leafset_bitmask, &self.sized_format(format))
    }

    pub fn split_as_bitstring(&self, format: &BitstringFormat) -> String {
        int_as_bitstring(&self.split_bitmask, &self.sized_format(format))
    }

    fn sized_format(&self, format: &BitstringFormat) -> BitstringFormat {
        let mut format = format.clone();
        if format.length.is_none() {
            format.length = Some(self.tree_leafset_bitmask.bit_length());
        }
        format
    }
}

impl PartialEq for Bipartition {
    fn eq(&self, other: &Self) -> bool {
        self.split_bitmask == other.split_bitmask
    }
}

impl Eq for Bipartition {}

impl Hash for Bipartition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.split_bitmask.hash(state);
    }
}

impl Ord for Bipartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.split_bitmask.cmp(&other.split_bitmask)
    }
}

impl PartialOrd for Bipartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Bipartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.split_as_bitstring(&BitstringFormat::default()))
    }
}
