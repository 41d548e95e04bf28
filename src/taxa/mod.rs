use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use hashbrown::HashMap;

use crate::bitmask::Bitmask;
use crate::Result;

static NEXT_NAMESPACE_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identity of a [`TaxonNamespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(usize);

impl NamespaceId {
    fn fresh() -> Self {
        Self(NEXT_NAMESPACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "namespace#{}", self.0)
    }
}

/// Identity token of an operational taxonomic unit.
///
/// A taxon is only meaningful together with the namespace that created it: the namespace
/// holds its label and its index, which is also its bit position in every [`Bitmask`].
/// Two taxa with the same label are different taxa unless they are the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Taxon {
    namespace: NamespaceId,
    index: usize,
}

impl Taxon {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    /// Mask with only this taxon's bit set.
    pub fn bitmask(&self) -> Bitmask {
        Bitmask::from_bit(self.index)
    }
}

impl fmt::Display for Taxon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "taxon {} of {}", self.index, self.namespace)
    }
}

#[derive(Debug)]
pub struct TaxonNamespaceMismatch {
    pub expected: NamespaceId,
    pub found: NamespaceId,
}

impl fmt::Display for TaxonNamespaceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Taxon namespace mismatch: expected {}, found {}",
            self.expected, self.found
        )
    }
}

impl Error for TaxonNamespaceMismatch {}

#[derive(Debug)]
pub struct FrozenNamespaceError {
    pub label: String,
}

impl fmt::Display for FrozenNamespaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot add taxon '{}' to a frozen taxon namespace",
            self.label
        )
    }
}

impl Error for FrozenNamespaceError {}

/// Bails with [`TaxonNamespaceMismatch`] unless both ids name the same namespace.
pub fn ensure_same_namespace(expected: NamespaceId, found: NamespaceId) -> Result<()> {
    if expected != found {
        bail!(TaxonNamespaceMismatch { expected, found });
    }
    Ok(())
}

/// Ordered registry of taxa.
///
/// Taxon `i` (0-based, insertion order) is encoded by bit `1 << i`. Indices are never
/// reassigned, so bitmasks computed against a namespace stay valid while it grows.
/// Not `Clone`: a copy would share the identity of the original.
#[derive(Debug)]
pub struct TaxonNamespace {
    id: NamespaceId,
    labels: Vec<String>,
    by_label: HashMap<String, usize>,
    frozen: bool,
}

impl Default for TaxonNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl TaxonNamespace {
    pub fn new() -> Self {
        Self {
            id: NamespaceId::fresh(),
            labels: Vec::new(),
            by_label: HashMap::new(),
            frozen: false,
        }
    }

    /// Creates a namespace with one new taxon per label, in order.
    ///
    /// # Example
    /// ```
    /// use phylostat::taxa::TaxonNamespace;
    /// let ns = TaxonNamespace::with_labels(["A", "B", "C"]);
    /// assert_eq!(ns.len(), 3);
    /// let b = ns.get_taxon("B").unwrap();
    /// assert_eq!(b.index(), 1);
    /// assert_eq!(ns.label(&b), "B");
    /// ```
    pub fn with_labels<S: AsRef<str>>(labels: impl IntoIterator<Item = S>) -> Self {
        let mut ns = Self::new();
        for label in labels {
            ns.push(label.as_ref());
        }
        ns
    }

    pub fn id(&self) -> NamespaceId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Adds a new taxon, even if another taxon already carries the same label.
    pub fn add_taxon(&mut self, label: &str) -> Result<Taxon> {
        if self.frozen {
            bail!(FrozenNamespaceError {
                label: label.to_string()
            });
        }
        Ok(self.push(label))
    }

    /// Returns the first taxon with the given label, creating it if there is none.
    pub fn require_taxon(&mut self, label: &str) -> Result<Taxon> {
        match self.get_taxon(label) {
            Some(taxon) => Ok(taxon),
            None => self.add_taxon(label),
        }
    }

    pub fn get_taxon(&self, label: &str) -> Option<Taxon> {
        self.by_label.get(label).map(|&index| self.make(index))
    }

    pub fn taxon(&self, index: usize) -> Option<Taxon> {
        (index < self.labels.len()).then(|| self.make(index))
    }

    pub fn taxa(&self) -> impl Iterator<Item = Taxon> + '_ {
        (0..self.labels.len()).map(|index| self.make(index))
    }

    pub fn contains(&self, taxon: &Taxon) -> bool {
        taxon.namespace == self.id && taxon.index < self.labels.len()
    }

    /// Label of a taxon of this namespace.
    ///
    /// # Panics
    /// Panics if the taxon belongs to another namespace.
    pub fn label(&self, taxon: &Taxon) -> &str {
        assert!(
            self.contains(taxon),
            "{} does not belong to {}",
            taxon,
            self.id
        );
        &self.labels[taxon.index]
    }

    pub fn set_label(&mut self, taxon: &Taxon, label: &str) -> Result<()> {
        ensure_same_namespace(self.id, taxon.namespace)?;
        self.labels[taxon.index] = label.to_string();
        self.by_label.clear();
        for (index, label) in self.labels.iter().enumerate() {
            self.by_label.entry(label.clone()).or_insert(index);
        }
        Ok(())
    }

    pub fn taxon_bitmask(&self, taxon: &Taxon) -> Result<Bitmask> {
        ensure_same_namespace(self.id, taxon.namespace)?;
        Ok(taxon.bitmask())
    }

    pub fn all_taxa_bitmask(&self) -> Bitmask {
        Bitmask::from_indices(0..self.labels.len())
    }

    pub fn taxa_bitmask<'a>(&self, taxa: impl IntoIterator<Item = &'a Taxon>) -> Result<Bitmask> {
        let mut mask = Bitmask::new();
        for taxon in taxa {
            ensure_same_namespace(self.id, taxon.namespace)?;
            mask.set(taxon.index);
        }
        Ok(mask)
    }

    /// Taxa whose bits are set in `bitmask`, in namespace order.
    pub fn bitmask_taxa_list(&self, bitmask: &Bitmask) -> Vec<Taxon> {
        bitmask
            .ones()
            .take_while(|&index| index < self.labels.len())
            .map(|index| self.make(index))
            .collect()
    }

    fn push(&mut self, label: &str) -> Taxon {
        let index = self.labels.len();
        self.labels.push(label.to_string());
        self.by_label.entry(label.to_string()).or_insert(index);
        self.make(index)
    }

    fn make(&self, index: usize) -> Taxon {
        Taxon {
            namespace: self.id,
            index,
        }
    }
}
