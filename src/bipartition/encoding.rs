use anyhow::bail;
use hashbrown::{HashMap, HashSet};
use log::{debug, info};

use crate::bipartition::{Bipartition, BipartitionBuilder};
use crate::bitmask::Bitmask;
use crate::taxa::{ensure_same_namespace, NamespaceId};
use crate::tree::{NodeIdx, Tree};
use crate::Result;

/// Topology clean-up done by [`encode_bipartitions`] before the splits are computed.
///
/// Unifurcations are suppressed first, so that a single-child node below the root cannot
/// hide a bifurcating root from the collapse.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingOptions {
    pub suppress_unifurcations: bool,
    /// Turns the bifurcating root of an unrooted tree into a trifurcation, so that the two
    /// root edges give a single split. Rooted trees are left alone.
    pub collapse_unrooted_basal_bifurcation: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            suppress_unifurcations: true,
            collapse_unrooted_basal_bifurcation: true,
        }
    }
}

impl EncodingOptions {
    pub fn suppress_unifurcations(mut self, suppress_unifurcations: bool) -> Self {
        self.suppress_unifurcations = suppress_unifurcations;
        self
    }

    pub fn collapse_unrooted_basal_bifurcation(mut self, collapse: bool) -> Self {
        self.collapse_unrooted_basal_bifurcation = collapse;
        self
    }
}

/// Bipartitions of every edge of a tree, the root edge included.
#[derive(Debug, Clone)]
pub struct TreeBipartitions {
    namespace: NamespaceId,
    is_rooted: bool,
    tree_leafset_bitmask: Bitmask,
    bipartitions: Vec<Bipartition>,
    edges: Vec<NodeIdx>,
    by_edge: HashMap<NodeIdx, usize>,
    by_split: HashMap<Bitmask, usize>,
}

impl TreeBipartitions {
    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    pub fn is_rooted(&self) -> bool {
        self.is_rooted
    }

    /// Taxa present on the tree.
    pub fn tree_leafset_bitmask(&self) -> &Bitmask {
        &self.tree_leafset_bitmask
    }

    /// Bipartitions in the post-order of the edges they belong to.
    pub fn bipartitions(&self) -> &[Bipartition] {
        &self.bipartitions
    }

    pub fn len(&self) -> usize {
        self.bipartitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bipartitions.is_empty()
    }

    /// Edges, named by their child node, paired with their bipartitions.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeIdx, &Bipartition)> {
        self.edges.iter().zip(self.bipartitions.iter())
    }

    pub fn split_bitmasks(&self) -> HashSet<Bitmask> {
        self.bipartitions
            .iter()
            .map(|bipartition| bipartition.split_bitmask().clone())
            .collect()
    }

    /// Edge inducing `split`, the first one in post-order if several edges induce it.
    pub fn edge_for_split(&self, split: &Bitmask) -> Option<NodeIdx> {
        self.by_split.get(split).map(|&i| self.edges[i])
    }

    /// Bipartition of the edge above `node_idx`.
    pub fn bipartition_for(&self, node_idx: &NodeIdx) -> Option<&Bipartition> {
        self.by_edge.get(node_idx).map(|&i| &self.bipartitions[i])
    }

    pub fn contains_split(&self, split: &Bitmask) -> bool {
        self.by_split.contains_key(split)
    }

    /// Bipartitions separating at least two taxa from at least two others.
    pub fn non_trivial(&self) -> impl Iterator<Item = &Bipartition> {
        self.bipartitions.iter().filter(|b| !b.is_trivial())
    }
}

/// Computes the bipartition of every edge of `tree` in one post-order pass.
///
/// The tree is first cleaned up as set in `options`, unifurcations before the basal
/// bifurcation, which renumbers its nodes. Leaves without a taxon contribute no bits.
///
/// # Example
/// ```
/// use phylostat::bipartition::{encode_bipartitions, EncodingOptions};
/// use phylostat::bitmask::Bitmask;
/// use phylostat::taxa::TaxonNamespace;
/// use phylostat::tree::from_newick;
/// let mut ns = TaxonNamespace::new();
/// let mut tree = from_newick("((A,B),(C,D));", &mut ns).unwrap().remove(0);
/// let encoding = encode_bipartitions(&mut tree, &EncodingOptions::default()).unwrap();
/// assert_eq!(encoding.non_trivial().count(), 1);
/// assert!(encoding.contains_split(&Bitmask::from(0b1100)));
/// ```
pub fn encode_bipartitions(tree: &mut Tree, options: &EncodingOptions) -> Result<TreeBipartitions> {
    info!("Encoding the bipartitions of a tree.");
    if options.suppress_unifurcations {
        tree.suppress_unifurcations();
    }
    if options.collapse_unrooted_basal_bifurcation && !tree.is_rooted {
        tree.collapse_basal_bifurcation();
    }

    let mut leafsets: HashMap<NodeIdx, Bitmask> = HashMap::with_capacity(tree.len());
    for idx in tree.postorder.iter() {
        let node = tree.node(idx);
        let leafset = if node.is_leaf() {
            match node.taxon {
                Some(taxon) => {
                    ensure_same_namespace(tree.namespace(), taxon.namespace())?;
                    taxon.bitmask()
                }
                None => Bitmask::new(),
            }
        } else {
            let mut leafset = Bitmask::new();
            for child in node.children.iter() {
                leafset |= &leafsets[child];
            }
            leafset
        };
        leafsets.insert(*idx, leafset);
    }
    let tree_leafset_bitmask = match leafsets.get(&tree.root) {
        Some(leafset) => leafset.clone(),
        None => bail!("Cannot encode the bipartitions of an empty tree"),
    };

    let mut encoding = TreeBipartitions {
        namespace: tree.namespace(),
        is_rooted: tree.is_rooted,
        tree_leafset_bitmask: tree_leafset_bitmask.clone(),
        bipartitions: Vec::with_capacity(tree.len()),
        edges: Vec::with_capacity(tree.len()),
        by_edge: HashMap::with_capacity(tree.len()),
        by_split: HashMap::with_capacity(tree.len()),
    };
    for idx in tree.postorder.iter() {
        let bipartition = BipartitionBuilder::new(leafsets[idx].clone(), tree_leafset_bitmask.clone())
            .rooted(tree.is_rooted)
            .build()?;
        let pos = encoding.bipartitions.len();
        encoding
            .by_split
            .entry(bipartition.split_bitmask().clone())
            .or_insert(pos);
        encoding.by_edge.insert(*idx, pos);
        encoding.edges.push(*idx);
        encoding.bipartitions.push(bipartition);
    }
    debug!(
        "Encoded {} bipartitions, {} distinct splits.",
        encoding.len(),
        encoding.by_split.len()
    );
    Ok(encoding)
}

fn check_comparable(reference: &TreeBipartitions, comparison: &TreeBipartitions) -> Result<()> {
    ensure_same_namespace(reference.namespace, comparison.namespace)?;
    if reference.is_rooted != comparison.is_rooted {
        bail!("Cannot compare the splits of a rooted and an unrooted tree");
    }
    Ok(())
}

/// Counts the splits of `comparison` missing from `reference` (false positives) and the
/// splits of `reference` missing from `comparison` (false negatives).
///
/// Both trees are encoded on copies with the default [`EncodingOptions`].
pub fn false_positives_and_negatives(reference: &Tree, comparison: &Tree) -> Result<(usize, usize)> {
    let reference = encode_bipartitions(&mut reference.clone(), &EncodingOptions::default())?;
    let comparison = encode_bipartitions(&mut comparison.clone(), &EncodingOptions::default())?;
    check_comparable(&reference, &comparison)?;
    let reference_splits = reference.split_bitmasks();
    let comparison_splits = comparison.split_bitmasks();
    let false_positives = comparison_splits.difference(&reference_splits).count();
    let false_negatives = reference_splits.difference(&comparison_splits).count();
    Ok((false_positives, false_negatives))
}

/// Unweighted Robinson-Foulds distance: the number of splits found on only one of the trees.
///
/// # Example
/// ```
/// use phylostat::bipartition::symmetric_difference;
/// use phylostat::taxa::TaxonNamespace;
/// use phylostat::tree::from_newick;
/// let mut ns = TaxonNamespace::new();
/// let trees = from_newick("((A,B),(C,D),E);((A,C),(B,D),E);((B,A),E,(D,C));", &mut ns).unwrap();
/// assert_eq!(symmetric_difference(&trees[0], &trees[1]).unwrap(), 4);
/// assert_eq!(symmetric_difference(&trees[0], &trees[2]).unwrap(), 0);
/// ```
pub fn symmetric_difference(tree1: &Tree, tree2: &Tree) -> Result<usize> {
    let (false_positives, false_negatives) = false_positives_and_negatives(tree1, tree2)?;
    Ok(false_positives + false_negatives)
}
