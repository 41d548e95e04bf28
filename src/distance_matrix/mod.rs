use std::error::Error;
use std::fmt;

use anyhow::bail;
use hashbrown::HashMap;
use log::{info, warn};
use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::taxa::{ensure_same_namespace, NamespaceId, Taxon, TaxonNamespace};
use crate::tree::{NJBuilder, NodeIdx, Tree, TreeBuilder, UPGMABuilder};
use crate::Result;

mod data_table;
pub use data_table::{CsvOptions, CsvWriteOptions};

#[derive(Debug)]
pub struct UnmappedTaxonError {
    pub taxon: Taxon,
}

impl fmt::Display for UnmappedTaxonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not mapped in the distance matrix", self.taxon)
    }
}

impl Error for UnmappedTaxonError {}

/// Pairwise patristic distances, path edge counts and MRCAs between the taxa of a tree.
///
/// The matrix is a snapshot: later changes to the source tree are not reflected. Rows follow
/// the order in which the taxa were mapped, which is the post-order of the leaves for a
/// matrix compiled from a tree and the row order for one read from a table.
#[derive(Debug, Clone)]
pub struct PhylogeneticDistanceMatrix {
    namespace: NamespaceId,
    taxa: Vec<Taxon>,
    rows: HashMap<Taxon, usize>,
    distances: DMatrix<f64>,
    path_steps: Option<DMatrix<usize>>,
    mrca: Option<DMatrix<Option<NodeIdx>>>,
    pairs: Vec<(Taxon, Taxon)>,
    tree_length: Option<f64>,
    num_edges: Option<usize>,
}

impl PhylogeneticDistanceMatrix {
    /// Compiles all pairwise distances of a tree in one post-order pass.
    ///
    /// Every internal node joins the descendant paths of each pair of its children: those leaf
    /// pairs meet for the first time there, so the node is their MRCA. Unset edge lengths add
    /// nothing to distances but still count as one step. Leaves without a taxon are ignored.
    ///
    /// For an unrooted tree stored with a bifurcating root, paths crossing the root count the
    /// two root edges as two steps although they form a single edge of the unrooted tree.
    ///
    /// # Example
    /// ```
    /// use phylostat::distance_matrix::PhylogeneticDistanceMatrix;
    /// use phylostat::taxa::TaxonNamespace;
    /// use phylostat::tree::from_newick;
    /// let mut ns = TaxonNamespace::new();
    /// let tree = from_newick("[&R] ((A:1,B:2):1,C:4);", &mut ns).unwrap().remove(0);
    /// let pdm = PhylogeneticDistanceMatrix::from_tree(&tree).unwrap();
    /// let (a, c) = (ns.get_taxon("A").unwrap(), ns.get_taxon("C").unwrap());
    /// assert_eq!(pdm.patristic_distance(&a, &c, false).unwrap(), 6.0);
    /// assert_eq!(pdm.path_edge_count(&a, &c, false).unwrap(), 3.0);
    /// assert_eq!(pdm.mrca(&a, &c).unwrap(), tree.root);
    /// ```
    pub fn from_tree(tree: &Tree) -> Result<Self> {
        info!("Compiling the phylogenetic distance matrix of a tree.");
        if !tree.is_rooted && tree.children(&tree.root).len() == 2 {
            warn!(
                "Unrooted tree has a bifurcating root, path steps across the root count both root edges."
            );
        }

        let mut taxa = Vec::new();
        let mut rows = HashMap::new();
        for idx in tree.postorder.iter() {
            let node = tree.node(idx);
            if !node.is_leaf() {
                continue;
            }
            match node.taxon {
                Some(taxon) => {
                    if rows.insert(taxon, taxa.len()).is_some() {
                        bail!("{} appears on more than one leaf of the tree", taxon);
                    }
                    taxa.push(taxon);
                }
                None => warn!("Skipping {}, it has no taxon.", idx),
            }
        }

        let n = taxa.len();
        let mut distances = DMatrix::<f64>::zeros(n, n);
        let mut path_steps = DMatrix::<usize>::zeros(n, n);
        let mut mrca = DMatrix::<Option<NodeIdx>>::from_element(n, n, None);
        let mut tree_length = 0.0;
        let mut num_edges = 0;
        // (row, distance, steps) of the mapped leaves below a node, dropped once merged upwards
        let mut desc_paths: HashMap<NodeIdx, Vec<(usize, f64, usize)>> = HashMap::new();

        for idx in tree.postorder.iter() {
            let node = tree.node(idx);
            num_edges += 1;
            tree_length += node.blen.unwrap_or(0.0);

            if node.is_leaf() {
                let paths = match node.taxon.and_then(|taxon| rows.get(&taxon)) {
                    Some(&row) => {
                        mrca[(row, row)] = Some(*idx);
                        vec![(row, 0.0, 0)]
                    }
                    None => Vec::new(),
                };
                desc_paths.insert(*idx, paths);
                continue;
            }

            // Paths of each child extended by the child's own edge.
            let child_paths: Vec<Vec<(usize, f64, usize)>> = node
                .children
                .iter()
                .map(|child| {
                    let blen = tree.blen(child).unwrap_or(0.0);
                    desc_paths
                        .remove(child)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(row, dist, steps)| (row, dist + blen, steps + 1))
                        .collect()
                })
                .collect();

            for (ci, paths_i) in child_paths.iter().enumerate() {
                for paths_j in child_paths.iter().skip(ci + 1) {
                    for &(row_a, dist_a, steps_a) in paths_i {
                        for &(row_b, dist_b, steps_b) in paths_j {
                            let cell = (row_a.min(row_b), row_a.max(row_b));
                            distances[cell] = dist_a + dist_b;
                            path_steps[cell] = steps_a + steps_b;
                            mrca[cell] = Some(*idx);
                        }
                    }
                }
            }
            desc_paths.insert(*idx, child_paths.into_iter().flatten().collect());
        }

        distances.fill_lower_triangle_with_upper_triangle();
        path_steps.fill_lower_triangle_with_upper_triangle();
        mrca.fill_lower_triangle_with_upper_triangle();

        info!(
            "Compiled distances between {} taxa over {} edges with total length {}.",
            n, num_edges, tree_length
        );
        Ok(Self {
            namespace: tree.namespace(),
            pairs: distinct_pairs(&taxa),
            taxa,
            rows,
            distances,
            path_steps: Some(path_steps),
            mrca: Some(mrca),
            tree_length: Some(tree_length),
            num_edges: Some(num_edges),
        })
    }

    /// Matrix over `taxa` from a symmetric table of distances, without steps or MRCAs.
    pub(crate) fn from_distances(
        namespace: &TaxonNamespace,
        taxa: Vec<Taxon>,
        distances: DMatrix<f64>,
    ) -> Result<Self> {
        debug_assert_eq!(taxa.len(), distances.nrows());
        let mut rows = HashMap::new();
        for (row, taxon) in taxa.iter().enumerate() {
            ensure_same_namespace(namespace.id(), taxon.namespace())?;
            if rows.insert(*taxon, row).is_some() {
                bail!("{} appears in more than one row of the table", taxon);
            }
        }
        Ok(Self {
            namespace: namespace.id(),
            pairs: distinct_pairs(&taxa),
            taxa,
            rows,
            distances,
            path_steps: None,
            mrca: None,
            tree_length: None,
            num_edges: None,
        })
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    /// Mapped taxa in row order.
    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn contains(&self, taxon: &Taxon) -> bool {
        self.rows.contains_key(taxon)
    }

    /// Sum of the edge lengths of the source tree, `None` for a matrix read from a table.
    pub fn tree_length(&self) -> Option<f64> {
        self.tree_length
    }

    /// Number of edges of the source tree, `None` for a matrix read from a table.
    pub fn num_edges(&self) -> Option<usize> {
        self.num_edges
    }

    /// Unordered pairs of distinct mapped taxa.
    pub fn distinct_taxon_pairs(&self) -> &[(Taxon, Taxon)] {
        &self.pairs
    }

    fn row(&self, taxon: &Taxon) -> Result<usize> {
        match self.rows.get(taxon) {
            Some(&row) => Ok(row),
            None => bail!(UnmappedTaxonError { taxon: *taxon }),
        }
    }

    /// Sum of edge lengths on the path between two taxa, optionally divided by the tree length.
    pub fn patristic_distance(
        &self,
        taxon1: &Taxon,
        taxon2: &Taxon,
        is_normalize_by_tree_size: bool,
    ) -> Result<f64> {
        if taxon1 == taxon2 {
            return Ok(0.0);
        }
        let d = self.distances[(self.row(taxon1)?, self.row(taxon2)?)];
        if is_normalize_by_tree_size {
            match self.tree_length {
                Some(tree_length) => Ok(d / tree_length),
                None => bail!("Cannot normalise by tree length, the matrix has no source tree"),
            }
        } else {
            Ok(d)
        }
    }

    /// Number of edges on the path between two taxa, optionally divided by the edge count.
    pub fn path_edge_count(
        &self,
        taxon1: &Taxon,
        taxon2: &Taxon,
        is_normalize_by_tree_size: bool,
    ) -> Result<f64> {
        if taxon1 == taxon2 {
            return Ok(0.0);
        }
        let (Some(path_steps), Some(num_edges)) = (&self.path_steps, self.num_edges) else {
            bail!("Path edge counts are only available for a matrix compiled from a tree");
        };
        let steps = path_steps[(self.row(taxon1)?, self.row(taxon2)?)] as f64;
        if is_normalize_by_tree_size {
            Ok(steps / num_edges as f64)
        } else {
            Ok(steps)
        }
    }

    /// Patristic distance if `is_weighted_edge_distances`, path edge count otherwise.
    pub fn distance(
        &self,
        taxon1: &Taxon,
        taxon2: &Taxon,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
    ) -> Result<f64> {
        if is_weighted_edge_distances {
            self.patristic_distance(taxon1, taxon2, is_normalize_by_tree_size)
        } else {
            self.path_edge_count(taxon1, taxon2, is_normalize_by_tree_size)
        }
    }

    /// Node of the source tree that is the most recent common ancestor of two taxa.
    pub fn mrca(&self, taxon1: &Taxon, taxon2: &Taxon) -> Result<NodeIdx> {
        let Some(mrca) = &self.mrca else {
            bail!("MRCAs are only available for a matrix compiled from a tree");
        };
        match mrca[(self.row(taxon1)?, self.row(taxon2)?)] {
            Some(node_idx) => Ok(node_idx),
            None => bail!("No common ancestor recorded for {} and {}", taxon1, taxon2),
        }
    }

    /// Distances between all distinct taxon pairs, in the order of [`Self::distinct_taxon_pairs`].
    pub fn distances(
        &self,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
    ) -> Result<Vec<f64>> {
        self.pairs
            .iter()
            .map(|(t1, t2)| {
                self.distance(t1, t2, is_weighted_edge_distances, is_normalize_by_tree_size)
            })
            .collect()
    }

    pub fn sum_of_distances(
        &self,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
    ) -> Result<f64> {
        Ok(self
            .distances(is_weighted_edge_distances, is_normalize_by_tree_size)?
            .iter()
            .sum())
    }

    /// The pair of taxa furthest apart, the first one found on ties.
    pub fn max_pairwise_distance_taxa(
        &self,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
    ) -> Result<Option<(Taxon, Taxon)>> {
        let mut max_pair = None;
        let mut max_dist = f64::NEG_INFINITY;
        for (t1, t2) in self.pairs.iter() {
            let d = self.distance(t1, t2, is_weighted_edge_distances, is_normalize_by_tree_size)?;
            if d > max_dist {
                max_dist = d;
                max_pair = Some((*t1, *t2));
            }
        }
        Ok(max_pair)
    }

    /// Randomly reassigns the taxa to the rows of the matrix.
    ///
    /// The permutation comes from [`SliceRandom::shuffle`] over all mapped taxa, so every
    /// bijection is equally likely. Distances, steps and MRCAs move together with their rows.
    pub fn shuffle_taxa<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.taxa.shuffle(rng);
        for (row, taxon) in self.taxa.iter().enumerate() {
            self.rows.insert(*taxon, row);
        }
    }

    /// Neighbor-Joining tree over all mapped taxa.
    pub fn nj_tree(
        &self,
        namespace: &TaxonNamespace,
        is_weighted_edge_distances: bool,
    ) -> Result<Tree> {
        NJBuilder::new()
            .weighted_edge_distances(is_weighted_edge_distances)
            .build_tree(self, namespace)
    }

    /// UPGMA tree over all mapped taxa.
    pub fn upgma_tree(
        &self,
        namespace: &TaxonNamespace,
        is_weighted_edge_distances: bool,
    ) -> Result<Tree> {
        UPGMABuilder::new()
            .weighted_edge_distances(is_weighted_edge_distances)
            .build_tree(self, namespace)
    }
}

fn distinct_pairs(taxa: &[Taxon]) -> Vec<(Taxon, Taxon)> {
    let mut pairs = Vec::with_capacity(taxa.len() * taxa.len().saturating_sub(1) / 2);
    for (i, t1) in taxa.iter().enumerate() {
        for t2 in taxa.iter().skip(i + 1) {
            pairs.push((*t1, *t2));
        }
    }
    pairs
}
