use log::{debug, info};

use crate::distance_matrix::PhylogeneticDistanceMatrix;
use crate::taxa::{ensure_same_namespace, Taxon, TaxonNamespace};
use crate::tree::nj_matrices::NJMat;
use crate::tree::tree_builder::{pool_distances, TreeBuilder};
use crate::tree::{NodeIdx, Tree};
use crate::Result;

/// Neighbor-Joining reconstruction from a [`PhylogeneticDistanceMatrix`].
///
/// Ties in the Q-criterion are broken deterministically: pairs are scanned in pool order and
/// the first minimum wins. The result is marked unrooted.
///
/// # Example
/// ```
/// use phylostat::distance_matrix::PhylogeneticDistanceMatrix;
/// use phylostat::taxa::TaxonNamespace;
/// use phylostat::tree::{from_newick, NJBuilder, TreeBuilder};
/// let mut ns = TaxonNamespace::new();
/// let tree = from_newick("((A:1,B:1):1,(C:1,D:1):1);", &mut ns).unwrap().remove(0);
/// let pdm = PhylogeneticDistanceMatrix::from_tree(&tree).unwrap();
/// let nj_tree = NJBuilder::new().build_tree(&pdm, &ns).unwrap();
/// assert_eq!(nj_tree.leaves().len(), 4);
/// assert!(!nj_tree.is_rooted);
/// ```
#[derive(Debug, Clone)]
pub struct NJBuilder {
    is_weighted_edge_distances: bool,
    taxa: Option<Vec<Taxon>>,
}

impl Default for NJBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder for NJBuilder {
    fn build_tree(
        &self,
        matrix: &PhylogeneticDistanceMatrix,
        namespace: &TaxonNamespace,
    ) -> Result<Tree> {
        ensure_same_namespace(namespace.id(), matrix.namespace())?;
        let taxa = match &self.taxa {
            Some(taxa) => taxa.clone(),
            None => matrix.taxa().to_vec(),
        };
        let distances = pool_distances(matrix, &taxa, self.is_weighted_edge_distances)?;
        let tree = Tree::from_taxa(&taxa, namespace)?;
        let nj_data = NJMat::new((0..taxa.len()).map(NodeIdx::Leaf).collect(), distances);
        Ok(Self::build_nj_tree_from_matrix(nj_data, tree))
    }
}

impl NJBuilder {
    pub fn new() -> Self {
        Self {
            is_weighted_edge_distances: true,
            taxa: None,
        }
    }

    /// Uses path edge counts instead of patristic distances when `false`.
    pub fn weighted_edge_distances(mut self, is_weighted_edge_distances: bool) -> Self {
        self.is_weighted_edge_distances = is_weighted_edge_distances;
        self
    }

    /// Restricts the reconstruction to a subset of the matrix taxa.
    pub fn taxa(mut self, taxa: &[Taxon]) -> Self {
        self.taxa = Some(taxa.to_vec());
        self
    }

    fn build_nj_tree_from_matrix(mut nj_data: NJMat, mut tree: Tree) -> Tree {
        let n = nj_data.len();
        info!("Building NJ tree for {} taxa.", n);
        for cur_idx in n..(2 * n).saturating_sub(1) {
            let (i, j) = nj_data.argmin_q();
            let (blen_i, blen_j) = nj_data.branch_lengths(i, j);
            debug!(
                "Joining {} and {} with branch lengths {} and {}.",
                nj_data.idx[i], nj_data.idx[j], blen_i, blen_j
            );
            tree.add_parent(cur_idx, &nj_data.idx[i], &nj_data.idx[j], blen_i, blen_j);
            nj_data = nj_data
                .add_merge_node(cur_idx, i, j)
                .remove_merged_nodes(i, j);
        }
        tree.is_rooted = false;
        tree.complete();
        info!("Finished building NJ tree.");
        tree
    }
}

#[cfg(test)]
mod private_tests {
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;

    use super::*;
    use crate::tree::{
        Node,
        NodeIdx::{Internal as I, Leaf as L},
    };

    fn is_unique<T: std::cmp::Eq + std::hash::Hash>(vec: &[T]) -> bool {
        let set: std::collections::HashSet<_> = vec.iter().collect();
        set.len() == vec.len()
    }

    fn setup_tree(labels: &[&str]) -> (TaxonNamespace, Tree) {
        let ns = TaxonNamespace::with_labels(labels);
        let taxa: Vec<Taxon> = ns.taxa().collect();
        let tree = Tree::from_taxa(&taxa, &ns).unwrap();
        (ns, tree)
    }

    #[test]
    fn nj_correct_web_example() {
        let nj_distances = NJMat::new(
            (0..4).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 4.0, 5.0, 10.0;
                4.0, 0.0, 7.0, 12.0;
                5.0, 7.0, 0.0, 9.0;
                10.0, 12.0, 9.0, 0.0],
        );
        let (ns, tree) = setup_tree(&["A0", "B1", "C2", "D3"]);
        let nj_tree = NJBuilder::build_nj_tree_from_matrix(nj_distances, tree);
        let taxon = |label: &str| ns.get_taxon(label);
        let nodes = vec![
            Node::new_leaf(0, Some(I(4)), Some(1.0), "A0".to_string(), taxon("A0")),
            Node::new_leaf(1, Some(I(4)), Some(3.0), "B1".to_string(), taxon("B1")),
            Node::new_leaf(2, Some(I(5)), Some(2.0), "C2".to_string(), taxon("C2")),
            Node::new_leaf(3, Some(I(5)), Some(7.0), "D3".to_string(), taxon("D3")),
            Node::new_internal(4, Some(I(6)), vec![L(0), L(1)], Some(1.0), "".to_string()),
            Node::new_internal(5, Some(I(6)), vec![L(2), L(3)], Some(1.0), "".to_string()),
            Node::new_internal(6, None, vec![I(4), I(5)], None, "".to_string()),
        ];
        assert_eq!(nj_tree.root, I(6));
        assert_eq!(nj_tree.nodes, nodes);
        assert!(!nj_tree.is_rooted);
    }

    #[test]
    fn nj_correct_wiki_example() {
        // https://en.wikipedia.org/wiki/Neighbor_joining
        let nj_distances = NJMat::new(
            (0..5).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 5.0, 9.0, 9.0, 8.0;
                5.0, 0.0, 10.0, 10.0, 9.0;
                9.0, 10.0, 0.0, 8.0, 7.0;
                9.0, 10.0, 8.0, 0.0, 3.0;
                8.0, 9.0, 7.0, 3.0, 0.0],
        );
        let (_, tree) = setup_tree(&["a", "b", "c", "d", "e"]);
        let tree = NJBuilder::build_nj_tree_from_matrix(nj_distances, tree);
        assert_eq!(tree.by_id("a").blen, Some(2.0));
        assert_eq!(tree.by_id("b").blen, Some(3.0));
        assert_eq!(tree.by_id("c").blen, Some(4.0));
        assert_eq!(tree.by_id("d").blen, Some(2.0));
        assert_eq!(tree.by_id("e").blen, Some(1.0));
        assert_eq!(tree.node(&I(5)).blen, Some(3.0));
        assert_eq!(tree.node(&I(6)).blen, Some(1.0));
        assert_eq!(tree.node(&I(7)).blen, Some(1.0));
        assert_eq!(tree.children(&I(6)), &[L(2), I(5)]);
        assert_eq!(tree.len(), 9);
        assert_eq!(tree.postorder.len(), 9);
        assert!(is_unique(&tree.postorder));
        assert_eq!(tree.preorder.len(), 9);
        assert!(is_unique(&tree.preorder));
    }

    #[test]
    fn nj_two_clades_split_evenly() {
        let nj_distances = NJMat::new(
            (0..4).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 2.0, 4.0, 4.0;
                2.0, 0.0, 4.0, 4.0;
                4.0, 4.0, 0.0, 2.0;
                4.0, 4.0, 2.0, 0.0],
        );
        let (_, tree) = setup_tree(&["A", "B", "C", "D"]);
        let tree = NJBuilder::build_nj_tree_from_matrix(nj_distances, tree);
        assert_eq!(tree.children(&I(4)), &[L(0), L(1)]);
        assert_eq!(tree.children(&I(5)), &[L(2), L(3)]);
        assert_eq!(tree.children(&tree.root), &[I(4), I(5)]);
        for node in tree.iter().filter(|n| n.idx != tree.root) {
            assert_relative_eq!(node.blen.unwrap(), 1.0);
        }
    }

    #[test]
    fn nj_q_ties_take_first_pair() {
        let nj_data = NJMat::new(
            (0..3).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 1.0, 1.0;
                1.0, 0.0, 1.0;
                1.0, 1.0, 0.0],
        );
        assert_eq!(nj_data.argmin_q(), (0, 1));
    }

    #[test]
    fn nj_merge_updates_xsub() {
        let nj_data = NJMat::new(
            (0..4).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 4.0, 5.0, 10.0;
                4.0, 0.0, 7.0, 12.0;
                5.0, 7.0, 0.0, 9.0;
                10.0, 12.0, 9.0, 0.0],
        );
        assert_eq!(nj_data.xsub, vec![19.0, 23.0, 21.0, 31.0]);
        let nj_data = nj_data.add_merge_node(4, 0, 1).remove_merged_nodes(0, 1);
        assert_eq!(nj_data.idx, vec![L(2), L(3), I(4)]);
        assert_eq!(nj_data.xsub, vec![13.0, 18.0, 13.0]);
        assert_eq!(nj_data.distances[(0, 2)], 4.0);
        assert_eq!(nj_data.distances[(1, 2)], 9.0);
    }

    #[test]
    fn nj_single_taxon() {
        let nj_data = NJMat::new(vec![L(0)], dmatrix![0.0]);
        let (_, tree) = setup_tree(&["A"]);
        let tree = NJBuilder::build_nj_tree_from_matrix(nj_data, tree);
        assert_eq!(tree.root, L(0));
        assert_eq!(tree.len(), 1);
    }
}
