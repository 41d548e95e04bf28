use log::{debug, info};
use nalgebra::DMatrix;

use crate::distance_matrix::PhylogeneticDistanceMatrix;
use crate::taxa::{ensure_same_namespace, Taxon, TaxonNamespace};
use crate::tree::tree_builder::{pool_distances, TreeBuilder};
use crate::tree::NodeIdx::{self, Internal as Int};
use crate::tree::Tree;
use crate::Result;

/// UPGMA reconstruction from a [`PhylogeneticDistanceMatrix`].
///
/// Produces a rooted tree whose leaves are all at the same distance from the root.
#[derive(Debug, Clone)]
pub struct UPGMABuilder {
    is_weighted_edge_distances: bool,
    taxa: Option<Vec<Taxon>>,
}

impl Default for UPGMABuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Active clusters with their sizes and heights above the tips, indexed by pool slot.
#[derive(Debug)]
struct UPGMAMat {
    idx: Vec<NodeIdx>,
    distances: DMatrix<f64>,
    cluster_sizes: Vec<usize>,
    heights: Vec<f64>,
}

impl UPGMAMat {
    fn new(idx: Vec<NodeIdx>, distances: DMatrix<f64>) -> Self {
        let n = idx.len();
        Self {
            idx,
            distances,
            cluster_sizes: vec![1; n],
            heights: vec![0.0; n],
        }
    }

    fn len(&self) -> usize {
        self.idx.len()
    }

    fn argmin(&self) -> (usize, usize) {
        let n = self.len();
        let mut arg_min = (0, 1);
        let mut val_min = f64::INFINITY;
        for i in 0..n {
            for j in (i + 1)..n {
                if self.distances[(i, j)] < val_min {
                    val_min = self.distances[(i, j)];
                    arg_min = (i, j);
                }
            }
        }
        arg_min
    }

    fn branch_lengths(&self, i: usize, j: usize) -> (f64, f64) {
        let half = self.distances[(i, j)] / 2.0;
        (half - self.heights[i], half - self.heights[j])
    }

    fn merge(mut self, idx_new: usize, i: usize, j: usize, blen_i: f64) -> Self {
        let n = self.len();
        let (size_i, size_j) = (self.cluster_sizes[i], self.cluster_sizes[j]);
        let size_new = size_i + size_j;
        self.distances = self.distances.insert_row(n, 0.0).insert_column(n, 0.0);
        for k in (0..n).filter(|&k| k != i && k != j) {
            let new_dist = (self.distances[(k, i)] * size_i as f64
                + self.distances[(k, j)] * size_j as f64)
                / size_new as f64;
            self.distances[(n, k)] = new_dist;
            self.distances[(k, n)] = new_dist;
        }
        self.idx.push(Int(idx_new));
        self.cluster_sizes.push(size_new);
        self.heights.push(self.heights[i] + blen_i);

        self.distances = self.distances.remove_columns_at(&[i, j]).remove_rows_at(&[i, j]);
        for pool in [j, i] {
            self.idx.remove(pool);
            self.cluster_sizes.remove(pool);
            self.heights.remove(pool);
        }
        self
    }
}

impl TreeBuilder for UPGMABuilder {
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
        let data = UPGMAMat::new((0..taxa.len()).map(NodeIdx::Leaf).collect(), distances);
        Ok(Self::build_upgma_tree_from_matrix(data, tree))
    }
}

impl UPGMABuilder {
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

    fn build_upgma_tree_from_matrix(mut data: UPGMAMat, mut tree: Tree) -> Tree {
        let n = data.len();
        info!("Building UPGMA tree for {} taxa.", n);
        for cur_idx in n..(2 * n).saturating_sub(1) {
            let (i, j) = data.argmin();
            let (blen_i, blen_j) = data.branch_lengths(i, j);
            debug!(
                "Joining {} and {} at height {}.",
                data.idx[i],
                data.idx[j],
                data.heights[i] + blen_i
            );
            tree.add_parent(cur_idx, &data.idx[i], &data.idx[j], blen_i, blen_j);
            data = data.merge(cur_idx, i, j, blen_i);
        }
        tree.is_rooted = true;
        tree.complete();
        info!("Finished building UPGMA tree.");
        tree
    }
}

#[cfg(test)]
mod private_tests {
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;

    use super::*;
    use crate::tree::NodeIdx::{Internal as I, Leaf as L};

    fn setup_tree(labels: &[&str]) -> Tree {
        let ns = TaxonNamespace::with_labels(labels);
        let taxa: Vec<Taxon> = ns.taxa().collect();
        Tree::from_taxa(&taxa, &ns).unwrap()
    }

    #[test]
    fn upgma_three_taxa() {
        let data = UPGMAMat::new(
            (0..3).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 2.0, 6.0;
                2.0, 0.0, 6.0;
                6.0, 6.0, 0.0],
        );
        let tree = UPGMABuilder::build_upgma_tree_from_matrix(data, setup_tree(&["A", "B", "C"]));
        assert!(tree.is_rooted);
        assert_eq!(tree.root, I(4));
        assert_eq!(tree.children(&I(3)), &[L(0), L(1)]);
        assert_eq!(tree.by_id("A").blen, Some(1.0));
        assert_eq!(tree.by_id("B").blen, Some(1.0));
        assert_eq!(tree.node(&I(3)).blen, Some(2.0));
        assert_eq!(tree.by_id("C").blen, Some(3.0));
        assert!(tree.is_ultrametric(1e-12));
    }

    #[test]
    fn upgma_weights_by_cluster_size() {
        let data = UPGMAMat::new(
            (0..4).map(NodeIdx::Leaf).collect(),
            dmatrix![
                0.0, 2.0, 4.0, 8.0;
                2.0, 0.0, 4.0, 8.0;
                4.0, 4.0, 0.0, 10.0;
                8.0, 8.0, 10.0, 0.0],
        );
        let tree =
            UPGMABuilder::build_upgma_tree_from_matrix(data, setup_tree(&["A", "B", "C", "D"]));
        // (8 * 2 + 10 * 1) / 3 between {A, B, C} and D
        assert_relative_eq!(tree.by_id("D").blen.unwrap(), 13.0 / 3.0);
        assert_relative_eq!(tree.node(&I(5)).blen.unwrap(), 13.0 / 3.0 - 2.0);
        assert!(tree.is_ultrametric(1e-12));
    }
}
