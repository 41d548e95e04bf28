use nalgebra::DMatrix;

use crate::distance_matrix::PhylogeneticDistanceMatrix;
use crate::taxa::{Taxon, TaxonNamespace};
use crate::tree::Tree;
use crate::Result;

pub trait TreeBuilder {
    fn build_tree(
        &self,
        matrix: &PhylogeneticDistanceMatrix,
        namespace: &TaxonNamespace,
    ) -> Result<Tree>;
}

/// Dense pairwise distances between `taxa`, in the given order.
pub(super) fn pool_distances(
    matrix: &PhylogeneticDistanceMatrix,
    taxa: &[Taxon],
    is_weighted_edge_distances: bool,
) -> Result<DMatrix<f64>> {
    let n = taxa.len();
    let mut distances = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = matrix.distance(&taxa[i], &taxa[j], is_weighted_edge_distances, false)?;
            distances[(i, j)] = d;
            distances[(j, i)] = d;
        }
    }
    Ok(distances)
}
