use std::fmt::{Display, Formatter, Result};

use nalgebra::DMatrix;

use crate::tree::NodeIdx::{self, Internal as Int};

pub(super) type Mat = DMatrix<f64>;

/// Pool of active NJ nodes: distances between them and the `xsub` sums, indexed by pool slot.
#[derive(Debug)]
pub(super) struct NJMat {
    pub(super) idx: Vec<NodeIdx>,
    pub(super) distances: Mat,
    pub(super) xsub: Vec<f64>,
}

impl Display for NJMat {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:?} {:?}\n {}", self.idx, self.xsub, self.distances)
    }
}

impl NJMat {
    pub(super) fn new(idx: Vec<NodeIdx>, distances: Mat) -> Self {
        debug_assert_eq!(idx.len(), distances.ncols());
        let xsub = distances.row_iter().map(|row| row.sum()).collect();
        Self {
            idx,
            distances,
            xsub,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.idx.len()
    }

    /// Pair minimising `(n - 2) * d_ij - xsub_i - xsub_j`, scanning `i < j` in pool order.
    /// The first minimum found wins.
    pub(super) fn argmin_q(&self) -> (usize, usize) {
        let n = self.len();
        debug_assert!(n > 1, "The pool should have more than 1 node.");
        let mut arg_min = (0, 1);
        let mut val_min = f64::INFINITY;
        for i in 0..n {
            for j in (i + 1)..n {
                let q = (n - 2) as f64 * self.distances[(i, j)] - self.xsub[i] - self.xsub[j];
                if q < val_min {
                    val_min = q;
                    arg_min = (i, j);
                }
            }
        }
        arg_min
    }

    pub(super) fn branch_lengths(&self, i: usize, j: usize) -> (f64, f64) {
        let n = self.len();
        let d = self.distances[(i, j)];
        if n == 2 {
            return (d / 2.0, d / 2.0);
        }
        let delta_f = 0.5 * d + (self.xsub[i] - self.xsub[j]) / (2 * (n - 2)) as f64;
        (delta_f, d - delta_f)
    }

    /// Appends the node joining pool slots `i` and `j` and updates the `xsub` of the others.
    pub(super) fn add_merge_node(mut self, idx_new: usize, i: usize, j: usize) -> Self {
        let n = self.len();
        let d_ij = self.distances[(i, j)];
        self.distances = self.distances.insert_row(n, 0.0).insert_column(n, 0.0);
        let mut xsub_new = 0.0;
        for k in (0..n).filter(|&k| k != i && k != j) {
            let new_dist = 0.5 * (self.distances[(k, i)] + self.distances[(k, j)] - d_ij);
            self.distances[(n, k)] = new_dist;
            self.distances[(k, n)] = new_dist;
            self.xsub[k] += new_dist - self.distances[(k, i)] - self.distances[(k, j)];
            xsub_new += new_dist;
        }
        self.xsub.push(xsub_new);
        self.idx.push(Int(idx_new));
        self
    }

    pub(super) fn remove_merged_nodes(mut self, i: usize, j: usize) -> Self {
        debug_assert!(i < j);
        self.distances = self.distances.remove_columns_at(&[i, j]).remove_rows_at(&[i, j]);
        for pool in [j, i] {
            self.idx.remove(pool);
            self.xsub.remove(pool);
        }
        self
    }
}
