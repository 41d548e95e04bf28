use std::fmt::{Debug, Display};

use approx::relative_eq;

use crate::taxa::Taxon;
use crate::tree::NodeIdx::{self, Internal as Int, Leaf};

#[derive(Clone)]
pub struct Node {
    pub idx: NodeIdx,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    /// Length of the edge subtending this node, `None` if unset.
    pub blen: Option<f64>,
    pub id: String,
    pub taxon: Option<Taxon>,
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.idx)
        } else {
            write!(f, "{} with id {}", self.idx, self.id)
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            writeln!(
                f,
                "{:?}:{:?}, parent: {:?}, children: {:?}",
                self.idx, self.blen, self.parent, self.children,
            )
        } else {
            writeln!(
                f,
                "({}) {:?}:{:?}, parent: {:?}, children: {:?}",
                self.id, self.idx, self.blen, self.parent, self.children,
            )
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let blen_eq = match (self.blen, other.blen) {
            (Some(a), Some(b)) => relative_eq!(a, b),
            (None, None) => true,
            _ => false,
        };
        (self.idx == other.idx)
            && (self.parent == other.parent)
            && (self.children.iter().min() == other.children.iter().min())
            && (self.children.iter().max() == other.children.iter().max())
            && (self.taxon == other.taxon)
            && blen_eq
    }
}

impl Node {
    pub(crate) fn new_leaf(
        idx: usize,
        parent: Option<NodeIdx>,
        blen: Option<f64>,
        id: String,
        taxon: Option<Taxon>,
    ) -> Self {
        Self {
            idx: Leaf(idx),
            parent,
            children: Vec::new(),
            blen,
            id,
            taxon,
        }
    }

    pub(crate) fn new_internal(
        idx: usize,
        parent: Option<NodeIdx>,
        children: Vec<NodeIdx>,
        blen: Option<f64>,
        id: String,
    ) -> Self {
        Self {
            idx: Int(idx),
            parent,
            children,
            blen,
            id,
            taxon: None,
        }
    }

    pub(crate) fn new_empty_internal(node_idx: usize, parent: Option<NodeIdx>) -> Self {
        Self::new_internal(node_idx, parent, Vec::new(), None, "".to_string())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn add_parent(&mut self, parent_idx: &NodeIdx, blen: f64) {
        debug_assert!(matches!(parent_idx, Int(_)));
        self.parent = Some(*parent_idx);
        self.blen = Some(blen);
    }
}
