use std::fmt::{self, Display, Write as _};

use anyhow::bail;
use hashbrown::HashSet;
use log::{debug, info};
use rand::Rng;

use crate::taxa::{ensure_same_namespace, NamespaceId, Taxon, TaxonNamespace};
use crate::Result;
use NodeIdx::{Internal as Int, Leaf};

pub mod nj_builder;
mod nj_matrices;
pub mod tree_builder;
mod tree_node;
pub mod tree_parser;
pub mod upgma_builder;

pub use nj_builder::NJBuilder;
pub use tree_builder::TreeBuilder;
pub use tree_node::Node;
pub use tree_parser::from_newick;
pub use upgma_builder::UPGMABuilder;

#[derive(PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl From<&NodeIdx> for usize {
    fn from(node_idx: &NodeIdx) -> usize {
        match node_idx {
            Int(idx) | Leaf(idx) => *idx,
        }
    }
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        usize::from(&node_idx)
    }
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int(idx) => write!(f, "internal node {}", idx),
            Leaf(idx) => write!(f, "leaf node {}", idx),
        }
    }
}

impl fmt::Debug for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int(idx) => write!(f, "Int({})", idx),
            Leaf(idx) => write!(f, "Leaf({})", idx),
        }
    }
}

/// Arena tree over the taxa of one [`TaxonNamespace`].
///
/// Node `k` of the arena is addressed by `Leaf(k)` or `Internal(k)` depending on whether it
/// has children. Every node owns the edge to its parent, the root included, so a tree with
/// `n` nodes has `n` edges. Topology edits renumber the arena in pre-order.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: NodeIdx,
    pub(crate) nodes: Vec<Node>,
    pub postorder: Vec<NodeIdx>,
    pub preorder: Vec<NodeIdx>,
    pub is_rooted: bool,
    pub(crate) namespace: NamespaceId,
}

impl Tree {
    /// Creates one detached leaf per taxon, `taxa[i]` at `Leaf(i)`.
    ///
    /// Agglomerative builders join the leaves with [`Tree::add_parent`] and finish with
    /// [`Tree::complete`]. A single-taxon tree is complete right away.
    pub fn from_taxa(taxa: &[Taxon], namespace: &TaxonNamespace) -> Result<Self> {
        if taxa.is_empty() {
            bail!("Cannot build a tree without taxa");
        }
        let mut nodes = Vec::with_capacity(2 * taxa.len() - 1);
        for (i, taxon) in taxa.iter().enumerate() {
            ensure_same_namespace(namespace.id(), taxon.namespace())?;
            nodes.push(Node::new_leaf(
                i,
                None,
                None,
                namespace.label(taxon).to_string(),
                Some(*taxon),
            ));
        }
        let mut tree = Self {
            root: Leaf(0),
            nodes,
            postorder: Vec::new(),
            preorder: Vec::new(),
            is_rooted: false,
            namespace: namespace.id(),
        };
        if taxa.len() == 1 {
            tree.complete();
        }
        Ok(tree)
    }

    pub(crate) fn new_empty(namespace: NamespaceId) -> Self {
        Self {
            root: Int(0),
            nodes: Vec::new(),
            postorder: Vec::new(),
            preorder: Vec::new(),
            is_rooted: false,
            namespace,
        }
    }

    /// Joins two subtrees under a new internal node, which becomes the current root.
    pub fn add_parent(
        &mut self,
        parent_idx: usize,
        idx_i: &NodeIdx,
        idx_j: &NodeIdx,
        blen_i: f64,
        blen_j: f64,
    ) {
        debug_assert_eq!(parent_idx, self.nodes.len());
        self.nodes.push(Node::new_internal(
            parent_idx,
            None,
            vec![*idx_i, *idx_j],
            None,
            String::new(),
        ));
        self.node_mut(idx_i).add_parent(&Int(parent_idx), blen_i);
        self.node_mut(idx_j).add_parent(&Int(parent_idx), blen_j);
        self.root = Int(parent_idx);
    }

    /// Recomputes the traversal orders from the current root.
    pub fn complete(&mut self) {
        self.compute_postorder();
        self.preorder = self.preorder_subroot(&self.root);
    }

    fn compute_postorder(&mut self) {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.children(&idx).iter());
        }
        order.reverse();
        self.postorder = order;
    }

    pub fn preorder_subroot(&self, subroot_idx: &NodeIdx) -> Vec<NodeIdx> {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![*subroot_idx];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.children(&idx).iter().rev());
        }
        order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    pub fn node(&self, node_idx: &NodeIdx) -> &Node {
        &self.nodes[usize::from(node_idx)]
    }

    pub(crate) fn node_mut(&mut self, node_idx: &NodeIdx) -> &mut Node {
        &mut self.nodes[usize::from(node_idx)]
    }

    pub fn children(&self, node_idx: &NodeIdx) -> &[NodeIdx] {
        &self.node(node_idx).children
    }

    pub fn parent(&self, node_idx: &NodeIdx) -> Option<&NodeIdx> {
        self.node(node_idx).parent.as_ref()
    }

    pub fn blen(&self, node_idx: &NodeIdx) -> Option<f64> {
        self.node(node_idx).blen
    }

    pub fn set_blen(&mut self, node_idx: &NodeIdx, blen: Option<f64>) {
        self.node_mut(node_idx).blen = blen;
    }

    pub fn node_id(&self, node_idx: &NodeIdx) -> &str {
        &self.node(node_idx).id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|node| node.is_leaf()).collect()
    }

    pub fn internals(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|node| !node.is_leaf()).collect()
    }

    pub fn leaf_ids(&self) -> Vec<String> {
        self.leaves().iter().map(|node| node.id.clone()).collect()
    }

    /// Taxa on the leaves, in post-order.
    pub fn leaf_taxa(&self) -> Vec<Taxon> {
        self.postorder
            .iter()
            .filter_map(|idx| self.node(idx).taxon)
            .collect()
    }

    pub fn try_idx(&self, id: &str) -> Result<NodeIdx> {
        match self.nodes.iter().find(|node| node.id == id) {
            Some(node) => Ok(node.idx),
            None => bail!("No node with id {} found in the tree", id),
        }
    }

    /// # Panics
    /// Panics if no node carries the given id.
    pub fn idx(&self, id: &str) -> NodeIdx {
        self.by_id(id).idx
    }

    /// # Panics
    /// Panics if no node carries the given id.
    pub fn by_id(&self, id: &str) -> &Node {
        match self.nodes.iter().find(|node| node.id == id) {
            Some(node) => node,
            None => panic!("No node with id {} found in the tree", id),
        }
    }

    pub fn node_by_taxon(&self, taxon: &Taxon) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .find(|node| node.taxon.as_ref() == Some(taxon))
            .map(|node| node.idx)
    }

    /// Sum of all set edge lengths, the root edge included.
    pub fn length(&self) -> f64 {
        self.nodes.iter().filter_map(|node| node.blen).sum()
    }

    pub fn num_edges(&self) -> usize {
        self.nodes.len()
    }

    /// Ancestors of a node, from its parent up to the root.
    pub fn ancestors(&self, node_idx: &NodeIdx) -> Vec<NodeIdx> {
        let mut ancestors = Vec::new();
        let mut cur = node_idx;
        while let Some(parent) = self.parent(cur) {
            ancestors.push(*parent);
            cur = parent;
        }
        ancestors
    }

    pub fn is_subtree(&self, query: &NodeIdx, node_idx: &NodeIdx) -> bool {
        query == node_idx || self.ancestors(query).contains(node_idx)
    }

    pub fn mrca(&self, node_a: &NodeIdx, node_b: &NodeIdx) -> NodeIdx {
        let lineage: HashSet<NodeIdx> = std::iter::once(*node_a)
            .chain(self.ancestors(node_a))
            .collect();
        std::iter::once(*node_b)
            .chain(self.ancestors(node_b))
            .find(|idx| lineage.contains(idx))
            .unwrap_or(self.root)
    }

    /// Sum of the edge lengths between a node and the root, unset lengths counting as 0.
    pub fn distance_from_root(&self, node_idx: &NodeIdx) -> f64 {
        let mut dist = 0.0;
        let mut cur = node_idx;
        while let Some(parent) = self.parent(cur) {
            dist += self.blen(cur).unwrap_or(0.0);
            cur = parent;
        }
        dist
    }

    /// Age of every node above its deepest descendant leaf, indexed by arena position.
    pub fn node_ages(&self) -> Vec<f64> {
        let mut ages = vec![0.0; self.nodes.len()];
        for idx in self.postorder.iter() {
            ages[usize::from(idx)] = self
                .children(idx)
                .iter()
                .map(|child| ages[usize::from(child)] + self.blen(child).unwrap_or(0.0))
                .fold(0.0, f64::max);
        }
        ages
    }

    /// Checks that all leaves lie within `epsilon` of the same distance from the root.
    pub fn is_ultrametric(&self, epsilon: f64) -> bool {
        let depths: Vec<f64> = self
            .leaves()
            .iter()
            .map(|node| self.distance_from_root(&node.idx))
            .collect();
        let Some(first) = depths.first() else {
            return true;
        };
        depths.iter().all(|depth| (depth - first).abs() <= epsilon)
    }

    /// Removes every node with exactly one child.
    ///
    /// The length of each removed edge is added to the edge of the remaining child. A root
    /// with a single child hands the root over to that child.
    pub fn suppress_unifurcations(&mut self) {
        let mut suppressed = 0;
        for idx in self.postorder.clone() {
            if self.children(&idx).len() != 1 {
                continue;
            }
            let child = self.children(&idx)[0];
            if let Some(blen) = self.blen(&idx) {
                let child_node = self.node_mut(&child);
                child_node.blen = Some(child_node.blen.unwrap_or(0.0) + blen);
            }
            match self.node(&idx).parent {
                Some(parent) => {
                    let siblings = &mut self.node_mut(&parent).children;
                    if let Some(pos) = siblings.iter().position(|c| *c == idx) {
                        siblings[pos] = child;
                    }
                    self.node_mut(&child).parent = Some(parent);
                }
                None => {
                    self.node_mut(&child).parent = None;
                    self.root = child;
                }
            }
            let node = self.node_mut(&idx);
            node.children.clear();
            node.parent = None;
            suppressed += 1;
        }
        if suppressed > 0 {
            debug!("Suppressed {} unifurcations.", suppressed);
        }
        self.compact();
    }

    /// Turns a bifurcating root into a multifurcation.
    ///
    /// The root child with fewer than two children is kept; the other one is removed and its
    /// children are attached to the root, its edge length added to the kept sibling's edge.
    /// Marks the tree unrooted and returns whether anything was collapsed. Nothing is collapsed
    /// unless one root child has two or more children, so a root child with a single child
    /// blocks the collapse until unifurcations are suppressed.
    pub fn collapse_basal_bifurcation(&mut self) -> bool {
        let root = self.root;
        let (keep, delete) = match self.children(&root) {
            [first, second] if self.children(second).len() >= 2 => (*first, *second),
            [first, second] if self.children(first).len() >= 2 => (*second, *first),
            _ => return false,
        };
        if let Some(blen) = self.blen(&delete) {
            let kept = self.node_mut(&keep);
            kept.blen = Some(kept.blen.unwrap_or(0.0) + blen);
        }
        let grandchildren = std::mem::take(&mut self.node_mut(&delete).children);
        for grandchild in grandchildren.iter() {
            self.node_mut(grandchild).parent = Some(root);
        }
        let root_node = self.node_mut(&root);
        root_node.children.retain(|c| *c != delete);
        root_node.children.extend(grandchildren);
        self.node_mut(&delete).parent = None;
        self.is_rooted = false;
        self.compact();
        true
    }

    /// Moves the root to an internal node by reversing the path to the old root.
    ///
    /// Edge lengths stay with the edges they measure. The old root is suppressed if it is
    /// left with a single child.
    pub fn reroot_at_node(&mut self, new_root: &NodeIdx) -> Result<()> {
        if self.node(new_root).is_leaf() {
            bail!("Cannot root the tree at {}, it has no children", new_root);
        }
        if *new_root == self.root {
            return Ok(());
        }
        info!("Rerooting the tree at {}.", new_root);
        let old_root_blen = self.blen(&self.root);
        let path: Vec<NodeIdx> = std::iter::once(*new_root)
            .chain(self.ancestors(new_root))
            .collect();
        let blens: Vec<Option<f64>> = path.iter().map(|idx| self.blen(idx)).collect();
        for (k, pair) in path.windows(2).enumerate() {
            let (child, parent) = (pair[0], pair[1]);
            self.node_mut(&parent).children.retain(|c| *c != child);
            self.node_mut(&child).children.push(parent);
            let parent_node = self.node_mut(&parent);
            parent_node.parent = Some(child);
            parent_node.blen = blens[k];
        }
        let root_node = self.node_mut(new_root);
        root_node.parent = None;
        root_node.blen = old_root_blen;
        self.root = *new_root;
        self.complete();
        self.suppress_unifurcations();
        Ok(())
    }

    /// Reverses the order of children at every node.
    pub fn rotate(&mut self) {
        for node in self.nodes.iter_mut() {
            node.children.reverse();
        }
        self.complete();
    }

    /// Renumbers the nodes reachable from the root in pre-order and drops detached ones.
    fn compact(&mut self) {
        let order = self.preorder_subroot(&self.root);
        let mut new_idx: Vec<Option<NodeIdx>> = vec![None; self.nodes.len()];
        for (pos, old) in order.iter().enumerate() {
            new_idx[usize::from(old)] = Some(if self.children(old).is_empty() {
                Leaf(pos)
            } else {
                Int(pos)
            });
        }
        let remap = |idx: &NodeIdx| new_idx[usize::from(idx)];
        let nodes: Vec<Node> = order
            .iter()
            .filter_map(|old| {
                let node = self.node(old);
                Some(Node {
                    idx: remap(old)?,
                    parent: node.parent.as_ref().and_then(remap),
                    children: node.children.iter().filter_map(remap).collect(),
                    blen: node.blen,
                    id: node.id.clone(),
                    taxon: node.taxon,
                })
            })
            .collect();
        self.nodes = nodes;
        if let Some(root) = self.nodes.first() {
            self.root = root.idx;
        }
        self.complete();
    }

    /// Writes the tree in Newick format, prefixed with its rooting token.
    pub fn to_newick(&self) -> String {
        let mut newick = String::from(if self.is_rooted { "[&R] " } else { "[&U] " });
        self.subtree_to_newick(&self.root, &mut newick);
        newick.push(';');
        newick
    }

    fn subtree_to_newick(&self, node_idx: &NodeIdx, newick: &mut String) {
        let node = self.node(node_idx);
        if !node.children.is_empty() {
            newick.push('(');
            for (i, child) in node.children.iter().enumerate() {
                if i > 0 {
                    newick.push(',');
                }
                self.subtree_to_newick(child, newick);
            }
            newick.push(')');
        }
        newick.push_str(&quote_label(&node.id));
        if let Some(blen) = node.blen {
            let _ = write!(newick, ":{}", blen);
        }
    }
}

/// Random rooted binary tree over `taxa`.
///
/// Joins two subtrees drawn uniformly from the pool until one is left, every edge getting a
/// length drawn uniformly from `[0, 1)`.
pub fn random_tree<R: Rng + ?Sized>(
    taxa: &[Taxon],
    namespace: &TaxonNamespace,
    rng: &mut R,
) -> Result<Tree> {
    let mut tree = Tree::from_taxa(taxa, namespace)?;
    let mut pool: Vec<NodeIdx> = (0..taxa.len()).map(Leaf).collect();
    while pool.len() > 1 {
        let idx_i = pool.swap_remove(rng.gen_range(0..pool.len()));
        let idx_j = pool.swap_remove(rng.gen_range(0..pool.len()));
        let parent_idx = tree.len();
        tree.add_parent(parent_idx, &idx_i, &idx_j, rng.gen(), rng.gen());
        pool.push(Int(parent_idx));
    }
    tree.is_rooted = true;
    tree.complete();
    Ok(tree)
}

fn quote_label(label: &str) -> String {
    const SPECIAL: &[char] = &[' ', '\t', '\n', '(', ')', '[', ']', '\'', ':', ';', ','];
    if label.contains(SPECIAL) {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_newick())
    }
}
