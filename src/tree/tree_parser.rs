use std::fmt;
use std::result::Result as stdResult;

use anyhow::bail;
use log::info;
use pest::{
    error::{Error as PestError, ErrorVariant},
    iterators::Pair,
    Parser,
};
use pest_derive::Parser;

use crate::taxa::TaxonNamespace;
use crate::tree::{
    Node,
    NodeIdx::{self, Internal as Int},
    Tree,
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub struct ParsingError(pub(crate) Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParsingError {}

/// Parses all trees of a Newick string.
///
/// Leaf labels are resolved to taxa with [`TaxonNamespace::require_taxon`], so trees read
/// against the same namespace share taxa. Trees are unrooted unless they carry a `[&R]`
/// token.
///
/// # Example
/// ```
/// use phylostat::taxa::TaxonNamespace;
/// use phylostat::tree::from_newick;
/// let mut ns = TaxonNamespace::new();
/// let trees = from_newick("[&R] ((A:1,B:1):1,C:2);(A,(B,C));", &mut ns).unwrap();
/// assert_eq!(trees.len(), 2);
/// assert!(trees[0].is_rooted);
/// assert!(!trees[1].is_rooted);
/// assert_eq!(ns.len(), 3);
/// ```
pub fn from_newick(newick_string: &str, namespace: &mut TaxonNamespace) -> Result<Vec<Tree>> {
    info!("Parsing newick trees.");
    let newick_rule = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(mut pairs) => pairs.next(),
        Err(e) => bail!(ParsingError(Box::new(e))),
    };
    let mut trees = Vec::new();
    if let Some(newick_rule) = newick_rule {
        for tree_rule in newick_rule.into_inner() {
            match tree_rule.as_rule() {
                Rule::tree => {
                    let mut tree = Tree::new_empty(namespace.id());
                    if let Err(e) = tree.parse_tree_rule(tree_rule, namespace) {
                        bail!(ParsingError(e));
                    }
                    trees.push(tree);
                }
                Rule::EOI => (),
                _ => unreachable!(),
            }
        }
    }
    info!("Finished parsing {} newick trees successfully.", trees.len());
    Ok(trees)
}

impl Tree {
    fn parse_tree_rule(
        &mut self,
        tree_rule: Pair<Rule>,
        namespace: &mut TaxonNamespace,
    ) -> stdResult<(), Box<PestError<Rule>>> {
        for rule in tree_rule.into_inner() {
            match rule.as_rule() {
                Rule::rooting => self.is_rooted = rule.as_str().eq_ignore_ascii_case("[&R]"),
                Rule::internal => {
                    self.parse_internal_rule(rule, None, namespace)?;
                }
                Rule::leaf => {
                    self.parse_leaf_rule(rule, None, namespace)?;
                }
                _ => unreachable!(),
            }
        }
        if let Some(root) = self.nodes.first() {
            self.root = root.idx;
        }
        self.complete();
        Ok(())
    }

    fn parse_internal_rule(
        &mut self,
        internal_rule: Pair<Rule>,
        parent: Option<NodeIdx>,
        namespace: &mut TaxonNamespace,
    ) -> stdResult<NodeIdx, Box<PestError<Rule>>> {
        let pos = self.nodes.len();
        let idx = Int(pos);
        self.nodes.push(Node::new_empty_internal(pos, parent));
        let mut children = Vec::new();
        for rule in internal_rule.into_inner() {
            match rule.as_rule() {
                Rule::internal => children.push(self.parse_internal_rule(rule, Some(idx), namespace)?),
                Rule::leaf => children.push(self.parse_leaf_rule(rule, Some(idx), namespace)?),
                Rule::label => self.nodes[pos].id = parse_label_rule(rule),
                Rule::branch_length => self.nodes[pos].blen = Some(parse_branch_length_rule(rule)?),
                _ => unreachable!(),
            }
        }
        self.nodes[pos].children = children;
        Ok(idx)
    }

    fn parse_leaf_rule(
        &mut self,
        leaf_rule: Pair<Rule>,
        parent: Option<NodeIdx>,
        namespace: &mut TaxonNamespace,
    ) -> stdResult<NodeIdx, Box<PestError<Rule>>> {
        let span = leaf_rule.as_span();
        let mut id = String::new();
        let mut blen = None;
        for rule in leaf_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => id = parse_label_rule(rule),
                Rule::branch_length => blen = Some(parse_branch_length_rule(rule)?),
                _ => unreachable!(),
            }
        }
        let taxon = if id.is_empty() {
            None
        } else {
            match namespace.require_taxon(&id) {
                Ok(taxon) => Some(taxon),
                Err(e) => {
                    return Err(Box::new(PestError::new_from_span(
                        ErrorVariant::CustomError {
                            message: e.to_string(),
                        },
                        span,
                    )))
                }
            }
        };
        let pos = self.nodes.len();
        let node = Node::new_leaf(pos, parent, blen, id, taxon);
        let idx = node.idx;
        self.nodes.push(node);
        Ok(idx)
    }
}

fn parse_branch_length_rule(rule: Pair<Rule>) -> stdResult<f64, Box<PestError<Rule>>> {
    let span = rule.as_span();
    let text = rule.as_str().trim_start_matches(':').trim();
    text.parse::<f64>().map_err(|e| {
        Box::new(PestError::new_from_span(
            ErrorVariant::CustomError {
                message: format!("Invalid branch length {}: {}", text, e),
            },
            span,
        ))
    })
}

fn parse_label_rule(rule: Pair<Rule>) -> String {
    let label = rule.as_str();
    match label.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => label.to_string(),
    }
}
