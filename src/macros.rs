/// Parses the first tree of a Newick string, panicking on malformed input.
///
/// Without a namespace argument the tree gets a fresh namespace of its own.
#[macro_export]
macro_rules! tree {
    ($e:expr) => {{
        let mut namespace = $crate::taxa::TaxonNamespace::new();
        $crate::tree!($e, &mut namespace)
    }};
    ($e:expr, $ns:expr) => {{
        use $crate::tree::tree_parser::from_newick;
        from_newick($e, $ns).unwrap().remove(0)
    }};
}
