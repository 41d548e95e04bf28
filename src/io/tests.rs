use std::fs::read_to_string;
use std::path::PathBuf;

use approx::assert_relative_eq;
use rstest::*;
use tempfile::tempdir;

use crate::distance_matrix::{CsvOptions, CsvWriteOptions, PhylogeneticDistanceMatrix};
use crate::io::{
    read_distance_matrix_csv, read_newick_from_file, write_distance_matrix_csv,
    write_newick_to_file, DataError,
};
use crate::taxa::TaxonNamespace;
use crate::tree;

#[test]
fn reading_correct_newick() {
    let mut ns = TaxonNamespace::new();
    let trees = read_newick_from_file(&PathBuf::from("./data/tree.newick"), &mut ns).unwrap();
    assert_eq!(trees.len(), 1);
    assert!(trees[0].is_rooted);
    assert_eq!(trees[0].leaves().len(), 5);
    assert_eq!(ns.len(), 5);
}

#[test]
fn reading_multiple_trees_shares_taxa() {
    let mut ns = TaxonNamespace::new();
    let trees = read_newick_from_file(&PathBuf::from("./data/trees.newick"), &mut ns).unwrap();
    assert_eq!(trees.len(), 3);
    assert_eq!(ns.len(), 5);
    for tree in trees.iter() {
        assert!(!tree.is_rooted);
        assert_eq!(tree.namespace(), ns.id());
    }
}

#[test]
fn reading_nonexistent_newick() {
    let mut ns = TaxonNamespace::new();
    assert!(read_newick_from_file(&PathBuf::from("./data/nonexistent.newick"), &mut ns).is_err());
}

#[test]
fn test_write_newick_to_file() {
    let mut ns = TaxonNamespace::new();
    let trees = vec![
        tree!("[&R] ((A:1,B:2):1,C:4);", &mut ns),
        tree!("((A:1,C:2):1,B:4);", &mut ns),
    ];
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("output.newick");
    write_newick_to_file(&trees, &output_path).unwrap();
    let file_content = read_to_string(&output_path).unwrap();
    assert_eq!(
        file_content,
        "[&R] ((A:1,B:2):1,C:4);\n[&U] ((A:1,C:2):1,B:4);\n"
    );

    let mut ns2 = TaxonNamespace::new();
    let reread = read_newick_from_file(&output_path, &mut ns2).unwrap();
    assert_eq!(reread.len(), 2);
    assert_eq!(reread[1].to_newick(), trees[1].to_newick());
}

#[test]
fn newick_file_is_not_overwritten() {
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("output.newick");
    std::fs::write(&output_path, "keep me").unwrap();
    let result = write_newick_to_file(&[tree!("(A,B);")], &output_path);
    assert!(result.unwrap_err().downcast_ref::<DataError>().is_some());
    assert_eq!(read_to_string(&output_path).unwrap(), "keep me");
}

#[test]
fn reading_distance_table() {
    let mut ns = TaxonNamespace::new();
    let pdm = read_distance_matrix_csv(
        &PathBuf::from("./data/distances.csv"),
        &mut ns,
        &CsvOptions::default(),
    )
    .unwrap();
    assert_eq!(pdm.len(), 4);
    let taxon = |label: &str| ns.get_taxon(label).unwrap();
    assert_eq!(pdm.patristic_distance(&taxon("A"), &taxon("B"), false).unwrap(), 2.0);
    assert_eq!(pdm.patristic_distance(&taxon("D"), &taxon("A"), false).unwrap(), 4.0);
    assert!(pdm.tree_length().is_none());
    assert!(pdm.mrca(&taxon("A"), &taxon("B")).is_err());
}

#[rstest]
#[case::garbage_value("./data/distances_garbage.csv", "Invalid distance 'x'")]
#[case::missing_file("./data/distances_nonexistent.csv", "No such file")]
fn reading_incorrect_distance_table(#[case] input: &str, #[case] exp_error: &str) {
    let mut ns = TaxonNamespace::new();
    let res = read_distance_matrix_csv(&PathBuf::from(input), &mut ns, &CsvOptions::default());
    assert!(res.is_err());
    assert!(res.unwrap_err().to_string().contains(exp_error));
}

#[test]
fn distance_table_round_trip() {
    let mut ns = TaxonNamespace::new();
    let tree = tree!("[&R] ((A:1.5,B:2):1,(C:0.25,D:3):0.5);", &mut ns);
    let pdm = PhylogeneticDistanceMatrix::from_tree(&tree).unwrap();
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("distances.tsv");
    let write_options = CsvWriteOptions {
        delimiter: '\t',
        ..Default::default()
    };
    write_distance_matrix_csv(&pdm, &ns, &output_path, &write_options).unwrap();
    assert!(write_distance_matrix_csv(&pdm, &ns, &output_path, &write_options).is_err());

    let read_options = CsvOptions::default().with_delimiter('\t');
    let reread = read_distance_matrix_csv(&output_path, &mut ns, &read_options).unwrap();
    assert_eq!(reread.namespace(), pdm.namespace());
    assert_eq!(reread.taxa(), pdm.taxa());
    for (t1, t2) in pdm.distinct_taxon_pairs() {
        assert_relative_eq!(
            reread.patristic_distance(t1, t2, false).unwrap(),
            pdm.patristic_distance(t1, t2, false).unwrap()
        );
    }
}
