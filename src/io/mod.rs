use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::bail;
use log::info;

use crate::distance_matrix::{CsvOptions, CsvWriteOptions, PhylogeneticDistanceMatrix};
use crate::taxa::TaxonNamespace;
use crate::tree::{tree_parser, Tree};
use crate::Result;

pub struct DataError {
    pub message: String,
}

impl fmt::Debug for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for DataError {}

fn ensure_absent(path: &Path) -> Result<()> {
    if path.exists() {
        bail!(DataError {
            message: format!("File {} already exists", path.display())
        });
    }
    Ok(())
}

/// Reads newick trees from a file, returning a vector of trees.
///
/// Leaf labels are resolved against `namespace`, so taxa are shared with everything else
/// read into it.
///
/// # Arguments
/// * `path` - Path to the newick file.
/// * `namespace` - Namespace the leaf taxa are looked up in or added to.
///
/// # Example
/// ```
/// use phylostat::io::read_newick_from_file;
/// use phylostat::taxa::TaxonNamespace;
/// use std::path::PathBuf;
/// let mut ns = TaxonNamespace::new();
/// let trees = read_newick_from_file(&PathBuf::from("./data/tree.newick"), &mut ns).unwrap();
/// # assert_eq!(trees.len(), 1);
/// # assert_eq!(trees[0].leaves().len(), 5);
/// ```
pub fn read_newick_from_file(path: &Path, namespace: &mut TaxonNamespace) -> Result<Vec<Tree>> {
    info!("Reading newick trees from file {}", path.display());
    let newick = fs::read_to_string(path)?;
    info!("Read file successfully");
    tree_parser::from_newick(&newick, namespace)
}

/// Writes newick trees to the given file path, one per line. Will return an error if the file
/// already exists.
///
/// # Example
/// ```
/// # use std::fs::read_to_string;
/// use phylostat::io::write_newick_to_file;
/// use phylostat::taxa::TaxonNamespace;
/// use phylostat::tree::from_newick;
///
/// let dir = tempfile::tempdir().unwrap();
/// let output_path = dir.path().join("out.newick");
/// let mut ns = TaxonNamespace::new();
/// let trees = from_newick("[&R] ((A:1,B:2):1,C:4);", &mut ns).unwrap();
/// write_newick_to_file(&trees, &output_path).unwrap();
/// # assert_eq!(read_to_string(&output_path).unwrap().trim(), "[&R] ((A:1,B:2):1,C:4);");
/// assert!(write_newick_to_file(&trees, &output_path).is_err());
/// ```
pub fn write_newick_to_file(trees: &[Tree], path: &Path) -> Result<()> {
    info!("Writing newick trees to file {}", path.display());
    ensure_absent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    for tree in trees {
        writer.write_all(tree.to_newick().as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!("Finished writing successfully");
    Ok(())
}

/// Reads a distance table, see [`PhylogeneticDistanceMatrix::from_csv`].
pub fn read_distance_matrix_csv(
    path: &Path,
    namespace: &mut TaxonNamespace,
    options: &CsvOptions,
) -> Result<PhylogeneticDistanceMatrix> {
    info!("Reading distance table from file {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    PhylogeneticDistanceMatrix::from_csv(reader, namespace, options)
}

/// Writes a distance table to the given file path. Will return an error if the file already
/// exists.
pub fn write_distance_matrix_csv(
    matrix: &PhylogeneticDistanceMatrix,
    namespace: &TaxonNamespace,
    path: &Path,
    options: &CsvWriteOptions,
) -> Result<()> {
    info!("Writing distance table to file {}", path.display());
    ensure_absent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    matrix.write_csv(&mut writer, namespace, options)?;
    writer.flush()?;
    info!("Finished writing successfully");
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
