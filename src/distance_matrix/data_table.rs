use std::io::{BufRead, Write};

use anyhow::bail;
use log::info;
use nalgebra::DMatrix;

use crate::distance_matrix::PhylogeneticDistanceMatrix;
use crate::io::DataError;
use crate::taxa::{ensure_same_namespace, Taxon, TaxonNamespace};
use crate::Result;

/// Layout of a distance table read with [`PhylogeneticDistanceMatrix::from_csv`].
#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub delimiter: char,
    /// The first cell of each row is a taxon label.
    pub has_row_headers: bool,
    /// The first line holds the taxon labels of the columns.
    pub has_column_headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_row_headers: true,
            has_column_headers: true,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, has_row_headers: bool, has_column_headers: bool) -> Self {
        self.has_row_headers = has_row_headers;
        self.has_column_headers = has_column_headers;
        self
    }
}

/// Output settings of [`PhylogeneticDistanceMatrix::write_csv`].
#[derive(Debug, Clone)]
pub struct CsvWriteOptions {
    pub delimiter: char,
    pub is_weighted_edge_distances: bool,
    pub is_normalize_by_tree_size: bool,
    /// Applied to every taxon label before it is written.
    pub label_transform: Option<fn(&str) -> String>,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            is_weighted_edge_distances: true,
            is_normalize_by_tree_size: false,
            label_transform: None,
        }
    }
}

fn data_error(message: String) -> DataError {
    DataError { message }
}

fn split_line(line: &str, delimiter: char) -> Vec<&str> {
    line.split(delimiter)
        .map(|cell| cell.trim().trim_matches('"'))
        .collect()
}

impl PhylogeneticDistanceMatrix {
    /// Reads a square table of distances.
    ///
    /// Taxa come from the row labels, else from the column labels, else from the namespace
    /// itself, row `i` standing for taxon `i`. Labels are resolved with
    /// [`TaxonNamespace::require_taxon`]. Only the upper triangle is used; the diagonal and the
    /// lower triangle must be numeric but are ignored.
    ///
    /// # Example
    /// ```
    /// use phylostat::distance_matrix::{CsvOptions, PhylogeneticDistanceMatrix};
    /// use phylostat::taxa::TaxonNamespace;
    /// let table = ",A,B,C\nA,0,2,4\nB,0,0,3\nC,0,0,0\n";
    /// let mut ns = TaxonNamespace::new();
    /// let pdm = PhylogeneticDistanceMatrix::from_csv(table.as_bytes(), &mut ns, &CsvOptions::default()).unwrap();
    /// let (a, c) = (ns.get_taxon("A").unwrap(), ns.get_taxon("C").unwrap());
    /// assert_eq!(pdm.patristic_distance(&c, &a, false).unwrap(), 4.0);
    /// ```
    pub fn from_csv<R: BufRead>(
        reader: R,
        namespace: &mut TaxonNamespace,
        options: &CsvOptions,
    ) -> Result<Self> {
        info!("Reading a distance table.");
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        let mut rows = lines.iter().map(|line| split_line(line, options.delimiter));

        let column_labels: Option<Vec<String>> = if options.has_column_headers {
            match rows.next() {
                Some(header) => {
                    let skip = usize::from(options.has_row_headers);
                    Some(header.iter().skip(skip).map(|l| l.to_string()).collect())
                }
                None => bail!(data_error("Distance table is empty".to_string())),
            }
        } else {
            None
        };

        let mut row_labels = Vec::new();
        let mut values: Vec<Vec<f64>> = Vec::new();
        for (r, cells) in rows.enumerate() {
            let cells = if options.has_row_headers {
                let Some((label, rest)) = cells.split_first() else {
                    bail!(data_error(format!("Row {} of the distance table is empty", r)));
                };
                row_labels.push(label.to_string());
                rest.to_vec()
            } else {
                cells
            };
            let mut row = Vec::with_capacity(cells.len());
            for cell in cells {
                match cell.parse::<f64>() {
                    Ok(value) => row.push(value),
                    Err(_) => bail!(data_error(format!(
                        "Invalid distance '{}' in row {} of the distance table",
                        cell, r
                    ))),
                }
            }
            values.push(row);
        }

        let n = values.len();
        if let Some((r, row)) = values.iter().enumerate().find(|(_, row)| row.len() != n) {
            bail!(data_error(format!(
                "Distance table is not square: row {} has {} values, expected {}",
                r,
                row.len(),
                n
            )));
        }
        if let Some(labels) = &column_labels {
            if labels.len() != n {
                bail!(data_error(format!(
                    "Distance table has {} column labels for {} rows",
                    labels.len(),
                    n
                )));
            }
            if options.has_row_headers && labels != &row_labels {
                bail!(data_error(
                    "Row and column labels of the distance table differ".to_string()
                ));
            }
        }

        let taxa: Vec<Taxon> = match (options.has_row_headers, column_labels) {
            (true, _) => Self::require_taxa(&row_labels, namespace)?,
            (false, Some(labels)) => Self::require_taxa(&labels, namespace)?,
            (false, None) => {
                if namespace.len() != n {
                    bail!(data_error(format!(
                        "Distance table without labels has {} rows but the namespace has {} taxa",
                        n,
                        namespace.len()
                    )));
                }
                namespace.taxa().collect()
            }
        };

        let mut distances = DMatrix::zeros(n, n);
        for (i, row) in values.iter().enumerate() {
            for (j, value) in row.iter().enumerate().skip(i + 1) {
                distances[(i, j)] = *value;
            }
        }
        distances.fill_lower_triangle_with_upper_triangle();
        info!("Read distances between {} taxa.", n);
        Self::from_distances(namespace, taxa, distances)
    }

    fn require_taxa(labels: &[String], namespace: &mut TaxonNamespace) -> Result<Vec<Taxon>> {
        labels
            .iter()
            .map(|label| namespace.require_taxon(label))
            .collect()
    }

    /// Writes the full square table with a header line and a label at the start of each row.
    pub fn write_csv<W: Write>(
        &self,
        writer: &mut W,
        namespace: &TaxonNamespace,
        options: &CsvWriteOptions,
    ) -> Result<()> {
        ensure_same_namespace(namespace.id(), self.namespace)?;
        let delimiter = options.delimiter.to_string();
        let label = |taxon: &Taxon| match options.label_transform {
            Some(transform) => transform(namespace.label(taxon)),
            None => namespace.label(taxon).to_string(),
        };

        let header: Vec<String> = std::iter::once(String::new())
            .chain(self.taxa.iter().map(label))
            .collect();
        writeln!(writer, "{}", header.join(&delimiter))?;
        for t1 in self.taxa.iter() {
            let mut line = vec![label(t1)];
            for t2 in self.taxa.iter() {
                let d = self.distance(
                    t1,
                    t2,
                    options.is_weighted_edge_distances,
                    options.is_normalize_by_tree_size,
                )?;
                line.push(d.to_string());
            }
            writeln!(writer, "{}", line.join(&delimiter))?;
        }
        Ok(())
    }
}
