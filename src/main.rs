use std::fs;
use std::path::Path;

use anyhow::{bail, Error};
use clap::Parser;
use ftail::Ftail;
use itertools::Itertools;
use log::{debug, info, warn, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;

use phylostat::bipartition::{encode_bipartitions, Bipartition, EncodingOptions};
use phylostat::bitmask::BitstringFormat;
use phylostat::community::{CommunityStatistic, SesOptions};
use phylostat::distance_matrix::{CsvOptions, CsvWriteOptions, PhylogeneticDistanceMatrix};
use phylostat::io::{
    read_distance_matrix_csv, read_newick_from_file, write_distance_matrix_csv,
    write_newick_to_file,
};
use phylostat::taxa::{Taxon, TaxonNamespace};
use phylostat::tree::Tree;

mod cli;
use crate::cli::{Cli, ConfigBuilder, DistanceSource, Method, Task};

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            bail!("Unable to parse command line arguments: \n {}", error)
        }
    };
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if Ftail::new().console(level).init().is_err() {
        bail!("Unable to set up logging");
    }
    info!("Successfully parsed the command line parameters");

    let cfg_build: ConfigBuilder = cli.into();
    let cfg = cfg_build.setup()?;

    info!("phylostat run started.");
    info!("{}", cfg);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    match cfg.task {
        Task::Splits {
            tree_file,
            non_trivial,
            paup,
        } => print_splits(&tree_file, non_trivial, paup)?,
        Task::Distances {
            tree_file,
            output,
            is_weighted_edge_distances,
            is_normalize_by_tree_size,
            delimiter,
        } => {
            let mut namespace = TaxonNamespace::new();
            let tree = first_tree(&tree_file, &mut namespace)?;
            let pdm = PhylogeneticDistanceMatrix::from_tree(&tree)?;
            let options = CsvWriteOptions {
                delimiter,
                is_weighted_edge_distances,
                is_normalize_by_tree_size,
                label_transform: None,
            };
            write_distance_matrix_csv(&pdm, &namespace, &output, &options)?;
        }
        Task::Reconstruct {
            method,
            source,
            output,
            is_weighted_edge_distances,
        } => {
            let mut namespace = TaxonNamespace::new();
            let pdm = match source {
                DistanceSource::Tree(path) => {
                    PhylogeneticDistanceMatrix::from_tree(&first_tree(&path, &mut namespace)?)?
                }
                DistanceSource::Table { path, delimiter } => read_distance_matrix_csv(
                    &path,
                    &mut namespace,
                    &CsvOptions::default().with_delimiter(delimiter),
                )?,
            };
            let tree = match method {
                Method::NeighborJoining => pdm.nj_tree(&namespace, is_weighted_edge_distances)?,
                Method::Upgma => pdm.upgma_tree(&namespace, is_weighted_edge_distances)?,
            };
            info!("Built a tree of length {}.", tree.length());
            write_newick_to_file(&[tree], &output)?;
        }
        Task::Community {
            tree_file,
            assemblages,
            statistic,
            options,
        } => run_community(
            &tree_file,
            &assemblages,
            statistic,
            &options,
            &mut rng,
        )?,
    }
    info!("phylostat run finished.");
    Ok(())
}

fn first_tree(path: &Path, namespace: &mut TaxonNamespace) -> Result<Tree> {
    let mut trees = read_newick_from_file(path, namespace)?;
    if trees.is_empty() {
        bail!("No tree found in {}", path.display());
    }
    if trees.len() > 1 {
        warn!(
            "{} trees found in {}, only the first one is used.",
            trees.len(),
            path.display()
        );
    }
    Ok(trees.swap_remove(0))
}

fn print_splits(tree_file: &Path, non_trivial: bool, paup: bool) -> Result<()> {
    let mut namespace = TaxonNamespace::new();
    let trees = read_newick_from_file(tree_file, &mut namespace)?;
    let mut format = BitstringFormat::default().with_length(namespace.len());
    if paup {
        format = format.with_symbols('.', '*').reversed();
    }
    for (i, mut tree) in trees.into_iter().enumerate() {
        let encoding = encode_bipartitions(&mut tree, &EncodingOptions::default())?;
        let splits: Vec<&Bipartition> = encoding
            .bipartitions()
            .iter()
            .filter(|bipartition| !non_trivial || !bipartition.is_trivial())
            .sorted()
            .dedup()
            .collect();
        debug!("Tree {} has {} splits to print.", i + 1, splits.len());
        println!("# tree {}", i + 1);
        for bipartition in splits {
            let labels = bipartition
                .leafset_taxa(&namespace)
                .iter()
                .map(|taxon| namespace.label(taxon))
                .join(" ");
            println!("{}\t{}", bipartition.split_as_bitstring(&format), labels);
        }
    }
    Ok(())
}

fn read_assemblages(path: &Path, namespace: &TaxonNamespace) -> Result<Vec<Vec<Taxon>>> {
    info!("Reading assemblages from file {}", path.display());
    let mut assemblages = Vec::new();
    for (line_no, line) in fs::read_to_string(path)?.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut assemblage = Vec::new();
        for label in line.split_whitespace() {
            match namespace.get_taxon(label) {
                Some(taxon) => assemblage.push(taxon),
                None => bail!(
                    "Unknown taxon {} on line {} of {}",
                    label,
                    line_no + 1,
                    path.display()
                ),
            }
        }
        assemblages.push(assemblage);
    }
    info!("Read {} assemblages", assemblages.len());
    Ok(assemblages)
}

fn run_community(
    tree_file: &Path,
    assemblages: &Path,
    statistic: CommunityStatistic,
    options: &SesOptions,
    rng: &mut StdRng,
) -> Result<()> {
    let mut namespace = TaxonNamespace::new();
    let tree = first_tree(tree_file, &mut namespace)?;
    let pdm = PhylogeneticDistanceMatrix::from_tree(&tree)?;
    let assemblages = read_assemblages(assemblages, &namespace)?;
    let results = pdm.standardized_effect_size(statistic, &assemblages, options, rng)?;

    println!(
        "{}",
        ["assemblage", "obs", "null_mean", "null_sd", "z", "rank", "p"].join("\t")
    );
    for (i, result) in results.iter().enumerate() {
        let row = match result {
            Some(ses) => vec![
                (i + 1).to_string(),
                ses.obs.to_string(),
                ses.null_model_mean.to_string(),
                ses.null_model_sd.to_string(),
                ses.z.map_or("NA".to_string(), |z| z.to_string()),
                ses.rank.to_string(),
                ses.p.to_string(),
            ],
            None => std::iter::once((i + 1).to_string())
                .chain(std::iter::repeat("NA".to_string()).take(6))
                .collect(),
        };
        println!("{}", row.iter().join("\t"));
    }
    Ok(())
}
