use std::fmt::{self, Display};
use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::Rng;

use phylostat::community::{CommunityStatistic, SesOptions};

type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Log debugging detail
    #[arg(short, long)]
    pub(super) verbose: bool,

    /// Seed of the random number generator, drawn at random if not given
    #[arg(short, long, value_name = "SEED")]
    pub(super) seed: Option<u64>,

    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Prints the splits of every tree in a newick file
    Splits {
        /// Tree file in newick format
        #[arg(short, long, value_name = "TREE_FILE")]
        tree_file: PathBuf,

        /// Only print splits separating at least two taxa from the rest
        #[arg(short, long)]
        non_trivial: bool,

        /// Print the first taxon leftmost with '.' and '*' symbols
        #[arg(short, long)]
        paup: bool,
    },
    /// Writes the pairwise distances between the leaves of a tree as a table
    Distances {
        /// Tree file in newick format
        #[arg(short, long, value_name = "TREE_FILE")]
        tree_file: PathBuf,

        /// Output table, must not exist yet
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: PathBuf,

        #[command(flatten)]
        distances: DistanceArgs,

        /// Column delimiter of the output table
        #[arg(short, long, default_value_t = ',')]
        delimiter: char,
    },
    /// Builds a Neighbor-Joining tree from a tree or a distance table
    Nj(ReconstructionArgs),
    /// Builds a UPGMA tree from a tree or a distance table
    Upgma(ReconstructionArgs),
    /// Computes standardized effect sizes of MPD or MNTD for assemblages of taxa
    Community {
        /// Tree file in newick format, the first tree is used
        #[arg(short, long, value_name = "TREE_FILE")]
        tree_file: PathBuf,

        /// Assemblage file, one whitespace-separated list of taxon labels per line
        #[arg(short, long, value_name = "ASSEMBLAGE_FILE")]
        assemblages: PathBuf,

        #[arg(short = 'm', long, value_enum, default_value_t = StatisticArg::Mpd)]
        statistic: StatisticArg,

        /// Number of randomisation replicates
        #[arg(short, long, default_value_t = 1000)]
        replicates: usize,

        #[command(flatten)]
        distances: DistanceArgs,

        /// Report single-taxon assemblages as missing instead of failing
        #[arg(long)]
        skip_single: bool,
    },
}

#[derive(Args, Clone, Debug)]
pub(super) struct DistanceArgs {
    /// Count edges instead of summing edge lengths
    #[arg(short, long)]
    pub(super) unweighted: bool,

    /// Divide distances by the tree length, or the edge count when unweighted
    #[arg(long)]
    pub(super) normalize: bool,
}

#[derive(Args, Clone, Debug)]
pub(super) struct ReconstructionArgs {
    /// Tree file in newick format, distances are taken from its first tree
    #[arg(short, long, value_name = "TREE_FILE")]
    pub(super) tree_file: Option<PathBuf>,

    /// Distance table with row and column labels
    #[arg(short = 'i', long, value_name = "MATRIX_FILE")]
    pub(super) matrix_file: Option<PathBuf>,

    /// Column delimiter of the distance table
    #[arg(short, long, default_value_t = ',')]
    pub(super) delimiter: char,

    /// Output newick file, must not exist yet
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    pub(super) output: PathBuf,

    /// Use path edge counts of the input tree instead of edge lengths
    #[arg(short, long)]
    pub(super) unweighted: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
pub(super) enum StatisticArg {
    Mpd,
    Mntd,
}

impl From<StatisticArg> for CommunityStatistic {
    fn from(statistic: StatisticArg) -> Self {
        match statistic {
            StatisticArg::Mpd => CommunityStatistic::MeanPairwiseDistance,
            StatisticArg::Mntd => CommunityStatistic::MeanNearestTaxonDistance,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) enum DistanceSource {
    Tree(PathBuf),
    Table { path: PathBuf, delimiter: char },
}

impl Display for DistanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceSource::Tree(path) => write!(f, "tree {}", path.display()),
            DistanceSource::Table { path, delimiter } => {
                write!(f, "table {} delimited by '{}'", path.display(), delimiter)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Method {
    NeighborJoining,
    Upgma,
}

/// Validated task of one run.
#[derive(Debug, Clone)]
pub(super) enum Task {
    Splits {
        tree_file: PathBuf,
        non_trivial: bool,
        paup: bool,
    },
    Distances {
        tree_file: PathBuf,
        output: PathBuf,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
        delimiter: char,
    },
    Reconstruct {
        method: Method,
        source: DistanceSource,
        output: PathBuf,
        is_weighted_edge_distances: bool,
    },
    Community {
        tree_file: PathBuf,
        assemblages: PathBuf,
        statistic: CommunityStatistic,
        options: SesOptions,
    },
}

impl Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Splits {
                tree_file,
                non_trivial,
                ..
            } => write!(
                f,
                "Printing {} splits of the trees in {}",
                if *non_trivial { "non-trivial" } else { "all" },
                tree_file.display()
            ),
            Task::Distances {
                tree_file, output, ..
            } => write!(
                f,
                "Writing the distances of the tree in {} to {}",
                tree_file.display(),
                output.display()
            ),
            Task::Reconstruct {
                method,
                source,
                output,
                ..
            } => write!(
                f,
                "Building a {:?} tree from the {} into {}",
                method,
                source,
                output.display()
            ),
            Task::Community {
                statistic, options, ..
            } => write!(
                f,
                "Computing the SES {} over {} replicates",
                statistic, options.num_randomization_replicates
            ),
        }
    }
}

pub(super) struct ConfigBuilder {
    verbose: bool,
    seed: Option<u64>,
    command: Commands,
}

impl From<Cli> for ConfigBuilder {
    fn from(cli: Cli) -> Self {
        Self {
            verbose: cli.verbose,
            seed: cli.seed,
            command: cli.command,
        }
    }
}

impl ConfigBuilder {
    pub(super) fn setup(self) -> Result<Config> {
        let task = match self.command {
            Commands::Splits {
                tree_file,
                non_trivial,
                paup,
            } => Task::Splits {
                tree_file: existing(tree_file)?,
                non_trivial,
                paup,
            },
            Commands::Distances {
                tree_file,
                output,
                distances,
                delimiter,
            } => Task::Distances {
                tree_file: existing(tree_file)?,
                output,
                is_weighted_edge_distances: !distances.unweighted,
                is_normalize_by_tree_size: distances.normalize,
                delimiter,
            },
            Commands::Nj(args) => reconstruction(Method::NeighborJoining, args)?,
            Commands::Upgma(args) => reconstruction(Method::Upgma, args)?,
            Commands::Community {
                tree_file,
                assemblages,
                statistic,
                replicates,
                distances,
                skip_single,
            } => {
                if replicates == 0 {
                    bail!("At least one randomisation replicate is needed");
                }
                Task::Community {
                    tree_file: existing(tree_file)?,
                    assemblages: existing(assemblages)?,
                    statistic: statistic.into(),
                    options: SesOptions::default()
                        .replicates(replicates)
                        .weighted_edge_distances(!distances.unweighted)
                        .normalize_by_tree_size(distances.normalize)
                        .skip_single_taxon_assemblages(skip_single),
                }
            }
        };
        Ok(Config {
            verbose: self.verbose,
            seed: self.seed.unwrap_or_else(|| rand::thread_rng().gen()),
            task,
        })
    }
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        bail!("Input file {} does not exist", path.display());
    }
    Ok(path)
}

fn reconstruction(method: Method, args: ReconstructionArgs) -> Result<Task> {
    let source = match (args.tree_file, args.matrix_file) {
        (Some(tree_file), None) => DistanceSource::Tree(existing(tree_file)?),
        (None, Some(matrix_file)) => DistanceSource::Table {
            path: existing(matrix_file)?,
            delimiter: args.delimiter,
        },
        _ => bail!("Exactly one of a tree file and a matrix file must be given"),
    };
    if args.unweighted && matches!(source, DistanceSource::Table { .. }) {
        bail!("Edge counts are only available for distances taken from a tree");
    }
    Ok(Task::Reconstruct {
        method,
        source,
        output: args.output,
        is_weighted_edge_distances: !args.unweighted,
    })
}

pub(super) struct Config {
    pub(super) verbose: bool,
    pub(super) seed: u64,
    pub(super) task: Task,
}

impl Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  seed: {}", self.seed)?;
        writeln!(f, "  verbose: {}", self.verbose)?;
        write!(f, "  task: {}", self.task)
    }
}
