use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use phylostat::bipartition::{encode_bipartitions, EncodingOptions};
use phylostat::community::SesOptions;
use phylostat::distance_matrix::PhylogeneticDistanceMatrix;
use phylostat::taxa::{Taxon, TaxonNamespace};
use phylostat::tree::{random_tree, Tree};

const SIZES: [usize; 3] = [16, 64, 256];

fn black_box_setup(num_taxa: usize) -> (TaxonNamespace, Tree) {
    let namespace = TaxonNamespace::with_labels((0..num_taxa).map(|i| format!("t{}", i)));
    let taxa: Vec<Taxon> = namespace.taxa().collect();
    let mut rng = StdRng::seed_from_u64(num_taxa as u64);
    let tree = random_tree(&taxa, &namespace, &mut rng).expect("random tree should build");
    (namespace, black_box(tree))
}

fn distance_matrix(criterion: &mut Criterion) {
    let mut bench_group = criterion.benchmark_group("distance matrix");
    for num_taxa in SIZES {
        let (_, tree) = black_box_setup(num_taxa);
        bench_group.bench_function(format!("from tree {}", num_taxa), |bench| {
            bench.iter(|| PhylogeneticDistanceMatrix::from_tree(&tree));
        });
        bench_group.bench_function(format!("bipartitions {}", num_taxa), |bench| {
            bench.iter_batched(
                || tree.clone(),
                |mut tree| encode_bipartitions(&mut tree, &EncodingOptions::default()),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    bench_group.finish();
}

fn reconstruction(criterion: &mut Criterion) {
    let mut bench_group = criterion.benchmark_group("tree reconstruction");
    for num_taxa in SIZES {
        let (namespace, tree) = black_box_setup(num_taxa);
        let pdm = PhylogeneticDistanceMatrix::from_tree(&tree).expect("matrix should build");
        bench_group.bench_function(format!("NJ {}", num_taxa), |bench| {
            bench.iter(|| pdm.nj_tree(&namespace, true));
        });
        bench_group.bench_function(format!("UPGMA {}", num_taxa), |bench| {
            bench.iter(|| pdm.upgma_tree(&namespace, true));
        });
    }
    bench_group.finish();
}

fn community(criterion: &mut Criterion) {
    let mut bench_group = criterion.benchmark_group("community SES");
    for num_taxa in SIZES {
        let (namespace, tree) = black_box_setup(num_taxa);
        let pdm = PhylogeneticDistanceMatrix::from_tree(&tree).expect("matrix should build");
        let taxa: Vec<Taxon> = namespace.taxa().collect();
        let assemblages: Vec<Vec<Taxon>> = taxa.chunks(num_taxa / 4).map(|c| c.to_vec()).collect();
        let options = SesOptions::default().replicates(100);
        bench_group.bench_function(format!("MPD {}", num_taxa), |bench| {
            bench.iter_batched(
                || StdRng::seed_from_u64(0),
                |mut rng| {
                    pdm.standardized_effect_size_mean_pairwise_distance(
                        &assemblages,
                        &options,
                        &mut rng,
                    )
                },
                criterion::BatchSize::SmallInput,
            );
        });
        bench_group.bench_function(format!("MNTD {}", num_taxa), |bench| {
            bench.iter_batched(
                || StdRng::seed_from_u64(0),
                |mut rng| {
                    pdm.standardized_effect_size_mean_nearest_taxon_distance(
                        &assemblages,
                        &options,
                        &mut rng,
                    )
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    bench_group.finish();
}

criterion_group! {
name = matrices;
config = Criterion::default().measurement_time(Duration::from_secs(10));
targets = distance_matrix, reconstruction
}
criterion_group! {
name = ses;
config = Criterion::default().measurement_time(Duration::from_secs(20)).sample_size(15);
targets = community,
}
criterion_main!(matrices, ses);
