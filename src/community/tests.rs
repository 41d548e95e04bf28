use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::*;

use crate::community::{
    CommunityStatistic, EmptyAssemblageError, SesOptions, SingleTaxonAssemblageError,
};
use crate::distance_matrix::PhylogeneticDistanceMatrix;
use crate::taxa::{Taxon, TaxonNamespace};
use crate::tree;

fn two_clades() -> (PhylogeneticDistanceMatrix, TaxonNamespace) {
    let mut ns = TaxonNamespace::new();
    let tree = tree!("[&R] ((A:1,B:1):1,(C:1,D:1):1);", &mut ns);
    (PhylogeneticDistanceMatrix::from_tree(&tree).unwrap(), ns)
}

fn taxa(ns: &TaxonNamespace, labels: &[&str]) -> Vec<Taxon> {
    labels.iter().map(|l| ns.get_taxon(l).unwrap()).collect()
}

#[test]
fn mpd_star_tree() {
    let pdm = PhylogeneticDistanceMatrix::from_tree(&tree!("(A:1,B:1,C:1);")).unwrap();
    assert_eq!(pdm.mean_pairwise_distance(None, true, false).unwrap(), 2.0);
    assert_eq!(pdm.mean_nearest_taxon_distance(None, true, false).unwrap(), 2.0);
    assert_eq!(pdm.mean_pairwise_distance(None, false, false).unwrap(), 2.0);
}

#[test]
fn mpd_and_mntd_all_taxa() {
    let (pdm, _) = two_clades();
    assert_relative_eq!(
        pdm.mean_pairwise_distance(None, true, false).unwrap(),
        20.0 / 6.0
    );
    assert_eq!(pdm.mean_nearest_taxon_distance(None, true, false).unwrap(), 2.0);
    assert_relative_eq!(
        pdm.mean_pairwise_distance(None, true, true).unwrap(),
        20.0 / 6.0 / 6.0
    );
}

#[rstest]
#[case::sisters(&["A", "B"], 2.0, 2.0)]
#[case::across_root(&["A", "C"], 4.0, 4.0)]
#[case::three(&["A", "B", "C"], 10.0 / 3.0, 8.0 / 3.0)]
fn mpd_and_mntd_of_assemblage(#[case] labels: &[&str], #[case] mpd: f64, #[case] mntd: f64) {
    let (pdm, ns) = two_clades();
    let members = taxa(&ns, labels);
    let filter = |taxon: &Taxon| members.contains(taxon);
    assert_relative_eq!(
        pdm.mean_pairwise_distance(Some(&filter), true, false).unwrap(),
        mpd
    );
    assert_relative_eq!(
        pdm.mean_nearest_taxon_distance(Some(&filter), true, false).unwrap(),
        mntd
    );
}

#[test]
fn mpd_of_empty_assemblage() {
    let (pdm, ns) = two_clades();
    let a = ns.get_taxon("A").unwrap();
    let only_a = |taxon: &Taxon| *taxon == a;
    let res = pdm.mean_pairwise_distance(Some(&only_a), true, false);
    assert!(res.unwrap_err().downcast_ref::<EmptyAssemblageError>().is_some());
    let none = |_: &Taxon| false;
    let res = pdm.mean_nearest_taxon_distance(Some(&none), true, false);
    assert!(res.unwrap_err().downcast_ref::<EmptyAssemblageError>().is_some());
}

#[test]
fn ses_of_full_assemblage_has_no_variance() {
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "B", "C", "D"])];
    let options = SesOptions::default().replicates(20);
    let mut rng = StdRng::seed_from_u64(3);
    let res = pdm
        .standardized_effect_size_mean_pairwise_distance(&assemblages, &options, &mut rng)
        .unwrap();
    let ses = res[0].as_ref().unwrap();
    assert_relative_eq!(ses.obs, 20.0 / 6.0);
    assert_relative_eq!(ses.null_model_mean, ses.obs);
    assert_eq!(ses.null_model_sd, 0.0);
    assert_eq!(ses.z, None);
    assert_eq!(ses.rank, 0);
    assert_eq!(ses.p, 0.0);
}

#[test]
fn ses_single_replicate_has_no_z() {
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "B"])];
    let options = SesOptions::default().replicates(1);
    let res = pdm
        .standardized_effect_size_mean_nearest_taxon_distance(
            &assemblages,
            &options,
            &mut StdRng::seed_from_u64(11),
        )
        .unwrap();
    let ses = res[0].as_ref().unwrap();
    assert_eq!(ses.obs, 2.0);
    assert_eq!(ses.null_model_sd, 0.0);
    assert_eq!(ses.z, None);
    assert!(ses.rank <= 1);
}

#[test]
fn ses_is_reproducible_with_seed() {
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "B"]), taxa(&ns, &["A", "C", "D"])];
    let options = SesOptions::default().replicates(50);
    for statistic in [
        CommunityStatistic::MeanPairwiseDistance,
        CommunityStatistic::MeanNearestTaxonDistance,
    ] {
        let first = pdm
            .standardized_effect_size(
                statistic,
                &assemblages,
                &options,
                &mut StdRng::seed_from_u64(7),
            )
            .unwrap();
        let second = pdm
            .standardized_effect_size(
                statistic,
                &assemblages,
                &options,
                &mut StdRng::seed_from_u64(7),
            )
            .unwrap();
        assert_eq!(first, second);
        for ses in first.iter().flatten() {
            assert!(ses.rank <= 50);
            assert!((0.0..=1.0).contains(&ses.p));
            assert_relative_eq!(ses.p, ses.rank as f64 / 50.0);
        }
    }
}

#[test]
fn ses_sisters_rank_lowest() {
    // A random pair is a sister pair with probability 1/3, never closer than one.
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "B"])];
    let options = SesOptions::default().replicates(200);
    let res = pdm
        .standardized_effect_size_mean_pairwise_distance(
            &assemblages,
            &options,
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();
    let ses = res[0].as_ref().unwrap();
    assert_eq!(ses.obs, 2.0);
    assert_eq!(ses.rank, 0);
    assert!(ses.null_model_mean > 2.0);
    assert!(ses.null_model_mean < 4.0);
    assert!(ses.z.unwrap() < 0.0);
}

#[test]
fn ses_single_taxon_assemblage() {
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "B"]), taxa(&ns, &["C"])];
    let mut rng = StdRng::seed_from_u64(1);

    let options = SesOptions::default().replicates(5);
    let res = pdm.standardized_effect_size_mean_pairwise_distance(&assemblages, &options, &mut rng);
    assert_matches!(
        res.unwrap_err().downcast_ref::<SingleTaxonAssemblageError>(),
        Some(SingleTaxonAssemblageError { assemblage: 1 })
    );

    let options = options.skip_single_taxon_assemblages(true);
    let res = pdm
        .standardized_effect_size_mean_pairwise_distance(&assemblages, &options, &mut rng)
        .unwrap();
    assert_eq!(res.len(), 2);
    assert!(res[0].is_some());
    assert!(res[1].is_none());
}

#[test]
fn ses_empty_assemblage() {
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "B"]), Vec::new()];
    let options = SesOptions::default().replicates(5);
    let res = pdm.standardized_effect_size_mean_pairwise_distance(
        &assemblages,
        &options,
        &mut StdRng::seed_from_u64(1),
    );
    assert!(res.unwrap_err().downcast_ref::<EmptyAssemblageError>().is_some());
}

#[test]
fn ses_unweighted_distances() {
    let (pdm, ns) = two_clades();
    let assemblages = vec![taxa(&ns, &["A", "C"])];
    let options = SesOptions::default()
        .replicates(10)
        .weighted_edge_distances(false)
        .normalize_by_tree_size(true);
    let res = pdm
        .standardized_effect_size_mean_pairwise_distance(
            &assemblages,
            &options,
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
    // Four steps over seven edges, the root edge included.
    assert_relative_eq!(res[0].as_ref().unwrap().obs, 4.0 / 7.0);
}
