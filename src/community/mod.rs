use std::error::Error;
use std::fmt;

use anyhow::bail;
use hashbrown::HashSet;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance_matrix::PhylogeneticDistanceMatrix;
use crate::taxa::Taxon;
use crate::Result;

#[derive(Debug)]
pub struct EmptyAssemblageError;

impl fmt::Display for EmptyAssemblageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assemblage has no pair of taxa to compare")
    }
}

impl Error for EmptyAssemblageError {}

#[derive(Debug)]
pub struct SingleTaxonAssemblageError {
    pub assemblage: usize,
}

impl fmt::Display for SingleTaxonAssemblageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Assemblage {} has a single taxon, its effect size is undefined",
            self.assemblage
        )
    }
}

impl Error for SingleTaxonAssemblageError {}

/// Predicate selecting the taxa of an assemblage.
pub type TaxonFilter<'a> = &'a dyn Fn(&Taxon) -> bool;

/// Settings of the standardized effect size randomisation tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SesOptions {
    pub num_randomization_replicates: usize,
    pub is_weighted_edge_distances: bool,
    pub is_normalize_by_tree_size: bool,
    /// Reports `None` for single-taxon assemblages instead of failing.
    pub is_skip_single_taxon_assemblages: bool,
}

impl Default for SesOptions {
    fn default() -> Self {
        Self {
            num_randomization_replicates: 1000,
            is_weighted_edge_distances: true,
            is_normalize_by_tree_size: false,
            is_skip_single_taxon_assemblages: false,
        }
    }
}

impl SesOptions {
    pub fn replicates(mut self, num_randomization_replicates: usize) -> Self {
        self.num_randomization_replicates = num_randomization_replicates;
        self
    }

    pub fn weighted_edge_distances(mut self, is_weighted_edge_distances: bool) -> Self {
        self.is_weighted_edge_distances = is_weighted_edge_distances;
        self
    }

    pub fn normalize_by_tree_size(mut self, is_normalize_by_tree_size: bool) -> Self {
        self.is_normalize_by_tree_size = is_normalize_by_tree_size;
        self
    }

    pub fn skip_single_taxon_assemblages(mut self, is_skip: bool) -> Self {
        self.is_skip_single_taxon_assemblages = is_skip;
        self
    }
}

/// Observed statistic of one assemblage compared with its null distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedEffectSize {
    pub obs: f64,
    pub null_model_mean: f64,
    pub null_model_sd: f64,
    /// `(obs - mean) / sd`, `None` when the null distribution has no variance.
    pub z: Option<f64>,
    /// Number of null values strictly below the observation.
    pub rank: usize,
    pub p: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunityStatistic {
    MeanPairwiseDistance,
    MeanNearestTaxonDistance,
}

impl fmt::Display for CommunityStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityStatistic::MeanPairwiseDistance => write!(f, "MPD"),
            CommunityStatistic::MeanNearestTaxonDistance => write!(f, "MNTD"),
        }
    }
}

impl CommunityStatistic {
    fn compute(
        &self,
        pdm: &PhylogeneticDistanceMatrix,
        filter: TaxonFilter,
        options: &SesOptions,
    ) -> Result<f64> {
        match self {
            CommunityStatistic::MeanPairwiseDistance => pdm.mean_pairwise_distance(
                Some(filter),
                options.is_weighted_edge_distances,
                options.is_normalize_by_tree_size,
            ),
            CommunityStatistic::MeanNearestTaxonDistance => pdm.mean_nearest_taxon_distance(
                Some(filter),
                options.is_weighted_edge_distances,
                options.is_normalize_by_tree_size,
            ),
        }
    }
}

impl PhylogeneticDistanceMatrix {
    /// Mean distance over all distinct pairs of taxa accepted by `filter`.
    ///
    /// # Example
    /// ```
    /// use phylostat::distance_matrix::PhylogeneticDistanceMatrix;
    /// use phylostat::taxa::TaxonNamespace;
    /// use phylostat::tree::from_newick;
    /// let mut ns = TaxonNamespace::new();
    /// let tree = from_newick("(A:1,B:1,C:1);", &mut ns).unwrap().remove(0);
    /// let pdm = PhylogeneticDistanceMatrix::from_tree(&tree).unwrap();
    /// assert_eq!(pdm.mean_pairwise_distance(None, true, false).unwrap(), 2.0);
    /// ```
    pub fn mean_pairwise_distance(
        &self,
        filter: Option<TaxonFilter>,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
    ) -> Result<f64> {
        let accepted = |taxon: &Taxon| filter.map_or(true, |f| f(taxon));
        let mut sum = 0.0;
        let mut count = 0;
        for (t1, t2) in self.distinct_taxon_pairs() {
            if accepted(t1) && accepted(t2) {
                sum += self.distance(t1, t2, is_weighted_edge_distances, is_normalize_by_tree_size)?;
                count += 1;
            }
        }
        if count == 0 {
            bail!(EmptyAssemblageError);
        }
        Ok(sum / count as f64)
    }

    /// Mean over the taxa accepted by `filter` of the distance to their nearest accepted taxon.
    pub fn mean_nearest_taxon_distance(
        &self,
        filter: Option<TaxonFilter>,
        is_weighted_edge_distances: bool,
        is_normalize_by_tree_size: bool,
    ) -> Result<f64> {
        let accepted: Vec<Taxon> = self
            .taxa()
            .iter()
            .filter(|taxon| filter.map_or(true, |f| f(*taxon)))
            .copied()
            .collect();
        let mut sum = 0.0;
        let mut count = 0;
        for t1 in accepted.iter() {
            let mut nearest: Option<f64> = None;
            for t2 in accepted.iter().filter(|t2| *t2 != t1) {
                let d =
                    self.distance(t1, t2, is_weighted_edge_distances, is_normalize_by_tree_size)?;
                nearest = Some(nearest.map_or(d, |n| n.min(d)));
            }
            if let Some(nearest) = nearest {
                sum += nearest;
                count += 1;
            }
        }
        if count == 0 {
            bail!(EmptyAssemblageError);
        }
        Ok(sum / count as f64)
    }

    /// Standardized effect size of the mean pairwise distance of each assemblage.
    ///
    /// See [`Self::standardized_effect_size`].
    pub fn standardized_effect_size_mean_pairwise_distance<R: Rng + ?Sized>(
        &self,
        assemblages: &[Vec<Taxon>],
        options: &SesOptions,
        rng: &mut R,
    ) -> Result<Vec<Option<StandardizedEffectSize>>> {
        self.standardized_effect_size(
            CommunityStatistic::MeanPairwiseDistance,
            assemblages,
            options,
            rng,
        )
    }

    /// Standardized effect size of the mean nearest taxon distance of each assemblage.
    ///
    /// See [`Self::standardized_effect_size`].
    pub fn standardized_effect_size_mean_nearest_taxon_distance<R: Rng + ?Sized>(
        &self,
        assemblages: &[Vec<Taxon>],
        options: &SesOptions,
        rng: &mut R,
    ) -> Result<Vec<Option<StandardizedEffectSize>>> {
        self.standardized_effect_size(
            CommunityStatistic::MeanNearestTaxonDistance,
            assemblages,
            options,
            rng,
        )
    }

    /// Compares the statistic of each assemblage with its values over randomised matrices.
    ///
    /// Every replicate shuffles a clone of the matrix with its own generator, seeded from
    /// `rng`, and evaluates all assemblages on it. The results only depend on `rng`, also
    /// when the replicates run in parallel. Single-taxon assemblages give `None` when
    /// skipped.
    pub fn standardized_effect_size<R: Rng + ?Sized>(
        &self,
        statistic: CommunityStatistic,
        assemblages: &[Vec<Taxon>],
        options: &SesOptions,
        rng: &mut R,
    ) -> Result<Vec<Option<StandardizedEffectSize>>> {
        info!(
            "Computing SES {} of {} assemblages over {} replicates.",
            statistic,
            assemblages.len(),
            options.num_randomization_replicates
        );
        let mut memberships: Vec<Option<HashSet<Taxon>>> = Vec::with_capacity(assemblages.len());
        for (i, assemblage) in assemblages.iter().enumerate() {
            let members: HashSet<Taxon> = assemblage.iter().copied().collect();
            if members.len() == 1 {
                if !options.is_skip_single_taxon_assemblages {
                    bail!(SingleTaxonAssemblageError { assemblage: i });
                }
                debug!("Skipping single-taxon assemblage {}.", i);
                memberships.push(None);
            } else {
                memberships.push(Some(members));
            }
        }

        let evaluate = |pdm: &PhylogeneticDistanceMatrix| -> Result<Vec<Option<f64>>> {
            memberships
                .iter()
                .map(|members| match members {
                    Some(members) => {
                        let filter = |taxon: &Taxon| members.contains(taxon);
                        statistic.compute(pdm, &filter, options).map(Some)
                    }
                    None => Ok(None),
                })
                .collect()
        };

        let observed = evaluate(self)?;
        let seeds: Vec<u64> = (0..options.num_randomization_replicates)
            .map(|_| rng.gen())
            .collect();
        let replicate = |seed: &u64| -> Result<Vec<Option<f64>>> {
            let mut pdm = self.clone();
            pdm.shuffle_taxa(&mut StdRng::seed_from_u64(*seed));
            evaluate(&pdm)
        };

        cfg_if::cfg_if! {
            if #[cfg(feature = "par-ses")] {
                use rayon::prelude::*;
                let null_values: Vec<Vec<Option<f64>>> =
                    seeds.par_iter().map(replicate).collect::<Result<_>>()?;
            } else {
                let null_values: Vec<Vec<Option<f64>>> =
                    seeds.iter().map(replicate).collect::<Result<_>>()?;
            }
        }

        let results = observed
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                obs.map(|obs| {
                    let null: Vec<f64> = null_values.iter().filter_map(|rep| rep[i]).collect();
                    effect_size(obs, &null)
                })
            })
            .collect();
        info!("Finished computing SES {}.", statistic);
        Ok(results)
    }
}

fn mean_and_sample_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, ss / (n - 1) as f64)
}

fn effect_size(obs: f64, null: &[f64]) -> StandardizedEffectSize {
    let (null_model_mean, null_model_var) = mean_and_sample_variance(null);
    let null_model_sd = null_model_var.sqrt();
    let z = (null_model_var > 0.0).then(|| (obs - null_model_mean) / null_model_sd);
    let rank = null.iter().filter(|&&v| v < obs).count();
    let p = if null.is_empty() {
        0.0
    } else {
        rank as f64 / null.len() as f64
    };
    StandardizedEffectSize {
        obs,
        null_model_mean,
        null_model_sd,
        z,
        rank,
        p,
    }
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
