//! An ensemble of independently replicating molecules.
//!
//! All molecules in a population share the same parameters and initiator
//! distribution but draw from independent random streams; molecule `i` is
//! seeded with `seed + i`, so a population is reproducible from a single
//! seed. Molecules never share mutable state, which makes the ensemble loop
//! embarrassingly parallel: rayon fans the runs out and collecting the
//! results is the only merge.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::params::{BinGeometry, ConfigError, ParameterSet, RecordingSchedule};

use super::molecule::{ReplicatingMolecule, StateRecord};

/// One externally observed (combed) molecule used as a comparison target.
///
/// Supplied as plain values by out-of-scope parsing code; distances are in
/// nucleotides.
#[derive(Clone, Debug)]
pub struct ObservedMolecule {
    /// Fraction of the observed molecule that was replicated.
    pub fraction_replicated: f64,
    /// Observed molecule length in nucleotides.
    pub length: usize,
    /// Distances between the centroids of adjacent replicated segments.
    pub inter_origin_distances: Vec<usize>,
}

/// Population averages at one observed-molecule checkpoint.
#[derive(Clone, Debug)]
pub struct CheckpointAverages {
    /// Index of the reference molecule in the observed list.
    pub observed_index: usize,
    /// Average initiations per molecule at this checkpoint.
    pub initiations: f64,
    /// Average terminations per molecule.
    pub terminations: f64,
    /// Average passively replicated sites per molecule.
    pub passives: f64,
    /// Average live forks per molecule.
    pub forks: f64,
    /// Average closures per molecule.
    pub closures: f64,
    /// Average elapsed time.
    pub time: f64,
    /// Average fraction replicated.
    pub fraction_replicated: f64,
    /// Weight of this checkpoint: observed length over simulated length.
    pub weight: f64,
    /// Simulated inter-centroid distances aggregated over the population.
    pub inter_centroid_distances: Vec<usize>,
}

/// Complementary CDFs of inter-origin distances, observed and predicted at
/// matching fractions replicated.
#[derive(Clone, Debug, PartialEq)]
pub struct ComplementaryCdfs {
    /// Observed molecules' distance CCDF.
    pub observed: Vec<f64>,
    /// Simulation-predicted CCDF, weighted by observed molecule length.
    pub predicted: Vec<f64>,
}

/// A population of replicated molecules and its aggregate statistics.
pub struct MoleculePopulation {
    molecules: Vec<ReplicatingMolecule>,
    geometry: BinGeometry,
    seq_length: usize,
}

impl MoleculePopulation {
    /// Replicate `n_molecules` independent molecules in parallel.
    ///
    /// `initiator_source` draws one molecule's initiator positions from the
    /// shared distribution; it is called once per molecule with that
    /// molecule's private, seeded random stream.
    pub fn replicate<F>(
        n_molecules: usize,
        initiator_source: &F,
        seq_length: usize,
        params: &ParameterSet,
        geometry: BinGeometry,
        schedule: &RecordingSchedule,
        seed: u64,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&mut StdRng) -> Vec<usize> + Sync,
    {
        if n_molecules == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        debug!(n_molecules, seed, "replicating molecule population");
        let molecules = (0..n_molecules)
            .into_par_iter()
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                let initiators = initiator_source(&mut rng);
                ReplicatingMolecule::replicate(
                    &initiators,
                    seq_length,
                    params,
                    geometry,
                    schedule,
                    &mut rng,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            molecules,
            geometry,
            seq_length,
        })
    }

    /// The replicated molecules.
    #[inline]
    pub fn molecules(&self) -> &[ReplicatingMolecule] {
        &self.molecules
    }

    /// Number of molecules in the population.
    #[inline]
    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    /// Whether the population is empty. Never true for a constructed
    /// population; present for API completeness.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    fn average_in_bins<T: Copy + Into<f64>>(
        &self,
        per_molecule: impl Fn(&ReplicatingMolecule) -> &[T],
    ) -> Vec<f64> {
        let n = self.molecules.len() as f64;
        let mut averages = vec![0.0; self.geometry.n_bins()];
        for molecule in &self.molecules {
            for (average, &value) in averages.iter_mut().zip(per_molecule(molecule)) {
                *average += value.into();
            }
        }
        for average in &mut averages {
            *average /= n;
        }
        averages
    }

    /// Rightward-fork frequency per bin, averaged over the population.
    pub fn average_right_fork_frequency_in_bins(&self) -> Vec<f64> {
        self.average_in_bins(|m| m.right_fork_frequency_in_bins())
    }

    /// Initiation frequency per bin, averaged over the population.
    pub fn average_initiation_frequency_in_bins(&self) -> Vec<f64> {
        self.average_in_bins(|m| m.initiations_in_bins())
    }

    /// Termination frequency per bin, averaged over the population.
    pub fn average_termination_frequency_in_bins(&self) -> Vec<f64> {
        self.average_in_bins(|m| m.terminations_in_bins())
    }

    /// Mean time of first replication per bin.
    pub fn average_replication_time_in_bins(&self) -> Vec<f64> {
        self.average_in_bins(|m| m.replication_time_in_bins())
    }

    /// Median time of first replication per bin.
    pub fn median_replication_time_in_bins(&self) -> Vec<f64> {
        (0..self.geometry.n_bins())
            .map(|bin| {
                let mut times: Vec<f64> = self
                    .molecules
                    .iter()
                    .map(|m| m.replication_time_in_bins()[bin])
                    .collect();
                times.sort_by(|a, b| a.total_cmp(b));
                times[times.len() / 2]
            })
            .collect()
    }

    /// Fraction of molecules whose snapshot `record_index` had replicated
    /// each bin. Molecules with shorter histories contribute their final
    /// snapshot.
    ///
    /// For a time schedule, map a query time to an index with
    /// [`RecordingSchedule::record_index_at`].
    pub fn average_fraction_replicated_in_bins(&self, record_index: usize) -> Vec<f64> {
        let mut replicated = vec![0u32; self.geometry.n_bins()];
        for molecule in &self.molecules {
            let records = molecule.records();
            let record = &records[record_index.min(records.len() - 1)];
            for &(first, last) in record.replicated_bins() {
                for count in replicated.iter_mut().take(last + 1).skip(first) {
                    *count += 1;
                }
            }
        }
        let n = self.molecules.len() as f64;
        replicated.into_iter().map(|c| c as f64 / n).collect()
    }

    /// Average of a state variable across the population at each snapshot
    /// index. Shorter histories are padded by repeating their final record.
    pub fn average_state_trajectory<F>(&self, state_variable: F) -> Vec<f64>
    where
        F: Fn(&StateRecord) -> f64,
    {
        let max_records = self
            .molecules
            .iter()
            .map(|m| m.records().len())
            .max()
            .unwrap_or(0);
        let n = self.molecules.len() as f64;
        (0..max_records)
            .map(|index| {
                let total: f64 = self
                    .molecules
                    .iter()
                    .map(|m| {
                        let records = m.records();
                        state_variable(&records[index.min(records.len() - 1)])
                    })
                    .sum();
                total / n
            })
            .collect()
    }

    /// Total replication time of each molecule.
    pub fn elapsed_times(&self) -> Vec<f64> {
        self.molecules.iter().map(|m| m.elapsed_time()).collect()
    }

    /// Population averages at each observed-molecule checkpoint.
    ///
    /// The population must have been run with a fraction-replicated
    /// schedule holding one target per observed molecule, so each molecule
    /// carries `observed.len() + 2` records.
    pub fn checkpoint_averages(
        &self,
        observed: &[ObservedMolecule],
    ) -> Result<Vec<CheckpointAverages>, ConfigError> {
        let expected = observed.len() + 2;
        for molecule in &self.molecules {
            if molecule.records().len() != expected {
                return Err(ConfigError::RecordCountMismatch {
                    expected,
                    found: molecule.records().len(),
                });
            }
        }

        let n = self.molecules.len() as f64;
        Ok(observed
            .iter()
            .enumerate()
            .map(|(index, reference)| {
                let mut initiations = 0.0;
                let mut terminations = 0.0;
                let mut passives = 0.0;
                let mut forks = 0.0;
                let mut closures = 0.0;
                let mut time = 0.0;
                let mut fraction_replicated = 0.0;
                let mut inter_centroid_distances = Vec::new();
                for molecule in &self.molecules {
                    // Record 0 is the time-zero snapshot; checkpoint i is
                    // record i + 1.
                    let record = &molecule.records()[index + 1];
                    let counters = record.counters();
                    initiations += counters.initiations as f64;
                    terminations += counters.terminations as f64;
                    passives += counters.passives as f64;
                    forks += counters.forks as f64;
                    closures += counters.closures as f64;
                    time += record.time();
                    fraction_replicated += record.fraction_replicated();
                    inter_centroid_distances.extend(inter_centroid_distances_of(
                        record.segments(),
                        self.seq_length,
                    ));
                }
                CheckpointAverages {
                    observed_index: index,
                    initiations: initiations / n,
                    terminations: terminations / n,
                    passives: passives / n,
                    forks: forks / n,
                    closures: closures / n,
                    time: time / n,
                    fraction_replicated: fraction_replicated / n,
                    weight: reference.length as f64 / self.seq_length as f64,
                    inter_centroid_distances,
                }
            })
            .collect())
    }

    /// Complementary CDFs of inter-origin distances: observed molecules
    /// against the simulation at matching fractions replicated.
    ///
    /// `filter` restricts which checkpoints enter the comparison (for
    /// example a fraction-replicated window); each simulated distance is
    /// weighted by its checkpoint's observed molecule length. Thresholds
    /// are `0, distance_interval, 2 × distance_interval, …` nucleotides.
    pub fn predicted_vs_observed_ccdf<F>(
        &self,
        observed: &[ObservedMolecule],
        filter: F,
        n_intervals: usize,
        distance_interval: usize,
    ) -> Result<ComplementaryCdfs, ConfigError>
    where
        F: Fn(&CheckpointAverages) -> bool,
    {
        let averages = self.checkpoint_averages(observed)?;
        let filtered: Vec<&CheckpointAverages> =
            averages.iter().filter(|a| filter(a)).collect();

        let total_weight: f64 = filtered
            .iter()
            .map(|a| a.weight * a.inter_centroid_distances.len() as f64)
            .sum();
        let observed_distances: Vec<usize> = filtered
            .iter()
            .flat_map(|a| {
                observed[a.observed_index]
                    .inter_origin_distances
                    .iter()
                    .copied()
            })
            .collect();

        let mut observed_ccdf = Vec::with_capacity(n_intervals);
        let mut predicted_ccdf = Vec::with_capacity(n_intervals);
        for interval in 0..n_intervals {
            let threshold = interval * distance_interval;
            let observed_tail = observed_distances
                .iter()
                .filter(|&&d| d >= threshold)
                .count();
            observed_ccdf.push(if observed_distances.is_empty() {
                0.0
            } else {
                observed_tail as f64 / observed_distances.len() as f64
            });
            let predicted_tail: f64 = filtered
                .iter()
                .map(|a| {
                    a.weight
                        * a.inter_centroid_distances
                            .iter()
                            .filter(|&&d| d >= threshold)
                            .count() as f64
                })
                .sum();
            predicted_ccdf.push(if total_weight == 0.0 {
                0.0
            } else {
                predicted_tail / total_weight
            });
        }
        Ok(ComplementaryCdfs {
            observed: observed_ccdf,
            predicted: predicted_ccdf,
        })
    }
}

/// Distances between the centroids of adjacent interior replicated
/// segments.
///
/// Segments touching either molecule end are dropped first: they have no
/// origin centroid of their own in a combing trace.
pub fn inter_centroid_distances_of(
    segments: &[(usize, usize)],
    seq_length: usize,
) -> Vec<usize> {
    let mut interior = segments;
    if let Some(&(start, _)) = interior.first() {
        if start == 0 {
            interior = &interior[1..];
        }
    }
    if let Some(&(_, end)) = interior.last() {
        if end == seq_length - 1 {
            interior = &interior[..interior.len() - 1];
        }
    }
    if interior.len() < 2 {
        return Vec::new();
    }
    interior
        .windows(2)
        .map(|pair| {
            let (a_start, a_end) = pair[0];
            let (b_start, b_end) = pair[1];
            (b_start + b_end) / 2 - (a_start + a_end) / 2
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParameterSet {
        ParameterSet::new(600, 0.4, 0.1, 0.5, 300).unwrap()
    }

    fn geometry() -> BinGeometry {
        BinGeometry::new(0, 300, 12_000).unwrap()
    }

    fn fixed_initiators(_rng: &mut StdRng) -> Vec<usize> {
        vec![900, 2_500, 4_700, 7_000, 9_500, 11_400]
    }

    fn population(n: usize, seed: u64, schedule: &RecordingSchedule) -> MoleculePopulation {
        MoleculePopulation::replicate(
            n,
            &fixed_initiators,
            12_000,
            &params(),
            geometry(),
            schedule,
            seed,
        )
        .unwrap()
    }

    #[test]
    fn test_single_molecule_population_matches_its_molecule() {
        let schedule = RecordingSchedule::at_times(0.5, 0.5).unwrap();
        let population = population(1, 5, &schedule);
        let molecule = &population.molecules()[0];
        assert_eq!(
            population.average_right_fork_frequency_in_bins(),
            molecule.right_fork_frequency_in_bins()
        );
        let initiations: Vec<f64> = molecule
            .initiations_in_bins()
            .iter()
            .map(|&c| c as f64)
            .collect();
        assert_eq!(population.average_initiation_frequency_in_bins(), initiations);
        assert_eq!(
            population.median_replication_time_in_bins(),
            molecule.replication_time_in_bins()
        );
    }

    #[test]
    fn test_population_is_reproducible_from_its_seed() {
        let schedule = RecordingSchedule::at_times(0.5, 0.5).unwrap();
        let a = population(4, 17, &schedule);
        let b = population(4, 17, &schedule);
        assert_eq!(a.elapsed_times(), b.elapsed_times());
        assert_eq!(
            a.average_right_fork_frequency_in_bins(),
            b.average_right_fork_frequency_in_bins()
        );
        // Molecules within the population use distinct streams.
        let times = a.elapsed_times();
        assert!(times.windows(2).any(|w| w[0] != w[1]) || times.len() < 2);
    }

    #[test]
    fn test_trajectories_align_and_pad() {
        let schedule = RecordingSchedule::at_times(0.5, 0.5).unwrap();
        let population = population(5, 23, &schedule);
        let max_records = population
            .molecules()
            .iter()
            .map(|m| m.records().len())
            .max()
            .unwrap();
        let trajectory = population
            .average_state_trajectory(|record| record.fraction_replicated());
        assert_eq!(trajectory.len(), max_records);
        // Fraction replicated is non-decreasing in every molecule, so its
        // average trajectory is too, and it ends fully replicated.
        for pair in trajectory.windows(2) {
            assert!(pair[1] + 1e-12 >= pair[0]);
        }
        assert!((trajectory.last().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_fraction_replicated_in_bins() {
        let schedule = RecordingSchedule::at_times(0.5, 0.5).unwrap();
        let population = population(3, 29, &schedule);
        let at_start = population.average_fraction_replicated_in_bins(0);
        assert!(at_start.iter().all(|&f| f == 0.0));
        // Far past every molecule's history: every bin replicated in every
        // molecule.
        let at_end = population.average_fraction_replicated_in_bins(10_000);
        assert!(at_end.iter().all(|&f| (f - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_inter_centroid_distances_drop_terminal_segments() {
        let segments = [(0, 10), (20, 30), (40, 52), (60, 99)];
        assert_eq!(inter_centroid_distances_of(&segments, 100), vec![21]);
        // Nothing left once terminal segments are dropped.
        assert!(inter_centroid_distances_of(&[(0, 10), (60, 99)], 100).is_empty());
        // A single interior segment has no neighbor to measure against.
        assert!(inter_centroid_distances_of(&[(20, 30)], 100).is_empty());
    }

    #[test]
    fn test_checkpoint_averages_align_to_observed_molecules() {
        let observed: Vec<ObservedMolecule> = (1..=10)
            .map(|i| ObservedMolecule {
                fraction_replicated: i as f64 * 0.1,
                length: 6_000,
                inter_origin_distances: vec![1_000, 2_000],
            })
            .collect();
        let targets: Vec<f64> = observed.iter().map(|m| m.fraction_replicated).collect();
        let schedule = RecordingSchedule::at_fractions(targets).unwrap();
        let population = population(3, 37, &schedule);

        let averages = population.checkpoint_averages(&observed).unwrap();
        assert_eq!(averages.len(), 10);
        for (i, average) in averages.iter().enumerate() {
            assert_eq!(average.observed_index, i);
            assert!((average.weight - 0.5).abs() < 1e-12);
            assert!(average.fraction_replicated + 1e-12 >= observed[i].fraction_replicated);
        }
        // Averages are non-decreasing along the checkpoints.
        for pair in averages.windows(2) {
            assert!(pair[1].initiations + 1e-9 >= pair[0].initiations);
        }
    }

    #[test]
    fn test_checkpoint_averages_reject_mismatched_schedules() {
        let schedule = RecordingSchedule::at_fractions(vec![0.5]).unwrap();
        let population = population(2, 43, &schedule);
        let observed = vec![
            ObservedMolecule {
                fraction_replicated: 0.5,
                length: 6_000,
                inter_origin_distances: vec![],
            };
            3
        ];
        assert!(matches!(
            population.checkpoint_averages(&observed),
            Err(ConfigError::RecordCountMismatch { expected: 5, .. })
        ));
    }

    #[test]
    fn test_ccdf_is_monotone_and_starts_at_one() {
        let observed: Vec<ObservedMolecule> = (1..=10)
            .map(|i| ObservedMolecule {
                fraction_replicated: i as f64 * 0.09,
                length: 12_000,
                inter_origin_distances: vec![500 * i, 1_000 * i],
            })
            .collect();
        let targets: Vec<f64> = observed.iter().map(|m| m.fraction_replicated).collect();
        let schedule = RecordingSchedule::at_fractions(targets).unwrap();
        let population = population(4, 53, &schedule);

        let cdfs = population
            .predicted_vs_observed_ccdf(&observed, |_| true, 20, 1_000)
            .unwrap();
        assert_eq!(cdfs.observed.len(), 20);
        assert_eq!(cdfs.observed[0], 1.0);
        for pair in cdfs.observed.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
        for pair in cdfs.predicted.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
        assert!(cdfs.predicted[0] <= 1.0 + 1e-12);

        // A filter that excludes everything yields empty (all-zero) CCDFs.
        let empty = population
            .predicted_vs_observed_ccdf(&observed, |_| false, 5, 1_000)
            .unwrap();
        assert!(empty.observed.iter().all(|&v| v == 0.0));
        assert!(empty.predicted.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_molecules_is_rejected() {
        let schedule = RecordingSchedule::at_times(0.5, 0.5).unwrap();
        assert!(matches!(
            MoleculePopulation::replicate(
                0,
                &fixed_initiators,
                12_000,
                &params(),
                geometry(),
                &schedule,
                1,
            ),
            Err(ConfigError::EmptyPopulation)
        ));
    }
}
