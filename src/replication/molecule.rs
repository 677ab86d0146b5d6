//! A single replicating molecule.
//!
//! [`ReplicatingMolecule::replicate`] builds the site arena and engine from
//! externally supplied initiator positions, drives synthesis cycles until
//! every nucleotide is replicated, and records immutable snapshots along
//! the way. Firing probability follows a linear ramp in elapsed time,
//! clamped at the configured ceiling; fork movement per cycle is the
//! truncated product of cycle duration and elongation rate.

use rand::rngs::StdRng;
use tracing::debug;

use crate::params::{BinGeometry, ConfigError, ParameterSet, RecordingSchedule};

use super::bins;
use super::cycle::{CycleCounters, SynthesisCycle};
use super::site::SiteArena;

/// Immutable snapshot of one molecule's replication state.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRecord {
    time: f64,
    fraction_replicated: f64,
    counters: CycleCounters,
    segments: Vec<(usize, usize)>,
    replicated_bins: Vec<(usize, usize)>,
}

impl StateRecord {
    fn capture(engine: &SynthesisCycle, time: f64, geometry: &BinGeometry) -> Self {
        let segments = engine.replicated_segments();
        let replicated_bins = segments
            .iter()
            .map(|&(start, end)| (geometry.bin_of(start), geometry.bin_of(end)))
            .collect();
        Self {
            time,
            fraction_replicated: engine.fraction_replicated(),
            counters: engine.counters(),
            segments,
            replicated_bins,
        }
    }

    /// Elapsed replication time of this snapshot.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Fraction of the molecule replicated at this snapshot.
    #[inline]
    pub fn fraction_replicated(&self) -> f64 {
        self.fraction_replicated
    }

    /// Aggregate state counters at this snapshot.
    #[inline]
    pub fn counters(&self) -> CycleCounters {
        self.counters
    }

    /// Maximal replicated segments, inclusive nucleotide ranges in
    /// ascending order.
    #[inline]
    pub fn segments(&self) -> &[(usize, usize)] {
        &self.segments
    }

    /// The same segments as inclusive bin-index ranges.
    #[inline]
    pub fn replicated_bins(&self) -> &[(usize, usize)] {
        &self.replicated_bins
    }
}

/// One molecule replicated to completion, with its snapshot history and
/// per-bin statistics.
pub struct ReplicatingMolecule {
    seq_length: usize,
    elapsed_time: f64,
    engine: SynthesisCycle,
    records: Vec<StateRecord>,
    right_fork_frequency: Vec<f64>,
    initiations_in_bins: Vec<u32>,
    terminations_in_bins: Vec<u32>,
    replication_time_in_bins: Vec<f64>,
}

impl ReplicatingMolecule {
    /// Replicate a molecule to completion.
    ///
    /// `initiators` must be sorted, non-overlapping, and pre-filtered
    /// against any suppression intervals; `rng` is the molecule's private
    /// random stream, so a fixed seed reproduces the run exactly.
    pub fn replicate(
        initiators: &[usize],
        seq_length: usize,
        params: &ParameterSet,
        geometry: BinGeometry,
        schedule: &RecordingSchedule,
        rng: &mut StdRng,
    ) -> Result<Self, ConfigError> {
        let arena = SiteArena::new(initiators, seq_length)?;
        let mut engine = SynthesisCycle::new(arena);
        let stride = params.fork_stride();
        let time_per_cycle = params.time_per_cycle();
        let mut elapsed = 0.0;
        let mut records = vec![StateRecord::capture(&engine, 0.0, &geometry)];

        match schedule {
            RecordingSchedule::AtTimes { start, interval } => {
                let mut next_target = *start;
                while engine.nucleotides_replicated() < seq_length {
                    let p = params.firing_probability(elapsed);
                    engine.step(p, stride, rng);
                    elapsed += time_per_cycle;
                    if elapsed >= next_target {
                        records.push(StateRecord::capture(&engine, elapsed, &geometry));
                        while next_target <= elapsed {
                            next_target += interval;
                        }
                    }
                }
                let complete = records
                    .last()
                    .is_some_and(|r| r.counters().nucleotides_replicated == seq_length);
                if !complete {
                    records.push(StateRecord::capture(&engine, elapsed, &geometry));
                }
            }
            RecordingSchedule::AtFractions(targets) => {
                let mut next_index = 0;
                while engine.nucleotides_replicated() < seq_length {
                    let p = params.firing_probability(elapsed);
                    engine.step(p, stride, rng);
                    elapsed += time_per_cycle;
                    let fraction = engine.fraction_replicated();
                    while next_index < targets.len() && fraction >= targets[next_index] {
                        records.push(StateRecord::capture(&engine, elapsed, &geometry));
                        next_index += 1;
                    }
                }
                // The record count is fixed in advance: pad with final
                // complete-state snapshots if replication overshot.
                let expected = targets.len() + 2;
                while records.len() < expected {
                    records.push(StateRecord::capture(&engine, elapsed, &geometry));
                }
                debug_assert_eq!(records.len(), expected);
            }
        }

        let right_fork_frequency = bins::right_fork_frequency(engine.arena(), &geometry);
        let initiations_in_bins = bins::initiation_counts(engine.arena(), &geometry);
        let terminations_in_bins = bins::termination_counts(engine.arena(), &geometry);
        let replication_time_in_bins = bins::replication_time_in_bins(&records, &geometry);

        debug!(
            elapsed,
            initiations = engine.counters().initiations,
            passives = engine.counters().passives,
            "molecule replicated"
        );

        Ok(Self {
            seq_length,
            elapsed_time: elapsed,
            engine,
            records,
            right_fork_frequency,
            initiations_in_bins,
            terminations_in_bins,
            replication_time_in_bins,
        })
    }

    /// Sequence length in nucleotides.
    #[inline]
    pub fn seq_length(&self) -> usize {
        self.seq_length
    }

    /// Total elapsed replication time in minutes.
    #[inline]
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// The recorded snapshots, in increasing time order.
    #[inline]
    pub fn records(&self) -> &[StateRecord] {
        &self.records
    }

    /// Final aggregate counters.
    #[inline]
    pub fn counters(&self) -> CycleCounters {
        self.engine.counters()
    }

    /// Frequency of rightward-moving forks per bin.
    #[inline]
    pub fn right_fork_frequency_in_bins(&self) -> &[f64] {
        &self.right_fork_frequency
    }

    /// Initiations per bin.
    #[inline]
    pub fn initiations_in_bins(&self) -> &[u32] {
        &self.initiations_in_bins
    }

    /// Terminations per bin.
    #[inline]
    pub fn terminations_in_bins(&self) -> &[u32] {
        &self.terminations_in_bins
    }

    /// Time a fork first entered each bin.
    #[inline]
    pub fn replication_time_in_bins(&self) -> &[f64] {
        &self.replication_time_in_bins
    }

    /// The frozen engine, for inspection.
    #[inline]
    pub fn engine(&self) -> &SynthesisCycle {
        &self.engine
    }
}
