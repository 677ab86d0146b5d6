//! Stochastic simulation of DNA replication origin firing and fork
//! progression along a one-dimensional genome.
//!
//! The crate predicts fork-position/time distributions for comparison with
//! single-molecule combing traces and population-averaged polymerase-usage
//! counts. Callers supply initiator positions, a parameter bundle, a genome
//! length, and bin geometry as plain values; the simulation returns
//! per-interval state snapshots and per-bin aggregates. Parsing of sequence,
//! annotation, and experimental count files belongs to the callers.
//!
//! Entry points:
//! - [`ReplicatingMolecule::replicate`] runs one molecule to completion.
//! - [`MoleculePopulation::replicate`] fans an ensemble out across threads.
//!
//! Runs are deterministic given a seed: every molecule owns a private
//! seeded random stream and molecules share no mutable state.

pub mod params;
pub mod replication;

pub use params::{BinGeometry, ConfigError, ParameterSet, RecordingSchedule};
pub use replication::{
    CheckpointAverages, ComplementaryCdfs, ConsistencyError, CycleCounters, MoleculePopulation,
    ObservedMolecule, PotentialSite, ReplicatingMolecule, SiteArena, SiteId, SiteStatus,
    StateRecord, SynthesisCycle,
};

#[cfg(feature = "python-bindings")]
use numpy::IntoPyArray;
#[cfg(feature = "python-bindings")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;
#[cfg(feature = "python-bindings")]
use pyo3::types::PyDict;
#[cfg(feature = "python-bindings")]
use pyo3::wrap_pyfunction;

/// Replicate a population of molecules and return its per-bin averages.
///
/// Every molecule uses the same candidate initiator positions; stochastic
/// firing differentiates the runs. Snapshots are taken every
/// `recording_interval` simulated minutes starting at `recording_start`.
///
/// # Returns
/// A dict of NumPy arrays: `right_fork_frequency`, `initiation_frequency`,
/// `termination_frequency`, `median_replication_time` (per bin),
/// `average_fraction_replicated` (per snapshot index), and `elapsed_times`
/// (per molecule).
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(signature = (
    initiators,
    seq_length,
    n_molecules,
    elongation_rate,
    max_firing_probability_per_min,
    firing_ramp_rate,
    cycle_duration,
    initiator_site_length,
    bin_size,
    recording_start,
    recording_interval,
    seed = 42,
))]
#[allow(clippy::too_many_arguments)]
fn simulate_population<'py>(
    py: Python<'py>,
    initiators: Vec<usize>,
    seq_length: usize,
    n_molecules: usize,
    elongation_rate: u32,
    max_firing_probability_per_min: f64,
    firing_ramp_rate: f64,
    cycle_duration: f64,
    initiator_site_length: usize,
    bin_size: usize,
    recording_start: f64,
    recording_interval: f64,
    seed: u64,
) -> PyResult<&'py PyDict> {
    let params = ParameterSet::new(
        elongation_rate,
        max_firing_probability_per_min,
        firing_ramp_rate,
        cycle_duration,
        initiator_site_length,
    )
    .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let geometry = BinGeometry::new(0, bin_size, seq_length)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let schedule = RecordingSchedule::at_times(recording_start, recording_interval)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let source = move |_rng: &mut rand::rngs::StdRng| initiators.clone();
    let population = MoleculePopulation::replicate(
        n_molecules,
        &source,
        seq_length,
        &params,
        geometry,
        &schedule,
        seed,
    )
    .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let result = PyDict::new(py);
    result.set_item(
        "right_fork_frequency",
        population
            .average_right_fork_frequency_in_bins()
            .into_pyarray(py),
    )?;
    result.set_item(
        "initiation_frequency",
        population
            .average_initiation_frequency_in_bins()
            .into_pyarray(py),
    )?;
    result.set_item(
        "termination_frequency",
        population
            .average_termination_frequency_in_bins()
            .into_pyarray(py),
    )?;
    result.set_item(
        "median_replication_time",
        population
            .median_replication_time_in_bins()
            .into_pyarray(py),
    )?;
    result.set_item(
        "average_fraction_replicated",
        population
            .average_state_trajectory(|record| record.fraction_replicated())
            .into_pyarray(py),
    )?;
    result.set_item("elapsed_times", population.elapsed_times().into_pyarray(py))?;
    Ok(result)
}

/// Python module definition.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn replisim(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(simulate_population, m)?)?;
    Ok(())
}
