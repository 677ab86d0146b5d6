//! Replication-dynamics module: origin firing and fork progression for one
//! linear molecule, and ensembles thereof.
//!
//! This module provides:
//! - PotentialSite / SiteArena: origin-site state machine in an indexed arena
//! - SynthesisCycle: the two-phase per-interval stepping engine
//! - ReplicatingMolecule / StateRecord: one molecule driven to completion
//!   with snapshot history
//! - bins: pure per-bin statistics over frozen state
//! - MoleculePopulation: parallel ensembles and comparison statistics

pub mod bins;
pub mod cycle;
pub mod molecule;
pub mod population;
pub mod site;

pub use cycle::{ConsistencyError, CycleCounters, SynthesisCycle};
pub use molecule::{ReplicatingMolecule, StateRecord};
pub use population::{
    inter_centroid_distances_of, CheckpointAverages, ComplementaryCdfs, MoleculePopulation,
    ObservedMolecule,
};
pub use site::{PotentialSite, SiteArena, SiteId, SiteStatus};
