//! Pure per-bin statistics over frozen replication state.
//!
//! These functions read completed arenas and recorded snapshots; nothing
//! here touches the stepping loop, so each statistic can be tested in
//! isolation.

use crate::params::BinGeometry;

use super::molecule::StateRecord;
use super::site::{SiteArena, SiteStatus};

/// Add the fractional bin coverage of the inclusive nucleotide segment
/// `[start, end]` to `bins`.
///
/// Interior bins are fully covered and set to 1.0; the two boundary bins
/// receive the covered fraction of their width.
pub fn add_segment_to_bins(start: usize, end: usize, geometry: &BinGeometry, bins: &mut [f64]) {
    let size = geometry.bin_size();
    let start = start.saturating_sub(geometry.offset());
    let end = end.saturating_sub(geometry.offset());
    let bin_start = start / size;
    let bin_end = end / size;
    if bin_start == bin_end {
        bins[bin_start] += (end - start + 1) as f64 / size as f64;
    } else {
        bins[bin_start] += ((bin_start + 1) * size - start) as f64 / size as f64;
        for bin in bins.iter_mut().take(bin_end).skip(bin_start + 1) {
            *bin = 1.0;
        }
        bins[bin_end] += (end - bin_end * size + 1) as f64 / size as f64;
    }
}

/// Frequency of rightward-moving forks per bin for one completed molecule.
///
/// Each terminated site contributed rightward synthesis from its own
/// position to its final rightward fork position; values are 0 or 1 except
/// in the bins where forks started or stopped.
pub fn right_fork_frequency(arena: &SiteArena, geometry: &BinGeometry) -> Vec<f64> {
    let mut bins = vec![0.0; geometry.n_bins()];
    for id in arena.candidate_ids() {
        let site = arena.site(id);
        if site.status() == SiteStatus::Terminated {
            add_segment_to_bins(
                site.position() as usize,
                site.right_fork() as usize,
                geometry,
                &mut bins,
            );
        }
    }
    bins
}

/// Number of initiations per bin for one completed molecule, keyed by the
/// position of each terminated site.
pub fn initiation_counts(arena: &SiteArena, geometry: &BinGeometry) -> Vec<u32> {
    let mut bins = vec![0u32; geometry.n_bins()];
    for id in arena.candidate_ids() {
        let site = arena.site(id);
        if site.status() == SiteStatus::Terminated {
            bins[geometry.bin_of(site.position() as usize)] += 1;
        }
    }
    bins
}

/// Number of terminations per bin for one completed molecule, keyed by the
/// final rightward fork position of each terminated site.
///
/// Events landing in the last bin are excluded: every molecule ends one
/// rightward fork at the boundary, which would otherwise dominate that bin.
pub fn termination_counts(arena: &SiteArena, geometry: &BinGeometry) -> Vec<u32> {
    let mut bins = vec![0u32; geometry.n_bins()];
    for id in arena.candidate_ids() {
        let site = arena.site(id);
        if site.status() == SiteStatus::Terminated {
            let bin = geometry.bin_of(site.right_fork() as usize);
            if bin != geometry.n_bins() - 1 {
                bins[bin] += 1;
            }
        }
    }
    bins
}

/// Time at which a fork first entered each bin, from a molecule's recorded
/// snapshots.
///
/// Resolution is the recording interval; bins are stamped with the time of
/// the first record whose replicated ranges cover them.
pub fn replication_time_in_bins(records: &[StateRecord], geometry: &BinGeometry) -> Vec<f64> {
    let mut times = vec![0.0; geometry.n_bins()];
    for record in records.iter().skip(1) {
        if record.counters().nucleotides_replicated == 0 {
            continue;
        }
        for &(first, last) in record.replicated_bins() {
            for time in times.iter_mut().take(last + 1).skip(first) {
                if *time == 0.0 {
                    *time = record.time();
                }
            }
        }
    }
    times
}
