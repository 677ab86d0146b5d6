//! Replication parameters, bin geometry, and snapshot schedules.
//!
//! All configuration is carried by explicit values handed to constructors;
//! there is no process-wide state and nothing is read from files here.
//! Constructors validate eagerly and return [`ConfigError`] instead of
//! clamping bad input.

use thiserror::Error;

/// Errors raised by the validating constructors in this module and by
/// molecule construction on degenerate input.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Elongation rate of zero would stall every fork.
    #[error("elongation rate must be positive")]
    ElongationRate,
    /// Cycle duration must be a positive, finite number of minutes.
    #[error("cycle duration must be positive and finite (got {0})")]
    CycleDuration(f64),
    /// The firing-probability ceiling must be positive and finite.
    #[error("max firing probability per minute must be positive and finite (got {0})")]
    MaxFiringProbability(f64),
    /// The per-cycle firing probability at the ramp ceiling must not exceed 1.
    #[error("per-cycle firing probability {0} exceeds 1; lower the cycle duration or the ceiling")]
    FiringProbabilityAboveOne(f64),
    /// The ramp rate must be strictly positive or the simulation never fires.
    #[error("firing ramp rate must be positive and finite (got {0})")]
    RampRate(f64),
    /// Initiator windows of zero length are meaningless.
    #[error("initiator site length must be positive")]
    InitiatorSiteLength,
    /// Fork movement truncates to zero nucleotides per cycle.
    #[error("cycle duration {cycle} min at {rate} nt/min moves forks zero whole nucleotides")]
    ZeroStride { cycle: f64, rate: u32 },
    /// A molecule of zero length cannot replicate.
    #[error("sequence length must be positive")]
    EmptySequence,
    /// At least one initiator is required for replication to ever start.
    #[error("initiator position list is empty")]
    NoInitiators,
    /// Initiator positions must be strictly ascending and inside the sequence.
    #[error("initiator position {0} is out of range or out of order")]
    InitiatorPosition(usize),
    /// Bins of zero width cannot aggregate anything.
    #[error("bin size must be positive")]
    BinSize,
    /// The aggregated range must hold a whole number of bins.
    #[error("{length} nt from offset {offset} is not a whole number of {bin_size}-nt bins")]
    BinAlignment {
        length: usize,
        offset: usize,
        bin_size: usize,
    },
    /// Snapshot times must advance.
    #[error("recording interval must be positive and finite (got {0})")]
    RecordingInterval(f64),
    /// Fraction-replicated targets must be non-decreasing within [0, 1].
    #[error("fraction-replicated target {0} is out of range or out of order")]
    FractionTarget(f64),
    /// A comparison query assumed a different snapshot count than the run produced.
    #[error("expected {expected} recorded states per molecule, found {found}")]
    RecordCountMismatch { expected: usize, found: usize },
    /// Population statistics over zero molecules are undefined.
    #[error("population must contain at least one molecule")]
    EmptyPopulation,
}

/// Immutable bundle of replication parameters.
///
/// Mirrors the knobs of the firing/elongation model: fork speed, the linear
/// firing-probability ramp and its ceiling, the synthesis-cycle duration,
/// and the initiator window length used by upstream site selection.
#[derive(Clone, Debug)]
pub struct ParameterSet {
    elongation_rate: u32,
    max_firing_probability_per_min: f64,
    firing_ramp_rate: f64,
    cycle_duration: f64,
    initiator_site_length: usize,
}

impl ParameterSet {
    /// Create a validated parameter set.
    ///
    /// # Arguments
    /// * `elongation_rate` - fork velocity in nucleotides per minute
    /// * `max_firing_probability_per_min` - ceiling of the firing ramp
    /// * `firing_ramp_rate` - linear rate of increase of firing probability
    /// * `cycle_duration` - length of one synthesis cycle in minutes
    /// * `initiator_site_length` - window length of one initiator site in nt
    pub fn new(
        elongation_rate: u32,
        max_firing_probability_per_min: f64,
        firing_ramp_rate: f64,
        cycle_duration: f64,
        initiator_site_length: usize,
    ) -> Result<Self, ConfigError> {
        if elongation_rate == 0 {
            return Err(ConfigError::ElongationRate);
        }
        if !cycle_duration.is_finite() || cycle_duration <= 0.0 {
            return Err(ConfigError::CycleDuration(cycle_duration));
        }
        if !max_firing_probability_per_min.is_finite() || max_firing_probability_per_min <= 0.0 {
            return Err(ConfigError::MaxFiringProbability(
                max_firing_probability_per_min,
            ));
        }
        let ceiling = cycle_duration * max_firing_probability_per_min;
        if ceiling > 1.0 {
            return Err(ConfigError::FiringProbabilityAboveOne(ceiling));
        }
        if !firing_ramp_rate.is_finite() || firing_ramp_rate <= 0.0 {
            return Err(ConfigError::RampRate(firing_ramp_rate));
        }
        if initiator_site_length == 0 {
            return Err(ConfigError::InitiatorSiteLength);
        }
        let params = Self {
            elongation_rate,
            max_firing_probability_per_min,
            firing_ramp_rate,
            cycle_duration,
            initiator_site_length,
        };
        if params.fork_stride() == 0 {
            return Err(ConfigError::ZeroStride {
                cycle: cycle_duration,
                rate: elongation_rate,
            });
        }
        Ok(params)
    }

    /// Fork velocity in nucleotides per minute.
    #[inline]
    pub fn elongation_rate(&self) -> u32 {
        self.elongation_rate
    }

    /// Ceiling of the firing-probability ramp, per minute.
    #[inline]
    pub fn max_firing_probability_per_min(&self) -> f64 {
        self.max_firing_probability_per_min
    }

    /// Linear rate of increase of the firing probability.
    #[inline]
    pub fn firing_ramp_rate(&self) -> f64 {
        self.firing_ramp_rate
    }

    /// Length of one synthesis cycle in minutes.
    #[inline]
    pub fn cycle_duration(&self) -> f64 {
        self.cycle_duration
    }

    /// Window length of one initiator site in nucleotides.
    #[inline]
    pub fn initiator_site_length(&self) -> usize {
        self.initiator_site_length
    }

    /// Whole nucleotides of fork movement per cycle, truncated.
    pub fn fork_stride(&self) -> usize {
        (self.cycle_duration * self.elongation_rate as f64) as usize
    }

    /// Simulated minutes consumed by one cycle.
    ///
    /// Derived from the truncated stride so elapsed time and fork positions
    /// stay mutually consistent.
    pub fn time_per_cycle(&self) -> f64 {
        self.fork_stride() as f64 / self.elongation_rate as f64
    }

    /// Per-potential firing probability for the cycle starting at `elapsed`.
    ///
    /// Linear ramp clamped at the configured ceiling:
    /// `p = cycle_duration × elapsed × ramp_rate` until
    /// `elapsed × ramp_rate` reaches `max_firing_probability_per_min`.
    pub fn firing_probability(&self, elapsed: f64) -> f64 {
        if elapsed * self.firing_ramp_rate > self.max_firing_probability_per_min {
            self.cycle_duration * self.max_firing_probability_per_min
        } else {
            self.cycle_duration * elapsed * self.firing_ramp_rate
        }
    }
}

/// Fixed-size bin layout used to aggregate per-nucleotide results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinGeometry {
    offset: usize,
    bin_size: usize,
    n_bins: usize,
}

impl BinGeometry {
    /// Create a bin layout covering `[offset, seq_length)`.
    ///
    /// The covered range must be a whole number of bins.
    pub fn new(offset: usize, bin_size: usize, seq_length: usize) -> Result<Self, ConfigError> {
        if bin_size == 0 {
            return Err(ConfigError::BinSize);
        }
        if seq_length == 0 || offset >= seq_length {
            return Err(ConfigError::EmptySequence);
        }
        let length = seq_length - offset;
        if length % bin_size != 0 {
            return Err(ConfigError::BinAlignment {
                length,
                offset,
                bin_size,
            });
        }
        Ok(Self {
            offset,
            bin_size,
            n_bins: length / bin_size,
        })
    }

    /// Offset of the first bin in nucleotides.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bin width in nucleotides.
    #[inline]
    pub fn bin_size(&self) -> usize {
        self.bin_size
    }

    /// Number of bins in the layout.
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Bin index containing `position`. Positions past the layout clamp to
    /// the last bin.
    pub fn bin_of(&self, position: usize) -> usize {
        (position.saturating_sub(self.offset) / self.bin_size).min(self.n_bins - 1)
    }
}

/// When snapshots of a replicating molecule are taken.
#[derive(Clone, Debug)]
pub enum RecordingSchedule {
    /// Snapshot at fixed simulation-time checkpoints.
    AtTimes { start: f64, interval: f64 },
    /// Snapshot when the fraction replicated reaches each target, in order.
    ///
    /// The total record count is fixed at `targets + 2`: one time-zero
    /// record, one per target, padded with final complete-state records if
    /// replication overshoots the last target.
    AtFractions(Vec<f64>),
}

impl RecordingSchedule {
    /// Time-checkpoint schedule starting at `start`, every `interval` minutes.
    pub fn at_times(start: f64, interval: f64) -> Result<Self, ConfigError> {
        if !start.is_finite() || start < 0.0 {
            return Err(ConfigError::RecordingInterval(start));
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(ConfigError::RecordingInterval(interval));
        }
        Ok(Self::AtTimes { start, interval })
    }

    /// Fraction-replicated schedule aligned to externally observed molecules.
    ///
    /// Targets must be non-decreasing within `[0, 1]`; ties are allowed and
    /// produce one record each.
    pub fn at_fractions(targets: Vec<f64>) -> Result<Self, ConfigError> {
        let mut previous = 0.0;
        for &t in &targets {
            if !t.is_finite() || t < previous || t > 1.0 {
                return Err(ConfigError::FractionTarget(t));
            }
            previous = t;
        }
        Ok(Self::AtFractions(targets))
    }

    /// Index of the recorded state closest to `time` under a time schedule.
    ///
    /// Follows the recording loop's own arithmetic so callers can map a
    /// query time back onto a snapshot index.
    pub fn record_index_at(&self, time: f64, cycle_duration: f64) -> Option<usize> {
        match self {
            Self::AtTimes { interval, .. } => {
                Some(((time + cycle_duration) / interval) as usize)
            }
            Self::AtFractions(_) => None,
        }
    }

    /// Total number of records a run under this schedule produces, when that
    /// number is fixed in advance.
    pub fn fixed_record_count(&self) -> Option<usize> {
        match self {
            Self::AtTimes { .. } => None,
            Self::AtFractions(targets) => Some(targets.len() + 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_params() -> ParameterSet {
        ParameterSet::new(3000, 0.2, 0.05, 0.5, 300).unwrap()
    }

    #[test]
    fn test_stride_truncates() {
        let params = default_params();
        assert_eq!(params.fork_stride(), 1500);
        let params = ParameterSet::new(2999, 0.2, 0.05, 0.5, 300).unwrap();
        assert_eq!(params.fork_stride(), 1499);
    }

    #[test]
    fn test_firing_probability_ramp_and_clamp() {
        let params = default_params();
        assert_eq!(params.firing_probability(0.0), 0.0);
        let early = params.firing_probability(1.0);
        assert!((early - 0.5 * 1.0 * 0.05).abs() < 1e-12);
        // Past the ceiling (elapsed * ramp > max) the probability is flat.
        let late = params.firing_probability(100.0);
        assert!((late - 0.5 * 0.2).abs() < 1e-12);
        assert!(params.firing_probability(200.0) == late);
    }

    #[test]
    fn test_rejects_degenerate_parameters() {
        assert!(matches!(
            ParameterSet::new(0, 0.2, 0.05, 0.5, 300),
            Err(ConfigError::ElongationRate)
        ));
        assert!(matches!(
            ParameterSet::new(3000, 0.2, 0.0, 0.5, 300),
            Err(ConfigError::RampRate(_))
        ));
        assert!(matches!(
            ParameterSet::new(3000, 4.0, 0.05, 0.5, 300),
            Err(ConfigError::FiringProbabilityAboveOne(_))
        ));
        // 0.0001 min * 3000 nt/min truncates to zero whole nucleotides.
        assert!(matches!(
            ParameterSet::new(3000, 0.2, 0.05, 0.0001, 300),
            Err(ConfigError::ZeroStride { .. })
        ));
    }

    #[test]
    fn test_bin_geometry() {
        let bins = BinGeometry::new(0, 300, 3000).unwrap();
        assert_eq!(bins.n_bins(), 10);
        assert_eq!(bins.bin_of(0), 0);
        assert_eq!(bins.bin_of(299), 0);
        assert_eq!(bins.bin_of(300), 1);
        assert_eq!(bins.bin_of(2999), 9);

        assert!(matches!(
            BinGeometry::new(0, 300, 3001),
            Err(ConfigError::BinAlignment { .. })
        ));
        assert_eq!(BinGeometry::new(0, 0, 3000), Err(ConfigError::BinSize));
    }

    #[test]
    fn test_schedule_validation() {
        assert!(RecordingSchedule::at_times(0.25, 0.25).is_ok());
        assert!(matches!(
            RecordingSchedule::at_times(0.25, 0.0),
            Err(ConfigError::RecordingInterval(_))
        ));
        assert!(RecordingSchedule::at_fractions(vec![0.1, 0.1, 0.9]).is_ok());
        assert!(matches!(
            RecordingSchedule::at_fractions(vec![0.5, 0.2]),
            Err(ConfigError::FractionTarget(_))
        ));
        assert_eq!(
            RecordingSchedule::at_fractions(vec![0.1, 0.5])
                .unwrap()
                .fixed_record_count(),
            Some(4)
        );
    }
}
