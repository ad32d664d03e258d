//! Simulation analyses.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// An analysis to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Analysis {
    /// A transient analysis.
    Tran(TranAnalysis),
}

/// A transient analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct TranAnalysis {
    /// The print interval, in seconds.
    pub step: f64,
    /// The stop time, in seconds.
    ///
    /// If unset, the stop time is inferred from the end of the last
    /// scheduled stimulus.
    #[builder(default, setter(strip_option))]
    pub stop: Option<f64>,
    /// Start from user-supplied initial conditions (`UIC`).
    #[builder(default)]
    pub uic: bool,
    /// Transient noise settings. If unset, transient noise is disabled.
    #[builder(default, setter(strip_option))]
    pub noise: Option<TransientNoise>,
}

impl TranAnalysis {
    /// Creates a builder for a [`TranAnalysis`].
    #[inline]
    pub fn builder() -> TranAnalysisBuilder {
        TranAnalysisBuilder::default()
    }
}

/// Transient noise settings.
///
/// Runs the simulation with noise sources active between
/// `fmin` and `fmax`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct TransientNoise {
    /// The minimum noise frequency, in hertz.
    pub fmin: f64,
    /// The maximum noise frequency, in hertz.
    pub fmax: f64,
    /// The random seed. If unset, the simulator chooses a seed.
    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
}

impl TransientNoise {
    /// Creates a builder for a [`TransientNoise`].
    #[inline]
    pub fn builder() -> TransientNoiseBuilder {
        TransientNoiseBuilder::default()
    }
}
