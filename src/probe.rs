//! Output probes.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::log::*;
use crate::stimulus::sanitize_node;

/// The default logic threshold voltage.
pub(crate) const DEFAULT_VTH: f64 = 0.5;

/// A simulator output to record.
///
/// Each probed node writes its own output file in the working directory,
/// named after the node and the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Probe {
    /// The key under which this probe's data appears in the simulation
    /// output.
    #[builder(setter(into))]
    pub name: String,
    /// The nodes to record.
    pub nodes: Vec<String>,
    /// What to record at each node.
    pub kind: ProbeKind,
}

impl Probe {
    /// Creates a builder for a [`Probe`].
    #[inline]
    pub fn builder() -> ProbeBuilder {
        ProbeBuilder::default()
    }

    /// The name of the output file for `node`.
    pub(crate) fn file_name(&self, node: &str) -> String {
        format!("{}_{}.txt", sanitize_node(node), self.name)
    }
}

/// The kind of data a probe records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeKind {
    /// The full waveform at each node.
    Event,
    /// Bus words sampled on trigger-clock edges.
    Sampled(SampledProbe),
    /// Threshold-crossing timestamps.
    Crossings(CrossingProbe),
}

/// Settings for a clock-sampled bus probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct SampledProbe {
    /// The clock driving the sampling.
    pub trigger: Trigger,
    /// The logic threshold voltage: a sampled value at or above `vth`
    /// reads as 1.
    #[builder(default = "DEFAULT_VTH")]
    pub vth: f64,
    /// The clock edge to sample on.
    #[builder(default)]
    pub edge: SampleEdge,
    /// Blanking time before sampling begins, in seconds.
    #[builder(default)]
    pub delay: f64,
    /// Treat the lowest bus index as the most significant bit.
    #[builder(default)]
    pub big_endian: bool,
}

impl SampledProbe {
    /// Creates a builder for a [`SampledProbe`].
    #[inline]
    pub fn builder() -> SampledProbeBuilder {
        SampledProbeBuilder::default()
    }
}

/// The clock node(s) a sampled probe is triggered by.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// A single clock node sampling every probed node.
    Common(String),
    /// One clock node per probed node.
    PerNode(Vec<String>),
}

impl Trigger {
    /// The trigger for the `idx`-th of `n_nodes` probed nodes.
    ///
    /// If the trigger list does not match the node list, the first
    /// trigger is used for every node.
    pub(crate) fn for_node(&self, idx: usize, n_nodes: usize) -> &str {
        match self {
            Self::Common(trigger) => trigger,
            Self::PerNode(triggers) => {
                if triggers.len() == n_nodes {
                    &triggers[idx]
                } else {
                    warn!(
                        "{} triggers given for {} probed nodes; sampling all nodes with the first trigger",
                        triggers.len(),
                        n_nodes
                    );
                    &triggers[0]
                }
            }
        }
    }
}

/// The clock edge a sampled probe samples on.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SampleEdge {
    /// Sample on rising clock edges.
    #[default]
    Rising,
    /// Sample on falling clock edges.
    Falling,
    /// Sample on both clock edges.
    Both,
}

impl SampleEdge {
    /// The extraction function sampling on this edge.
    pub(crate) fn extract_fn(&self) -> &'static str {
        match self {
            Self::Rising => "xup",
            Self::Falling => "xdown",
            Self::Both => "tcross",
        }
    }
}

/// Settings for a threshold-crossing probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct CrossingProbe {
    /// The threshold voltage.
    #[builder(default = "DEFAULT_VTH")]
    pub vth: f64,
    /// The crossings to record.
    #[builder(default)]
    pub edge: CrossingKind,
}

impl CrossingProbe {
    /// Creates a builder for a [`CrossingProbe`].
    #[inline]
    pub fn builder() -> CrossingProbeBuilder {
        CrossingProbeBuilder::default()
    }
}

/// The kind of crossing event a crossing probe records.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CrossingKind {
    /// Timestamps of upward threshold crossings.
    #[default]
    Rising,
    /// Timestamps of downward threshold crossings.
    Falling,
    /// Timestamps of crossings in either direction.
    Both,
    /// Rise times at the simulator's default measurement thresholds.
    RiseTime,
    /// Fall times at the simulator's default measurement thresholds.
    FallTime,
}

impl CrossingKind {
    /// The extraction function recording this kind of crossing.
    pub(crate) fn extract_fn(&self) -> &'static str {
        match self {
            Self::Rising => "xup",
            Self::Falling => "xdown",
            Self::Both => "tcross",
            Self::RiseTime => "trise",
            Self::FallTime => "tfall",
        }
    }

    /// Whether the extraction function takes a threshold argument.
    pub(crate) fn takes_vth(&self) -> bool {
        !matches!(self, Self::RiseTime | Self::FallTime)
    }
}
