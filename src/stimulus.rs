//! Sources and input stimuli.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::bits::BitSignal;
use crate::error::Result;
use crate::io;
use crate::units::SiValue;
use crate::waveform::Waveform;

/// Default rise and fall time for pattern stimuli, in seconds.
pub(crate) const DEFAULT_RAMP: f64 = 5e-12;

/// The type of a source.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// A voltage source.
    #[default]
    Voltage,
    /// A current source.
    Current,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voltage => write!(f, "V"),
            Self::Current => write!(f, "I"),
        }
    }
}

/// A constant source tied between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct DcSource {
    /// The source name. The element name is this prefixed with `V` or `I`.
    #[builder(setter(into))]
    pub name: String,
    /// Whether this is a voltage or current source.
    #[builder(default)]
    pub kind: SourceKind,
    /// The positive node.
    #[builder(setter(into))]
    pub pos: String,
    /// The negative node.
    #[builder(setter(into))]
    pub neg: String,
    /// The source value, in volts or amperes.
    pub value: SiValue,
    /// Whether the source contributes noise. When `false`, the source
    /// is marked `NONOISE`.
    #[builder(default)]
    pub noise: bool,
    /// If set, the average current and power drawn through this source
    /// are extracted over the given window.
    #[builder(default, setter(strip_option))]
    pub extract: Option<ExtractWindow>,
}

impl DcSource {
    /// Creates a builder for a [`DcSource`].
    #[inline]
    pub fn builder() -> DcSourceBuilder {
        DcSourceBuilder::default()
    }

    /// The netlist element name of this source, e.g. `Vdd`.
    pub(crate) fn element(&self) -> String {
        format!("{}{}", self.kind, self.name.to_lowercase())
    }
}

/// The averaging window for supply consumption extraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractWindow {
    /// The window start time. If unset, the start of the simulation.
    pub from: Option<f64>,
    /// The window end time. If unset, the end of the simulation.
    pub to: Option<f64>,
}

impl ExtractWindow {
    /// A window spanning the full simulation.
    pub const fn full() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// A window between the given times.
    pub const fn between(from: f64, to: f64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub(crate) fn start_text(&self) -> String {
        match self.from {
            Some(t) => t.to_string(),
            None => String::from("start"),
        }
    }

    pub(crate) fn stop_text(&self) -> String {
        match self.to {
            Some(t) => t.to_string(),
            None => String::from("end"),
        }
    }
}

/// An input stimulus driving a testbench node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stimulus {
    /// An arbitrary waveform driven through a PWL source.
    Event(EventInput),
    /// A digital pattern driven at a fixed sample rate.
    Pattern(PatternInput),
}

impl Stimulus {
    /// The time of the last scheduled activity, used to infer the
    /// transient stop time.
    pub(crate) fn end_time(&self) -> f64 {
        match self {
            Self::Event(event) => event.waveform.last_t().unwrap_or(0.0),
            Self::Pattern(pattern) => {
                pattern.delay + pattern.words.len() as f64 / pattern.sample_rate
            }
        }
    }
}

/// A waveform stimulus.
///
/// The waveform is written to a stimulus file in the working directory
/// and driven through a PWL source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct EventInput {
    /// The node to drive.
    #[builder(setter(into))]
    pub node: String,
    /// Whether to drive a voltage or a current.
    #[builder(default)]
    pub kind: SourceKind,
    /// The waveform to drive.
    pub waveform: Waveform,
}

impl EventInput {
    /// Creates a builder for an [`EventInput`].
    #[inline]
    pub fn builder() -> EventInputBuilder {
        EventInputBuilder::default()
    }

    /// The name of this stimulus's PWL file.
    pub(crate) fn file_name(&self) -> String {
        format!("{}_stim.txt", sanitize_node(&self.node))
    }

    /// Writes the PWL file referenced by the generated netlist.
    pub(crate) fn write_file(&self, work_dir: &Path) -> Result<PathBuf> {
        let path = work_dir.join(self.file_name());
        let file = io::create_file(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for point in self.waveform.values() {
            writer.write_record([point.t().to_string(), point.x().to_string()])?;
        }
        writer.flush()?;
        Ok(path)
    }
}

/// A digital pattern stimulus.
///
/// Words are driven MSB first onto a bus at a fixed sample rate using
/// the simulator's pattern source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct PatternInput {
    /// The bus to drive, e.g. `DIN<3:0>`, or a scalar node for
    /// single-bit patterns.
    #[builder(setter(into))]
    pub bus: String,
    /// The words to drive, in order.
    pub words: Vec<BitSignal>,
    /// The number of words driven per second.
    pub sample_rate: f64,
    /// The delay before the first word, in seconds.
    #[builder(default)]
    pub delay: f64,
    /// The high voltage level.
    #[builder(default = "1.0")]
    pub vhi: f64,
    /// The low voltage level.
    #[builder(default)]
    pub vlo: f64,
    /// The rise time, in seconds.
    #[builder(default = "DEFAULT_RAMP")]
    pub trise: f64,
    /// The fall time, in seconds.
    #[builder(default = "DEFAULT_RAMP")]
    pub tfall: f64,
}

impl PatternInput {
    /// Creates a builder for a [`PatternInput`].
    #[inline]
    pub fn builder() -> PatternInputBuilder {
        PatternInputBuilder::default()
    }
}

/// Strips the characters in node names that cannot appear in file names.
pub(crate) fn sanitize_node(node: &str) -> String {
    node.replace(['<', '>'], "").replace('.', "_")
}
