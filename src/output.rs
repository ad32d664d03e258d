//! Parsers for simulator output files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bits::BitSignal;
use crate::error::{EldoError, ErrorSource, Result};
use crate::io;
use crate::log::*;
use crate::probe::{Probe, ProbeKind};
use crate::waveform::{TimePoint, Waveform};

/// The number of header lines preceding data in `.printfile` output.
const EVENT_HEADER_LINES: usize = 2;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[\w']+").expect("failed to compile token regex");
}

/// Parsed data for a single probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeData {
    /// Full waveforms, keyed by node.
    Event(HashMap<String, Waveform>),
    /// Sampled bus words in sample order, keyed by node.
    Sampled(HashMap<String, Vec<BitSignal>>),
    /// Threshold-crossing timestamps, keyed by node.
    Crossings(HashMap<String, Vec<f64>>),
}

impl ProbeData {
    /// The waveforms recorded by an event probe.
    ///
    /// # Panics
    ///
    /// Panics if this is not event data.
    pub fn event(&self) -> &HashMap<String, Waveform> {
        match self {
            Self::Event(data) => data,
            _ => panic!("expected event probe data"),
        }
    }

    /// The bus words recorded by a sampled probe.
    ///
    /// # Panics
    ///
    /// Panics if this is not sampled data.
    pub fn sampled(&self) -> &HashMap<String, Vec<BitSignal>> {
        match self {
            Self::Sampled(data) => data,
            _ => panic!("expected sampled probe data"),
        }
    }

    /// The timestamps recorded by a crossing probe.
    ///
    /// # Panics
    ///
    /// Panics if this is not crossing data.
    pub fn crossings(&self) -> &HashMap<String, Vec<f64>> {
        match self {
            Self::Crossings(data) => data,
            _ => panic!("expected crossing probe data"),
        }
    }
}

/// Supply consumption extracted from the simulator log.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReport {
    /// Average supply currents in amperes, keyed by source.
    pub currents: BTreeMap<String, f64>,
    /// Average supply powers in watts, keyed by source.
    pub powers: BTreeMap<String, f64>,
}

impl PowerReport {
    /// The sum of all extracted supply currents.
    pub fn total_current(&self) -> f64 {
        self.currents.values().sum()
    }

    /// The sum of all extracted supply powers.
    pub fn total_power(&self) -> f64 {
        self.powers.values().sum()
    }

    /// Returns `true` if nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.currents.is_empty() && self.powers.is_empty()
    }
}

impl Log for PowerReport {
    fn log(&self) {
        for (name, value) in self.currents.iter() {
            info!("{name}\tcurrent = {value:e}\tA");
        }
        for (name, value) in self.powers.iter() {
            info!("{name}\tpower   = {value:e}\tW");
        }
        if !self.is_empty() {
            info!("Total\tcurrent = {:e}\tA", self.total_current());
            info!("Total\tpower   = {:e}\tW", self.total_power());
        }
    }
}

/// Parses the output files written for `probe` in `work_dir`.
pub(crate) fn parse_probe(work_dir: &Path, probe: &Probe) -> Result<ProbeData> {
    match &probe.kind {
        ProbeKind::Event => {
            let mut data = HashMap::with_capacity(probe.nodes.len());
            for node in probe.nodes.iter() {
                let path = work_dir.join(probe.file_name(node));
                data.insert(node.clone(), parse_event_file(&path)?);
            }
            Ok(ProbeData::Event(data))
        }
        ProbeKind::Sampled(sampled) => {
            let mut data = HashMap::with_capacity(probe.nodes.len());
            for node in probe.nodes.iter() {
                let path = work_dir.join(probe.file_name(node));
                data.insert(
                    node.clone(),
                    parse_sampled_file(&path, node, sampled.vth, sampled.big_endian)?,
                );
            }
            Ok(ProbeData::Sampled(data))
        }
        ProbeKind::Crossings(_) => {
            let mut data = HashMap::with_capacity(probe.nodes.len());
            for node in probe.nodes.iter() {
                let path = work_dir.join(probe.file_name(node));
                data.insert(node.clone(), parse_crossing_file(&path, node)?);
            }
            Ok(ProbeData::Crossings(data))
        }
    }
}

fn malformed(path: &Path, line: usize) -> EldoError {
    ErrorSource::OutputParse(format!("malformed line {} in {:?}", line + 1, path)).into()
}

/// Parses a `.printfile` waveform file.
fn parse_event_file(path: &Path) -> Result<Waveform> {
    let contents = io::read_to_string(path)?;
    let mut points = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if i < EVENT_HEADER_LINES {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (t, x) = match (tokens.next(), tokens.next()) {
            (Some(t), Some(x)) => (t, x),
            (None, _) => continue,
            _ => return Err(malformed(path, i)),
        };
        let t = t.parse::<f64>().map_err(|_| malformed(path, i))?;
        let x = x.parse::<f64>().map_err(|_| malformed(path, i))?;
        points.push(TimePoint::new(t, x));
    }
    Ok(Waveform::from_points(points))
}

/// Parses a vector extract file of sampled values into bus words.
///
/// Each matching line carries the bus bit index, the sample index, and
/// the sampled voltage. A voltage at or above `vth` reads as 1. Bits
/// assemble LSB first from the lowest bus index; `big_endian` reverses
/// the bit order. If the simulator records more samples of some bits
/// than others, the result is truncated to the shortest bit.
fn parse_sampled_file(path: &Path, node: &str, vth: f64, big_endian: bool) -> Result<Vec<BitSignal>> {
    let contents = io::read_to_string(path)?;
    let needle = node.to_uppercase();
    let mut columns: BTreeMap<usize, Vec<bool>> = BTreeMap::new();
    let mut max_sample = 0;
    for (i, line) in contents.lines().enumerate() {
        if !line.to_uppercase().contains(&needle) {
            continue;
        }
        let tokens: Vec<&str> = WORD_RE.find_iter(line).map(|m| m.as_str()).collect();
        if tokens.len() < 4 {
            return Err(malformed(path, i));
        }
        let bit = tokens[2]
            .parse::<usize>()
            .map_err(|_| malformed(path, i))?;
        let sample = tokens[3]
            .parse::<usize>()
            .map_err(|_| malformed(path, i))?;
        max_sample = max_sample.max(sample);
        let value = line
            .split_whitespace()
            .last()
            .ok_or_else(|| malformed(path, i))?
            .parse::<f64>()
            .map_err(|_| malformed(path, i))?;
        columns.entry(bit).or_default().push(value >= vth);
    }

    if columns.is_empty() {
        warn!("No samples of {} found in {:?}", node, path);
        return Ok(Vec::new());
    }

    let n = columns.values().map(|col| col.len()).min().unwrap_or(0);
    if n < max_sample {
        warn!(
            "Expected {} samples of {}; truncating to {}",
            max_sample, node, n
        );
    }

    let mut words = Vec::with_capacity(n);
    for sample in 0..n {
        let mut bits: Vec<bool> = columns.values().map(|col| col[sample]).collect();
        if big_endian {
            bits.reverse();
        }
        words.push(BitSignal::from_vec(bits));
    }
    Ok(words)
}

/// Parses a vector extract file of crossing timestamps.
fn parse_crossing_file(path: &Path, node: &str) -> Result<Vec<f64>> {
    let contents = io::read_to_string(path)?;
    let needle = node.to_uppercase();
    let mut times = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if !line.to_uppercase().contains(&needle) {
            continue;
        }
        let value = line
            .split_whitespace()
            .last()
            .ok_or_else(|| malformed(path, i))?
            .parse::<f64>()
            .map_err(|_| malformed(path, i))?;
        times.push(value);
    }
    Ok(times)
}

/// Parses supply consumption extractions from the simulator log.
///
/// The log interleaves extraction results with unrelated output, so
/// malformed candidate lines are skipped with a warning rather than
/// failing the run.
pub(crate) fn parse_chi_report(path: &Path) -> Result<PowerReport> {
    let contents = io::read_to_string(path)?;
    let mut report = PowerReport::default();
    for line in contents.lines() {
        if line.contains("CURRENT_") {
            match parse_extract_line(line, "CURRENT_") {
                Some((name, value)) => {
                    report.currents.insert(name, value);
                }
                None => warn!("Skipping malformed extract line: {}", line),
            }
        } else if line.contains("POWER_") {
            match parse_extract_line(line, "POWER_") {
                Some((name, value)) => {
                    report.powers.insert(name, value);
                }
                None => warn!("Skipping malformed extract line: {}", line),
            }
        }
    }
    Ok(report)
}

fn parse_extract_line(line: &str, prefix: &str) -> Option<(String, f64)> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let name = words.get(1)?.replace(prefix, "");
    let value = words.get(3)?.parse::<f64>().ok()?;
    Some((name, value))
}
