//! An interface to the Eldo analog circuit simulator.
//!
//! Generates testbench netlists around an extracted DUT subcircuit,
//! invokes the simulator, and parses its output files back into
//! waveforms, sampled bus words, crossing timestamps, and power reports.

pub mod analysis;
pub mod bits;
pub mod error;
pub mod io;
pub mod output;
pub mod probe;
pub mod stimulus;
pub mod subckt;
pub mod testbench;
pub mod units;
pub mod waveform;

pub(crate) mod log;
pub(crate) mod templates;


use std::collections::{BTreeMap, HashMap};
use std::os::unix::prelude::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tempdir::TempDir;
use tera::Context;

use crate::analysis::Analysis;
use crate::error::{with_err_context, EldoError, ErrorContext, ErrorSource, Result};
use crate::log::{Log, *};
use crate::output::{parse_chi_report, parse_probe, PowerReport, ProbeData};
use crate::probe::Probe;
use crate::stimulus::{DcSource, Stimulus};
use crate::templates::{RUN_SCRIPT_TEMPLATE, TEMPLATES};
use crate::testbench::Testbench;

/// The exit status the simulator returns when no license is available.
pub const LICENSE_FAILURE_STATUS: i32 = 9;

/// The flags passed to the simulator when neither [`EldoOpts::flags`]
/// nor `$ELDO_FLAGS` is set.
pub const DEFAULT_FLAGS: &str = "-64b -queue";

/// A device model library and the section to load from it.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Lib {
    /// The path to the library file.
    pub path: PathBuf,
    /// The process corner section, e.g. `tt`.
    pub section: String,
}

impl Lib {
    /// Creates a new [`Lib`].
    pub fn new(path: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            section: section.into(),
        }
    }
}

/// The device under test.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
pub struct Dut {
    /// The path to the netlist containing the DUT subcircuit.
    #[builder(setter(into))]
    pub netlist: PathBuf,
    /// The subcircuit to instantiate.
    ///
    /// If unset, the design cell named in the netlist is used, falling
    /// back to the first subcircuit definition.
    #[builder(default, setter(strip_option, into))]
    pub cell: Option<String>,
    /// Whether `netlist` is a post-layout extraction.
    ///
    /// Post-layout netlists are included in place rather than copied
    /// into a renamed subcircuit file.
    #[builder(default)]
    pub postlayout: bool,
}

impl Dut {
    /// Creates a builder for a [`Dut`].
    #[inline]
    pub fn builder() -> DutBuilder {
        DutBuilder::default()
    }

    /// Creates a pre-layout [`Dut`] using the netlist's own cell selection.
    pub fn new(netlist: impl Into<PathBuf>) -> Self {
        Self {
            netlist: netlist.into(),
            cell: None,
            postlayout: false,
        }
    }
}

/// One simulation run: the DUT, its environment, and the outputs to record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimInput {
    /// The directory in which simulator files are generated and run.
    pub work_dir: PathBuf,
    /// The testbench name. Generated files and the DUT instance are
    /// named after it.
    pub name: String,
    /// The device under test.
    pub dut: Dut,
    /// Device model libraries.
    pub libs: Vec<Lib>,
    /// The simulation temperature, in degrees Celsius. Defaults to 27.
    pub temp: Option<f64>,
    /// Additional netlist files to include.
    pub includes: Vec<PathBuf>,
    /// Simulator options. An empty value renders the flag form.
    pub options: BTreeMap<String, String>,
    /// Netlist parameters.
    pub params: BTreeMap<String, String>,
    /// Literal lines for the manual-commands section of the netlist.
    pub misc: Vec<String>,
    /// Constant sources.
    pub dc_sources: Vec<DcSource>,
    /// Input stimuli.
    pub stimuli: Vec<Stimulus>,
    /// The analyses to run.
    pub analyses: Vec<Analysis>,
    /// The outputs to record.
    pub probes: Vec<Probe>,
    /// Extra signals to save to the waveform database.
    pub plot: Vec<String>,
}

impl SimInput {
    /// Creates a new [`SimInput`] with no environment, stimuli, or probes.
    pub fn new(work_dir: impl Into<PathBuf>, name: impl Into<String>, dut: Dut) -> Self {
        Self {
            work_dir: work_dir.into(),
            name: name.into(),
            dut,
            libs: Vec::new(),
            temp: None,
            includes: Vec::new(),
            options: BTreeMap::new(),
            params: BTreeMap::new(),
            misc: Vec::new(),
            dc_sources: Vec::new(),
            stimuli: Vec::new(),
            analyses: Vec::new(),
            probes: Vec::new(),
            plot: Vec::new(),
        }
    }

    /// Adds an analysis to run.
    pub fn add_analysis(&mut self, analysis: Analysis) -> &mut Self {
        self.analyses.push(analysis);
        self
    }

    /// Adds a constant source.
    pub fn add_dc_source(&mut self, source: DcSource) -> &mut Self {
        self.dc_sources.push(source);
        self
    }

    /// Adds an input stimulus.
    pub fn add_stimulus(&mut self, stimulus: Stimulus) -> &mut Self {
        self.stimuli.push(stimulus);
        self
    }

    /// Adds an output probe.
    pub fn add_probe(&mut self, probe: Probe) -> &mut Self {
        self.probes.push(probe);
        self
    }

    /// Includes an additional netlist file.
    pub fn include(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.includes.push(path.into());
        self
    }

    /// Loads a section of a device model library.
    pub fn include_lib(&mut self, path: impl Into<PathBuf>, section: impl Into<String>) -> &mut Self {
        self.libs.push(Lib::new(path, section));
        self
    }

    /// Sets the simulation temperature.
    pub fn set_temp(&mut self, temp: f64) -> &mut Self {
        self.temp = Some(temp);
        self
    }

    /// Sets a simulator option. An empty value renders the flag form.
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Sets a netlist parameter.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Parsed simulation results.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimOutput {
    /// Parsed probe data, keyed by probe name.
    pub data: HashMap<String, ProbeData>,
    /// Supply consumption extracted from the simulator log.
    pub report: PowerReport,
}

/// Options controlling how the simulator binary is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct EldoOpts {
    /// The simulator executable.
    #[serde(default = "default_executable")]
    #[builder(default = "default_executable()", setter(into))]
    pub executable: String,
    /// Flags passed to the simulator.
    ///
    /// If unset, `$ELDO_FLAGS` is used, then [`DEFAULT_FLAGS`].
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub flags: Option<String>,
    /// A batch scheduler prefix for the simulator command, e.g. `bsub -K`.
    ///
    /// If unset, `$ELDO_SUBMISSION` is used, then no prefix.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub submission: Option<String>,
    /// A shell script sourced before invoking the simulator, typically
    /// for license setup.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub bashrc: Option<PathBuf>,
    /// Launch the waveform viewer GUI alongside the run.
    ///
    /// Interactive runs skip the submission prefix and license retries.
    #[serde(default)]
    #[builder(default)]
    pub gui: bool,
    /// The number of simulator worker processes.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub nproc: Option<usize>,
    /// The number of times to retry after a license-failure exit.
    #[serde(default = "default_license_retries")]
    #[builder(default = "default_license_retries()")]
    pub license_retries: u32,
    /// The delay between license retries, in seconds.
    #[serde(default = "default_retry_delay")]
    #[builder(default = "default_retry_delay()")]
    pub retry_delay: u64,
}

fn default_executable() -> String {
    String::from("eldo")
}

const fn default_license_retries() -> u32 {
    10
}

const fn default_retry_delay() -> u64 {
    5
}

impl Default for EldoOpts {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            flags: None,
            submission: None,
            bashrc: None,
            gui: false,
            nproc: None,
            license_retries: default_license_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl EldoOpts {
    /// Creates a builder for [`EldoOpts`].
    #[inline]
    pub fn builder() -> EldoOptsBuilder {
        EldoOptsBuilder::default()
    }

    /// Loads options from TOML text.
    pub fn from_toml(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Loads options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = io::read_to_string(path)?;
        Self::from_toml(&contents)
    }
}

/// The paths to the files generated for a simulation run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Paths {
    /// The testbench netlist.
    pub tb_path: PathBuf,
    /// The DUT subcircuit file.
    pub subckt_path: PathBuf,
    /// The simulator log carrying extraction results.
    pub chi_path: PathBuf,
    /// The run script.
    pub run_script_path: PathBuf,
    /// The simulator's standard output.
    pub stdout_path: PathBuf,
    /// The simulator's standard error.
    pub stderr_path: PathBuf,
}

/// Generates the paths of all files for a run named `name` in `work_dir`.
pub fn generate_paths(work_dir: impl AsRef<Path>, name: &str) -> Paths {
    let path = work_dir.as_ref();
    Paths {
        tb_path: path.join(tb_file_name(name)),
        subckt_path: path.join(subckt_file_name(name)),
        chi_path: path.join(chi_file_name(name)),
        run_script_path: path.join(RUN_SCRIPT_TEMPLATE),
        stdout_path: path.join("eldo.out"),
        stderr_path: path.join("eldo.err"),
    }
}

pub(crate) fn tb_file_name(name: &str) -> String {
    format!("tb_{name}.cir")
}

pub(crate) fn subckt_file_name(name: &str) -> String {
    format!("subckt_{name}.cir")
}

// The simulator names its log after the netlist.
pub(crate) fn chi_file_name(name: &str) -> String {
    format!("tb_{name}.chi")
}

/// The interface a calling framework drives simulations through.
pub trait Simulator {
    /// Creates a new simulator handle with the given options.
    fn new(opts: EldoOpts) -> Result<Self>
    where
        Self: Sized;

    /// Runs a simulation and parses its outputs.
    fn simulate(&self, input: SimInput) -> Result<SimOutput>;
}

/// A handle to the Eldo simulator.
pub struct Eldo {
    opts: EldoOpts,
}

impl Simulator for Eldo {
    fn new(opts: EldoOpts) -> Result<Self> {
        Ok(Self { opts })
    }

    fn simulate(&self, input: SimInput) -> Result<SimOutput> {
        if input.analyses.is_empty() {
            warn!("Input contains no analyses; nothing to simulate");
            return Ok(SimOutput::default());
        }
        run_eldo(&self.opts, &input)
    }
}

impl Eldo {
    /// Re-reads the outputs of a previous run in `input.work_dir`
    /// without invoking the simulator.
    pub fn read_output(&self, input: &SimInput) -> Result<SimOutput> {
        if !input.work_dir.exists() {
            if let Some(parent) = input.work_dir.parent() {
                if let Ok(entries) = std::fs::read_dir(parent) {
                    info!("Existing runs:");
                    for entry in entries.flatten() {
                        info!("  {:?}", entry.path());
                    }
                }
            }
            return Err(EldoError::from_context(
                std::io::Error::from(std::io::ErrorKind::NotFound),
                ErrorContext::Task(format!("looking for results in {:?}", input.work_dir)),
            ));
        }
        read_results(input)
    }

    /// Runs a simulation in a scratch directory that is deleted once
    /// its outputs have been parsed.
    pub fn simulate_scratch(&self, mut input: SimInput) -> Result<SimOutput> {
        let dir = TempDir::new("eldosim")?;
        input.work_dir = dir.path().to_path_buf();
        self.simulate(input)
    }
}

/// Generates all run files for `input` and invokes the simulator.
pub fn run_eldo(opts: &EldoOpts, input: &SimInput) -> Result<SimOutput> {
    let work_dir = &input.work_dir;
    let paths = generate_paths(work_dir, &input.name);

    io::create_dir_all(work_dir)?;

    let tb = Testbench::new(input)?;
    tb.export_subckt(&paths.subckt_path, true)?;
    tb.export(&paths.tb_path, true)?;

    for stimulus in input.stimuli.iter() {
        if let Stimulus::Event(event) = stimulus {
            let path = event.write_file(work_dir)?;
            debug!("Wrote stimulus file {:?}", path);
        }
    }

    write_run_script(&paths, opts, &tb_file_name(&input.name))?;
    let mut perms = std::fs::metadata(&paths.run_script_path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&paths.run_script_path, perms)?;

    info!("Running Eldo in {:?}", work_dir);
    let status = run_with_retries(&paths, opts, work_dir)?;
    if !status.success() {
        error!(
            "Eldo exited unsuccessfully; see {:?} and {:?}",
            paths.stdout_path, paths.stderr_path
        );
        return Err(ErrorSource::SimFailed(status.to_string()).into());
    }

    read_results(input)
}

/// Invokes the run script, retrying on license-failure exits.
fn run_with_retries(paths: &Paths, opts: &EldoOpts, work_dir: &Path) -> Result<ExitStatus> {
    let mut tries = 0u32;
    loop {
        tries += 1;
        let stdout = io::create_file(&paths.stdout_path)?;
        let stderr = io::create_file(&paths.stderr_path)?;
        let status = with_err_context(
            Command::new("/bin/bash")
                .arg(&paths.run_script_path)
                .stdout(stdout)
                .stderr(stderr)
                .current_dir(work_dir)
                .status(),
            || ErrorContext::Task(format!("invoking the simulator in {work_dir:?}")),
        )?;
        // Interactive runs hold a license until the viewer is closed,
        // so waiting for another one would hang the session.
        if status.code() != Some(LICENSE_FAILURE_STATUS) || opts.gui {
            return Ok(status);
        }
        if tries > opts.license_retries {
            return Err(ErrorSource::LicenseUnavailable(tries).into());
        }
        warn!(
            "License error, trying again... ({}/{})",
            tries, opts.license_retries
        );
        std::thread::sleep(Duration::from_secs(opts.retry_delay));
    }
}

/// Parses probe files and the simulator log in `input.work_dir`.
fn read_results(input: &SimInput) -> Result<SimOutput> {
    let paths = generate_paths(&input.work_dir, &input.name);

    let report = if paths.chi_path.exists() {
        let report = parse_chi_report(&paths.chi_path)?;
        report.log();
        report
    } else {
        warn!(
            "Simulator log {:?} not found; skipping power extraction",
            paths.chi_path
        );
        PowerReport::default()
    };

    let mut data = HashMap::with_capacity(input.probes.len());
    for probe in input.probes.iter() {
        data.insert(probe.name.clone(), parse_probe(&input.work_dir, probe)?);
    }

    Ok(SimOutput { data, report })
}

#[derive(Debug, Clone, Serialize)]
struct RunScriptContext<'a> {
    bashrc: Option<&'a PathBuf>,
    submission: &'a str,
    executable: &'a str,
    flags: &'a str,
    tb_file: &'a str,
}

fn write_run_script(paths: &Paths, opts: &EldoOpts, tb_file: &str) -> Result<()> {
    let flags = flags(opts);
    let submission = submission(opts);
    let ctx = RunScriptContext {
        bashrc: opts.bashrc.as_ref(),
        submission: &submission,
        executable: &opts.executable,
        flags: &flags,
        tb_file,
    };
    let ctx = Context::from_serialize(ctx)?;
    let mut f = io::create_file(&paths.run_script_path)?;
    TEMPLATES.render_to(RUN_SCRIPT_TEMPLATE, &ctx, &mut f)?;
    Ok(())
}

fn flags(opts: &EldoOpts) -> String {
    flags_with_env(opts, std::env::var("ELDO_FLAGS").ok())
}

fn flags_with_env(opts: &EldoOpts, env: Option<String>) -> String {
    let mut flags = opts
        .flags
        .clone()
        .or(env)
        .unwrap_or_else(|| String::from(DEFAULT_FLAGS));
    if opts.gui {
        flags.push_str(" -ezwave");
    }
    if let Some(nproc) = opts.nproc {
        flags.push_str(&format!(" -use_proc {nproc}"));
    }
    flags
}

fn submission(opts: &EldoOpts) -> String {
    submission_with_env(opts, std::env::var("ELDO_SUBMISSION").ok())
}

fn submission_with_env(opts: &EldoOpts, env: Option<String>) -> String {
    if opts.gui {
        return String::new();
    }
    let submission = match opts.submission.clone().or(env) {
        Some(submission) => submission,
        None => return String::new(),
    };
    if submission.is_empty() {
        submission
    } else {
        format!("{submission} ")
    }
}
