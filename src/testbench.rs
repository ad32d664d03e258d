//! Testbench netlist generation.

use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;

use crate::analysis::Analysis;
use crate::error::{ErrorSource, Result};
use crate::io;
use crate::log::*;
use crate::probe::{CrossingKind, Probe, ProbeKind, SampleEdge, Trigger};
use crate::stimulus::{DcSource, Stimulus};
use crate::subckt::SubcktDef;
use crate::templates::{render_netlist, NetlistCtx};
use crate::{subckt_file_name, Lib, SimInput};

/// The default simulation temperature, in degrees Celsius.
pub(crate) const DEFAULT_TEMP: f64 = 27.0;

/// Margin added after the last stimulus activity when inferring the
/// transient stop time, in seconds.
pub(crate) const TRAN_STOP_MARGIN: f64 = 2e-9;

const GENERATOR: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

/// A testbench netlist, rendered section by section from a [`SimInput`].
pub struct Testbench {
    name: String,
    def: SubcktDef,
    postlayout: bool,
    libs: Vec<String>,
    temp: String,
    includes: Vec<String>,
    options: Vec<String>,
    params: Vec<String>,
    instance: String,
    misc: Vec<String>,
    dc_sources: Vec<String>,
    stimuli: Vec<String>,
    analyses: Vec<String>,
    probes: Vec<String>,
    plot: Vec<String>,
}

impl Testbench {
    /// Builds a testbench from a simulation input.
    ///
    /// Reads the DUT netlist, extracts its subcircuit definition, and
    /// renders every netlist section.
    pub fn new(input: &SimInput) -> Result<Self> {
        let def = SubcktDef::from_file(&input.dut.netlist, input.dut.cell.as_deref())?;
        let def = if input.dut.postlayout {
            def
        } else {
            def.rename(&input.name.to_uppercase())
        };
        let instance = def.instance(&input.name);

        if input.libs.is_empty() {
            warn!("No device model libraries given; the generated netlist may not simulate");
        }

        let (stimuli, stim_end) = stimulus_lines(&input.stimuli)?;

        Ok(Self {
            name: input.name.clone(),
            postlayout: input.dut.postlayout,
            libs: lib_lines(&input.libs),
            temp: input.temp.unwrap_or(DEFAULT_TEMP).to_string(),
            includes: include_lines(input)?,
            options: option_lines(&input.options),
            params: param_lines(&input.params),
            instance,
            misc: input.misc.clone(),
            dc_sources: dc_source_lines(&input.dc_sources),
            analyses: analysis_lines(&input.analyses, stim_end),
            stimuli,
            probes: probe_lines(&input.probes)?,
            plot: plot_lines(&input.plot),
            def,
        })
    }

    /// Writes the testbench netlist to `path`.
    ///
    /// Fails if `path` exists and `force` is not set.
    pub fn export(&self, path: impl AsRef<Path>, force: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ErrorSource::AlreadyExists(path.to_path_buf()).into());
        }
        info!("Writing testbench netlist to {:?}", path);
        render_netlist(self.ctx(), path)
    }

    /// Writes the DUT subcircuit file to `path`.
    ///
    /// Post-layout netlists are included directly by the testbench, so
    /// no subcircuit file is written for them. Fails if `path` exists
    /// and `force` is not set.
    pub fn export_subckt(&self, path: impl AsRef<Path>, force: bool) -> Result<()> {
        if self.postlayout {
            debug!("Post-layout netlist is included directly; skipping subcircuit export");
            return Ok(());
        }
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ErrorSource::AlreadyExists(path.to_path_buf()).into());
        }
        info!("Writing DUT subcircuit to {:?}", path);
        io::write_string(path, &self.subckt_text())
    }

    fn subckt_text(&self) -> String {
        format!(
            "*** Subcircuit definitions\n\n*** Subcircuit definition for {} module\n{}",
            self.name,
            self.def.text()
        )
    }

    fn ctx(&self) -> NetlistCtx<'_> {
        NetlistCtx {
            name: &self.name,
            generator: GENERATOR,
            libs: &self.libs,
            temp: &self.temp,
            includes: &self.includes,
            options: &self.options,
            params: &self.params,
            instance: &self.instance,
            misc: &self.misc,
            dc_sources: &self.dc_sources,
            stimuli: &self.stimuli,
            analyses: &self.analyses,
            probes: &self.probes,
            plot: &self.plot,
        }
    }
}

fn lib_lines(libs: &[Lib]) -> Vec<String> {
    libs.iter()
        .map(|lib| format!(".lib {} {}", lib.path.display(), lib.section))
        .collect()
}

fn include_lines(input: &SimInput) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(input.includes.len() + 1);
    if input.dut.postlayout {
        // Post-layout netlists can be large; reference them in place.
        let netlist = io::canonicalize(&input.dut.netlist)?;
        lines.push(format!(".include {}", netlist.display()));
    } else {
        lines.push(format!(".include {}", subckt_file_name(&input.name)));
    }
    for include in input.includes.iter() {
        lines.push(format!(".include {}", include.display()));
    }
    Ok(lines)
}

fn option_lines(options: &BTreeMap<String, String>) -> Vec<String> {
    options
        .iter()
        .map(|(name, value)| {
            if value.is_empty() {
                format!(".option {name}")
            } else {
                format!(".option {name}={value}")
            }
        })
        .collect()
}

fn param_lines(params: &BTreeMap<String, String>) -> Vec<String> {
    params
        .iter()
        .map(|(name, value)| format!(".param {name}={value}"))
        .collect()
}

fn dc_source_lines(sources: &[DcSource]) -> Vec<String> {
    let mut lines = Vec::new();
    for source in sources {
        let elem = source.element();
        let mut line = format!("{} {} {} {}", elem, source.pos, source.neg, source.value);
        if !source.noise {
            line.push_str(" NONOISE");
        }
        lines.push(line);
        if let Some(window) = source.extract {
            let label = elem.to_lowercase();
            let (from, to) = (window.start_text(), window.stop_text());
            lines.push(format!(".defwave p_{label}=v({elem})*i({elem})"));
            lines.push(format!(
                ".extract label=current_{label} abs(average(i({elem}),{from},{to}))"
            ));
            lines.push(format!(
                ".extract label=power_{label} abs(average(w(p_{label}),{from},{to}))"
            ));
        }
    }
    lines
}

/// Renders stimulus lines and returns them along with the time of the
/// last scheduled activity, if any stimulus schedules one.
fn stimulus_lines(stimuli: &[Stimulus]) -> Result<(Vec<String>, Option<f64>)> {
    let mut lines = Vec::new();
    let mut end = None;
    for stimulus in stimuli {
        match stimulus {
            Stimulus::Event(event) => {
                lines.push(format!(
                    "{}{} {} 0 pwl(file=\"{}\")",
                    event.kind,
                    event.node.to_lowercase(),
                    event.node.to_uppercase(),
                    event.file_name()
                ));
            }
            Stimulus::Pattern(pattern) => {
                if pattern.words.is_empty() {
                    return Err(ErrorSource::InvalidArgs(format!(
                        "pattern stimulus for {} has no words",
                        pattern.bus
                    ))
                    .into());
                }
                if pattern.sample_rate <= 0.0 {
                    return Err(ErrorSource::InvalidArgs(format!(
                        "pattern stimulus for {} must have a positive sample rate",
                        pattern.bus
                    ))
                    .into());
                }
                // Pattern sources drive buses. Scalar nodes get a
                // single-bit bus alias.
                let scalar = pattern.words[0].width() == 1 && !pattern.bus.contains(['<', '>']);
                let bus = if scalar {
                    let alias = format!("{}_BUS", pattern.bus.to_uppercase());
                    lines.push(format!(".setbus {alias} {}", pattern.bus.to_uppercase()));
                    alias
                } else {
                    pattern.bus.to_uppercase()
                };
                let words = pattern
                    .words
                    .iter()
                    .map(|word| {
                        word.bits_rev()
                            .map(|bit| if bit { '1' } else { '0' })
                            .collect::<String>()
                    })
                    .join(" ");
                lines.push(format!(
                    ".sigbus {bus} vhi={} vlo={} tfall={} trise={} thold={} tdelay={} base=bin PATTERN {words}",
                    pattern.vhi,
                    pattern.vlo,
                    pattern.tfall,
                    pattern.trise,
                    1.0 / pattern.sample_rate,
                    pattern.delay,
                ));
            }
        }
        let t = stimulus.end_time();
        end = Some(end.map_or(t, |e: f64| e.max(t)));
    }
    Ok((lines, end.filter(|e| *e > 0.0)))
}

fn analysis_lines(analyses: &[Analysis], stim_end: Option<f64>) -> Vec<String> {
    let mut lines = Vec::new();
    for analysis in analyses {
        match analysis {
            Analysis::Tran(tran) => {
                let stop = match (tran.stop, stim_end) {
                    (Some(stop), _) => stop.to_string(),
                    (None, Some(end)) => (end + TRAN_STOP_MARGIN).to_string(),
                    // With no stimuli to infer from, defer to a
                    // user-defined `simtime` parameter.
                    (None, None) => String::from("simtime"),
                };
                let mut line = format!(".tran {} {}", tran.step, stop);
                if tran.uic {
                    line.push_str(" UIC");
                }
                lines.push(line);
                if let Some(ref noise) = tran.noise {
                    let mut line = format!(
                        ".noisetran fmin={} fmax={} nbrun=1 NONOM",
                        noise.fmin, noise.fmax
                    );
                    if let Some(seed) = noise.seed {
                        line.push_str(&format!(" seed={seed}"));
                    }
                    lines.push(line);
                }
            }
        }
    }
    lines
}

fn probe_lines(probes: &[Probe]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for probe in probes {
        match &probe.kind {
            ProbeKind::Event => {
                for node in probe.nodes.iter() {
                    lines.push(format!(
                        ".printfile V({}) file=\"{}\"",
                        node.to_uppercase(),
                        probe.file_name(node)
                    ));
                }
            }
            ProbeKind::Sampled(sampled) => {
                if let Trigger::PerNode(triggers) = &sampled.trigger {
                    if triggers.is_empty() {
                        return Err(ErrorSource::InvalidArgs(format!(
                            "sampled probe {} has an empty trigger list",
                            probe.name
                        ))
                        .into());
                    }
                }
                for (i, node) in probe.nodes.iter().enumerate() {
                    let trigger = sampled.trigger.for_node(i, probe.nodes.len());
                    let clock = match sampled.edge {
                        SampleEdge::Both => format!(
                            "tcross(v({}),vth={},after={},before=end)",
                            trigger.to_uppercase(),
                            sampled.vth,
                            sampled.delay
                        ),
                        edge => format!(
                            "{}(v({}),{},{},end)",
                            edge.extract_fn(),
                            trigger.to_uppercase(),
                            sampled.vth,
                            sampled.delay
                        ),
                    };
                    lines.push(format!(
                        ".extract file=\"{}\" vect label={} yval(v({}<*>),{})",
                        probe.file_name(node),
                        node,
                        node.to_uppercase(),
                        clock
                    ));
                }
            }
            ProbeKind::Crossings(crossing) => {
                for node in probe.nodes.iter() {
                    let args = if crossing.edge.takes_vth() {
                        match crossing.edge {
                            CrossingKind::Both => format!(",vth={}", crossing.vth),
                            _ => format!(",{}", crossing.vth),
                        }
                    } else {
                        String::new()
                    };
                    lines.push(format!(
                        ".extract file=\"{}\" vect label={} {}(v({}){})",
                        probe.file_name(node),
                        node,
                        crossing.edge.extract_fn(),
                        node.to_uppercase(),
                        args
                    ));
                }
            }
        }
    }
    Ok(lines)
}

fn plot_lines(plot: &[String]) -> Vec<String> {
    if plot.is_empty() {
        Vec::new()
    } else {
        vec![format!(".plot {}", plot.join(" "))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{TranAnalysis, TransientNoise};
    use crate::bits::BitSignal;
    use crate::probe::{CrossingProbe, SampledProbe};
    use crate::stimulus::{EventInput, ExtractWindow, PatternInput, SourceKind};
    use crate::units::{SiPrefix, SiValue};
    use crate::waveform::Waveform;

    #[test]
    fn dc_sources_render_with_extraction() {
        let sources = vec![
            DcSource::builder()
                .name("DD")
                .pos("VDD")
                .neg("0")
                .value(SiValue::new(800, SiPrefix::Milli))
                .extract(ExtractWindow::between(1e-9, 5e-9))
                .build()
                .unwrap(),
            DcSource::builder()
                .name("BIAS")
                .kind(SourceKind::Current)
                .pos("IBIAS")
                .neg("0")
                .value(SiValue::new(10, SiPrefix::Micro))
                .noise(true)
                .build()
                .unwrap(),
        ];
        let lines = dc_source_lines(&sources);
        assert_eq!(
            lines,
            vec![
                "Vdd VDD 0 800m NONOISE",
                ".defwave p_vdd=v(Vdd)*i(Vdd)",
                ".extract label=current_vdd abs(average(i(Vdd),0.000000001,0.000000005))",
                ".extract label=power_vdd abs(average(w(p_vdd),0.000000001,0.000000005))",
                "Ibias IBIAS 0 10u",
            ]
        );
    }

    #[test]
    fn extract_window_defaults_to_full_run() {
        let source = DcSource::builder()
            .name("DD")
            .pos("VDD")
            .neg("0")
            .value(SiValue::new(1, SiPrefix::None))
            .extract(ExtractWindow::full())
            .build()
            .unwrap();
        let lines = dc_source_lines(&[source]);
        assert!(lines[2].ends_with("abs(average(i(Vdd),start,end))"));
    }

    #[test]
    fn event_stimuli_reference_pwl_files() {
        let mut waveform = Waveform::with_initial_value(0.0);
        waveform.push(1e-9, 0.8);
        let stimuli = vec![Stimulus::Event(
            EventInput::builder()
                .node("IN")
                .waveform(waveform)
                .build()
                .unwrap(),
        )];
        let (lines, end) = stimulus_lines(&stimuli).unwrap();
        assert_eq!(lines, vec!["Vin IN 0 pwl(file=\"IN_stim.txt\")"]);
        assert_eq!(end, Some(1e-9));
    }

    #[test]
    fn bus_patterns_render_msb_first() {
        let stimuli = vec![Stimulus::Pattern(
            PatternInput::builder()
                .bus("din<1:0>")
                .words(vec![
                    BitSignal::from_u32(0b01, 2),
                    BitSignal::from_u32(0b10, 2),
                ])
                .sample_rate(1e9)
                .vhi(0.8)
                .build()
                .unwrap(),
        )];
        let (lines, end) = stimulus_lines(&stimuli).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(".sigbus DIN<1:0> vhi=0.8 vlo=0"));
        assert!(lines[0].ends_with("base=bin PATTERN 01 10"));
        assert_eq!(end, Some(2e-9));
    }

    #[test]
    fn scalar_patterns_get_a_bus_alias() {
        let stimuli = vec![Stimulus::Pattern(
            PatternInput::builder()
                .bus("rst")
                .words(vec![BitSignal::ones(1), BitSignal::zeros(1)])
                .sample_rate(1e9)
                .build()
                .unwrap(),
        )];
        let (lines, _) = stimulus_lines(&stimuli).unwrap();
        assert_eq!(lines[0], ".setbus RST_BUS RST");
        assert!(lines[1].starts_with(".sigbus RST_BUS "));
        assert!(lines[1].ends_with("PATTERN 1 0"));
    }

    #[test]
    fn empty_patterns_are_rejected() {
        let stimuli = vec![Stimulus::Pattern(
            PatternInput::builder()
                .bus("din")
                .words(vec![])
                .sample_rate(1e9)
                .build()
                .unwrap(),
        )];
        let err = stimulus_lines(&stimuli).unwrap_err();
        assert!(matches!(err.source(), ErrorSource::InvalidArgs(_)));
    }

    #[test]
    fn tran_stop_prefers_explicit_then_inferred() {
        let explicit = Analysis::Tran(
            TranAnalysis::builder()
                .step(1e-12)
                .stop(10e-9)
                .uic(true)
                .build()
                .unwrap(),
        );
        assert_eq!(
            analysis_lines(&[explicit], Some(5e-9)),
            vec![".tran 0.000000000001 0.00000001 UIC"]
        );

        let inferred = Analysis::Tran(TranAnalysis::builder().step(1e-12).build().unwrap());
        assert_eq!(
            analysis_lines(&[inferred.clone()], Some(8e-9)),
            vec![format!(".tran 0.000000000001 {}", 8e-9 + TRAN_STOP_MARGIN)]
        );
        assert_eq!(
            analysis_lines(&[inferred], None),
            vec![".tran 0.000000000001 simtime"]
        );
    }

    #[test]
    fn transient_noise_renders_with_seed() {
        let analysis = Analysis::Tran(
            TranAnalysis::builder()
                .step(1e-12)
                .stop(1e-9)
                .noise(
                    TransientNoise::builder()
                        .fmin(1.0)
                        .fmax(5e9)
                        .seed(42)
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        );
        let lines = analysis_lines(&[analysis], None);
        assert_eq!(
            lines[1],
            ".noisetran fmin=1 fmax=5000000000 nbrun=1 NONOM seed=42"
        );
    }

    #[test]
    fn event_probes_print_waveform_files() {
        let probe = Probe::builder()
            .name("out")
            .nodes(vec!["OUT".to_string()])
            .kind(ProbeKind::Event)
            .build()
            .unwrap();
        assert_eq!(
            probe_lines(&[probe]).unwrap(),
            vec![".printfile V(OUT) file=\"OUT_out.txt\""]
        );
    }

    #[test]
    fn sampled_probes_extract_on_clock_edges() {
        let probe = Probe::builder()
            .name("sampled")
            .nodes(vec!["DOUT".to_string()])
            .kind(ProbeKind::Sampled(
                SampledProbe::builder()
                    .trigger(Trigger::Common("clk".to_string()))
                    .delay(1e-9)
                    .build()
                    .unwrap(),
            ))
            .build()
            .unwrap();
        assert_eq!(
            probe_lines(&[probe]).unwrap(),
            vec![
                ".extract file=\"DOUT_sampled.txt\" vect label=DOUT yval(v(DOUT<*>),xup(v(CLK),0.5,0.000000001,end))"
            ]
        );
    }

    #[test]
    fn sampling_on_both_edges_uses_tcross() {
        let probe = Probe::builder()
            .name("ddr")
            .nodes(vec!["Q".to_string()])
            .kind(ProbeKind::Sampled(
                SampledProbe::builder()
                    .trigger(Trigger::Common("CLK".to_string()))
                    .edge(SampleEdge::Both)
                    .build()
                    .unwrap(),
            ))
            .build()
            .unwrap();
        let lines = probe_lines(&[probe]).unwrap();
        assert!(lines[0].contains("yval(v(Q<*>),tcross(v(CLK),vth=0.5,after=0,before=end))"));
    }

    #[test]
    fn mismatched_triggers_fall_back_to_first() {
        let probe = Probe::builder()
            .name("s")
            .nodes(vec!["A".to_string(), "B".to_string()])
            .kind(ProbeKind::Sampled(
                SampledProbe::builder()
                    .trigger(Trigger::PerNode(vec!["CLK".to_string()]))
                    .build()
                    .unwrap(),
            ))
            .build()
            .unwrap();
        let lines = probe_lines(&[probe]).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("xup(v(CLK)"));
        assert!(lines[1].contains("xup(v(CLK)"));
    }

    #[test]
    fn crossing_probes_render_each_kind() {
        let mk = |edge| {
            Probe::builder()
                .name("x")
                .nodes(vec!["OUT".to_string()])
                .kind(ProbeKind::Crossings(
                    CrossingProbe::builder().vth(0.4).edge(edge).build().unwrap(),
                ))
                .build()
                .unwrap()
        };
        assert_eq!(
            probe_lines(&[mk(CrossingKind::Rising)]).unwrap(),
            vec![".extract file=\"OUT_x.txt\" vect label=OUT xup(v(OUT),0.4)"]
        );
        assert_eq!(
            probe_lines(&[mk(CrossingKind::Both)]).unwrap(),
            vec![".extract file=\"OUT_x.txt\" vect label=OUT tcross(v(OUT),vth=0.4)"]
        );
        assert_eq!(
            probe_lines(&[mk(CrossingKind::RiseTime)]).unwrap(),
            vec![".extract file=\"OUT_x.txt\" vect label=OUT trise(v(OUT))"]
        );
    }

    #[test]
    fn options_and_params_render_sorted() {
        let mut options = BTreeMap::new();
        options.insert("eps".to_string(), "1e-7".to_string());
        options.insert("aex".to_string(), String::new());
        assert_eq!(
            option_lines(&options),
            vec![".option aex", ".option eps=1e-7"]
        );

        let mut params = BTreeMap::new();
        params.insert("simtime".to_string(), "10n".to_string());
        assert_eq!(param_lines(&params), vec![".param simtime=10n"]);
    }
}
