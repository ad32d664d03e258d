//! Netlist and run script templates.

use std::path::Path;

use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::Result;
use crate::io;

pub(crate) const TEMPLATES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
pub(crate) const NETLIST_TEMPLATE: &str = "tb.cir";
pub(crate) const RUN_SCRIPT_TEMPLATE: &str = "run_sim.sh";

lazy_static! {
    pub(crate) static ref TEMPLATES: Tera = match Tera::new(&format!("{TEMPLATES_PATH}/*")) {
        Ok(t) => t,
        Err(e) => {
            panic!("Encountered errors while parsing Tera templates: {e}");
        }
    };
}

/// The context required to render a testbench netlist.
///
/// All section contents arrive as pre-rendered lines. The template
/// supplies section banners and ordering.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NetlistCtx<'a> {
    /// The testbench name.
    pub(crate) name: &'a str,
    /// The generating package name and version.
    pub(crate) generator: &'a str,
    /// `.lib` lines for device models.
    pub(crate) libs: &'a [String],
    /// The simulation temperature.
    pub(crate) temp: &'a str,
    /// `.include` lines.
    pub(crate) includes: &'a [String],
    /// `.option` lines.
    pub(crate) options: &'a [String],
    /// `.param` lines.
    pub(crate) params: &'a [String],
    /// The DUT instance lines.
    pub(crate) instance: &'a str,
    /// Manually specified netlist lines.
    pub(crate) misc: &'a [String],
    /// DC source and consumption extraction lines.
    pub(crate) dc_sources: &'a [String],
    /// Input stimulus lines.
    pub(crate) stimuli: &'a [String],
    /// Analysis lines.
    pub(crate) analyses: &'a [String],
    /// Output probe lines.
    pub(crate) probes: &'a [String],
    /// `.plot` lines for manually probed signals.
    pub(crate) plot: &'a [String],
}

/// Renders a testbench netlist to the given path.
pub(crate) fn render_netlist(ctx: NetlistCtx<'_>, path: impl AsRef<Path>) -> Result<()> {
    let ctx = Context::from_serialize(ctx)?;
    let mut f = io::create_file(path.as_ref())?;
    TEMPLATES.render_to(NETLIST_TEMPLATE, &ctx, &mut f)?;
    Ok(())
}
