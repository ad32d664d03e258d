//! Subcircuit extraction from SPICE netlists.
//!
//! This is a minimal scan, not a netlist parser: only `.subckt` and
//! `.ends` lines, port-list continuations, and the design cell marker
//! comment are recognized. Everything between them passes through
//! verbatim.

use std::path::Path;

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_till1};
use nom::character::complete::{char, space0, space1};
use nom::combinator::eof;
use nom::multi::many0;
use nom::sequence::preceded;
use nom::IResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{with_err_context, ErrorContext, Result};
use crate::io;

/// An error arising while scanning a netlist for subcircuit definitions.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SubcktError {
    /// No subcircuit definition was found.
    #[error("no subcircuit definition found")]
    NotFound,
    /// The requested cell has no subcircuit definition.
    #[error("no subcircuit definition found for cell {0}")]
    MissingCell(String),
    /// A subcircuit definition has no matching `.ends`.
    #[error("subcircuit {0} has no matching .ends")]
    Unterminated(String),
}

/// A subcircuit definition extracted from a netlist.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubcktDef {
    name: String,
    ports: Vec<String>,
    lines: Vec<String>,
}

impl SubcktDef {
    /// Extracts a subcircuit definition from the netlist at `path`.
    ///
    /// If `cell` is given, extracts the definition of that cell.
    /// Otherwise, extracts the cell named by a `*** Design cell name:`
    /// marker comment, falling back to the first definition in the file.
    pub fn from_file(path: impl AsRef<Path>, cell: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let contents = io::read_to_string(path)?;
        let def = with_err_context(Self::parse(&contents, cell), || {
            ErrorContext::Task(format!("extracting a subcircuit from {path:?}"))
        })?;
        Ok(def)
    }

    /// Extracts a subcircuit definition from netlist text.
    ///
    /// See [`SubcktDef::from_file`] for the cell selection rules.
    pub fn parse(netlist: &str, cell: Option<&str>) -> std::result::Result<Self, SubcktError> {
        let lines: Vec<&str> = netlist.lines().collect();

        let mut target = cell.map(str::to_string);
        if target.is_none() {
            for line in lines.iter() {
                if let Ok((_, name)) = design_cell_marker(line) {
                    target = Some(name.to_string());
                    break;
                }
            }
        }

        let mut header = None;
        for (i, line) in lines.iter().enumerate() {
            if let Ok((_, (name, ports))) = subckt_header(line) {
                if let Some(ref target) = target {
                    if !name.eq_ignore_ascii_case(target) {
                        continue;
                    }
                }
                header = Some((i, name.to_string(), ports));
                break;
            }
        }
        let (start, name, ports) = match (header, target) {
            (Some((i, name, ports)), _) => (i, name, ports),
            (None, Some(target)) => return Err(SubcktError::MissingCell(target)),
            (None, None) => return Err(SubcktError::NotFound),
        };
        let mut ports: Vec<String> = ports.into_iter().map(str::to_string).collect();

        // Continuation lines immediately after the header extend the port list.
        let mut body_start = start + 1;
        while body_start < lines.len() {
            match continuation_line(lines[body_start]) {
                Ok((_, more)) => {
                    ports.extend(more.into_iter().map(str::to_string));
                    body_start += 1;
                }
                Err(_) => break,
            }
        }

        // Scan to the matching `.ends`, tracking nested definitions.
        let mut depth = 1usize;
        let mut end = None;
        for (i, line) in lines.iter().enumerate().skip(body_start) {
            if subckt_header(line).is_ok() {
                depth += 1;
            } else if ends_line(line).is_ok() {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
        }
        let end = end.ok_or_else(|| SubcktError::Unterminated(name.clone()))?;

        Ok(Self {
            name,
            ports,
            lines: lines[start..=end].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// The name of the subcircuit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The subcircuit's ports, in definition order.
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    /// Renames the subcircuit, rewriting the name token on the header line.
    pub fn rename(mut self, name: &str) -> Self {
        if let Some(first) = self.lines.first_mut() {
            let mut words: Vec<&str> = first.split_whitespace().collect();
            if words.len() > 1 {
                words[1] = name;
                *first = words.join(" ");
            }
        }
        self.name = name.to_string();
        self
    }

    /// The instance lines for this subcircuit. Ports bind in definition order.
    pub fn instance(&self, name: &str) -> String {
        let mut out = format!("X{}", name.to_lowercase());
        for port in self.ports.iter() {
            out.push(' ');
            out.push_str(port);
        }
        out.push_str("\n+");
        out.push_str(&self.name.to_uppercase());
        out
    }

    /// The definition text, terminated with a newline.
    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

fn is_space_or_line(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r' || c == '\n'
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_till1(is_space_or_line)(input)
}

/// `.subckt <name> <ports...>`, not including continuation lines.
fn subckt_header(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    let (input, _) = space0(input)?;
    let (input, _) = tag_no_case(".subckt")(input)?;
    let (input, name) = preceded(space1, ident)(input)?;
    let (input, ports) = many0(preceded(space1, ident))(input)?;
    Ok((input, (name, ports)))
}

/// `.ends`, optionally followed by the subcircuit name.
fn ends_line(input: &str) -> IResult<&str, ()> {
    let (input, _) = space0(input)?;
    let (input, _) = tag_no_case(".ends")(input)?;
    let (input, _) = alt((eof, space1))(input)?;
    Ok((input, ()))
}

/// A `+` continuation carrying additional ports.
fn continuation_line(input: &str) -> IResult<&str, Vec<&str>> {
    let (input, _) = space0(input)?;
    let (input, _) = char('+')(input)?;
    many0(preceded(space0, ident))(input)
}

/// The `*** Design cell name: <cell>` marker comment.
fn design_cell_marker(input: &str) -> IResult<&str, &str> {
    let (input, _) = space0(input)?;
    let (input, _) = tag_no_case("*** design cell name:")(input)?;
    preceded(space0, ident)(input)
}
