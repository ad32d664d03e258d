//! Error types and error context utilities.

use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

use crate::subckt::SubcktError;

/// A result type returning Eldo interface errors.
pub type Result<T> = std::result::Result<T, EldoError>;

/// The error type for Eldo interface operations.
///
/// Consists of an error source and a stack of contexts describing
/// what the interface was doing when the error occurred.
#[derive(Debug)]
pub struct EldoError {
    source: ErrorSource,
    context: Vec<ErrorContext>,
}

impl EldoError {
    /// Creates a new error with no context.
    pub fn new(source: impl Into<ErrorSource>) -> Self {
        Self {
            source: source.into(),
            context: Vec::new(),
        }
    }

    /// Creates a new error with a single layer of context.
    pub fn from_context(source: impl Into<ErrorSource>, context: ErrorContext) -> Self {
        Self {
            source: source.into(),
            context: vec![context],
        }
    }

    /// Adds a layer of context to the error.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context.push(context);
        self
    }

    /// The underlying source of this error.
    pub fn source(&self) -> &ErrorSource {
        &self.source
    }
}

impl Display for EldoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Error:")?;
        writeln!(f, "{}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Error occurred:")?;
        }
        for ctx in self.context.iter() {
            writeln!(f, "\twhile {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EldoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<T> From<T> for EldoError
where
    T: Into<ErrorSource>,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Adds context to the error (if any) contained in `result`.
pub fn with_err_context<T, E, F>(result: std::result::Result<T, E>, context: F) -> Result<T>
where
    E: Into<EldoError>,
    F: FnOnce() -> ErrorContext,
{
    result.map_err(|err| err.into().with_context(context()))
}

/// Context in which an error arose.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorContext {
    /// Creating a directory.
    CreateDir(PathBuf),
    /// Creating a file.
    CreateFile(PathBuf),
    /// Reading a file.
    ReadFile(PathBuf),
    /// Performing the named task.
    Task(String),
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir(path) => write!(f, "creating directory {path:?}"),
            Self::CreateFile(path) => write!(f, "creating file {path:?}"),
            Self::ReadFile(path) => write!(f, "reading file {path:?}"),
            Self::Task(task) => write!(f, "{task}"),
        }
    }
}

/// The source of an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorSource {
    /// An internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid arguments in a simulation input.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// A file that should not be overwritten already exists.
    #[error("file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing a subcircuit netlist.
    #[error("error parsing subcircuit netlist: {0}")]
    Subckt(#[from] SubcktError),

    /// Error parsing a simulator output file.
    #[error("error parsing simulator output: {0}")]
    OutputParse(String),

    /// Error rendering a template.
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// Error writing a CSV stimulus file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error parsing TOML configuration.
    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    /// The simulator exited unsuccessfully.
    #[error("simulator exited unsuccessfully: {0}")]
    SimFailed(String),

    /// No simulator license could be checked out.
    #[error("simulator license unavailable after {0} attempts")]
    LicenseUnavailable(u32),

    /// An arbitrary error.
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
