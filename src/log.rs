//! Logging for simulator runs and parsed reports.

// During tests, route log macros to stdout so that
// simulator diagnostics show up in test output.
#[cfg(test)]
#[allow(unused_imports)]
pub(crate) use std::{
    println as error, println as warn, println as info, println as debug, println as trace,
};

#[cfg(not(test))]
#[allow(unused_imports)]
pub(crate) use log::{debug, error, info, trace, warn};

/// A type that can log a summary of itself, such as a power report.
pub trait Log {
    /// Logs a summary of this object.
    fn log(&self);
}
