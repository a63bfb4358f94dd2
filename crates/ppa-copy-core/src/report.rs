use std::fmt;
use std::str::FromStr;

use anyhow::bail;

/// Sink for engine output.
///
/// The engine never writes to stdout/stderr directly; the CLI supplies a
/// reporter with verbosity thresholds, tests supply a collecting one.
pub trait Reporter {
    fn debug(&mut self, msg: &str);
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// How much of the reporter stream to surface.
///
/// Warnings and errors are always shown; `-v` adds info, `-v -v` (or
/// `--debug`) adds cache/network diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Warn,
    Info,
    Debug,
}

impl Verbosity {
    /// Map the `-v`/`-q` counter ladder to a level.
    pub fn from_counts(verbose: u8, quiet: u8) -> Self {
        match i16::from(verbose) - i16::from(quiet) {
            n if n > 1 => Verbosity::Debug,
            1 => Verbosity::Info,
            _ => Verbosity::Warn,
        }
    }
}

impl FromStr for Verbosity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "warn" => Ok(Verbosity::Warn),
            "info" => Ok(Verbosity::Info),
            "debug" => Ok(Verbosity::Debug),
            other => bail!("unknown verbosity: {other}"),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verbosity::Warn => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        })
    }
}
