//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum, ValueHint};

#[derive(Parser, Debug)]
#[clap(author, about, version)]
pub struct Cli {
    /// Scheduler config (JSON). Defaults apply when omitted.
    #[clap(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Which source paces the frames.
    #[clap(long, value_enum, default_value_t = Mode::Delay)]
    pub mode: Mode,

    /// Stop after the observer received this many frames.
    #[clap(long, default_value_t = 120)]
    pub frames: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// A timer aligned to the configured vsync interval.
    Delay,
    /// A vsync thread driving an external source over channels.
    External,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Delay => "delay",
            Mode::External => "external",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["beginframe-cli"]);
        assert_eq!(cli.mode, Mode::Delay);
        assert_eq!(cli.frames, 120);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_external_mode() {
        let cli = Cli::parse_from([
            "beginframe-cli",
            "--mode",
            "external",
            "--frames",
            "10",
            "--config",
            "scheduler.json",
        ]);
        assert_eq!(cli.mode, Mode::External);
        assert_eq!(cli.frames, 10);
        assert_eq!(cli.config, Some(PathBuf::from("scheduler.json")));
    }
}
