//! Dispatch logic: extract params from ArgMatches and convert to command args.

use std::path::PathBuf;

use clap::ArgMatches;

use super::ColorChoice;
use crate::commands::compile::CompileArgs;
use crate::commands::dump::DumpArgs;
use crate::commands::exec::ExecArgs;

pub struct CompileParams {
    pub archetype_path: PathBuf,
    pub output: Option<PathBuf>,
    pub location: Option<String>,
    pub system_dir: Option<PathBuf>,
    pub local_dir: Option<PathBuf>,
    pub optimize: bool,
    pub color: ColorChoice,
}

impl CompileParams {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            archetype_path: required_path(m, "archetype_path"),
            output: m.get_one::<PathBuf>("output").cloned(),
            location: m.get_one::<String>("location").cloned(),
            system_dir: m.get_one::<PathBuf>("system_dir").cloned(),
            local_dir: m.get_one::<PathBuf>("local_dir").cloned(),
            optimize: m.get_flag("optimize"),
            color: parse_color(m),
        }
    }
}

impl From<CompileParams> for CompileArgs {
    fn from(p: CompileParams) -> Self {
        Self {
            archetype_path: p.archetype_path,
            output: p.output,
            location: p.location,
            system_dir: p.system_dir,
            local_dir: p.local_dir,
            optimize: p.optimize,
            color: p.color.should_colorize(),
        }
    }
}

pub struct DumpParams {
    pub object_path: PathBuf,
}

impl DumpParams {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            object_path: required_path(m, "object_path"),
        }
    }
}

impl From<DumpParams> for DumpArgs {
    fn from(p: DumpParams) -> Self {
        Self {
            object_path: p.object_path,
        }
    }
}

pub struct ExecParams {
    pub object_path: PathBuf,
    pub location: Option<String>,
    pub system_dir: Option<PathBuf>,
    pub local_dir: Option<PathBuf>,
    pub fuel: u64,
    pub trace: bool,
    pub verbose: u8,
    pub json: bool,
}

impl ExecParams {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            object_path: required_path(m, "object_path"),
            location: m.get_one::<String>("location").cloned(),
            system_dir: m.get_one::<PathBuf>("system_dir").cloned(),
            local_dir: m.get_one::<PathBuf>("local_dir").cloned(),
            fuel: m.get_one::<u64>("fuel").copied().unwrap_or(1_000_000),
            trace: m.get_flag("trace"),
            verbose: m.get_count("verbose"),
            json: m.get_flag("json"),
        }
    }
}

impl From<ExecParams> for ExecArgs {
    fn from(p: ExecParams) -> Self {
        Self {
            object_path: p.object_path,
            location: p.location,
            system_dir: p.system_dir,
            local_dir: p.local_dir,
            fuel: p.fuel,
            // -v only makes sense with a trace to attach the stack to
            trace: p.trace || p.verbose > 0,
            verbose: p.verbose > 0,
            json: p.json,
        }
    }
}

/// Positional marked `required(true)`; clap rejects the command without it.
fn required_path(m: &ArgMatches, id: &str) -> PathBuf {
    m.get_one::<PathBuf>(id).cloned().unwrap_or_default()
}

/// Parse --color flag into ColorChoice.
fn parse_color(m: &ArgMatches) -> ColorChoice {
    match m.get_one::<String>("color").map(|s| s.as_str()) {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}
