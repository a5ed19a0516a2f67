//! Shared argument builders for CLI commands.
//!
//! Each function returns a `clap::Arg` that commands compose, so the same
//! flag reads the same everywhere it appears.

use std::path::PathBuf;

use clap::{Arg, ArgAction, value_parser};

/// Archetype source file (positional).
pub fn archetype_path_arg() -> Arg {
    Arg::new("archetype_path")
        .value_name("ARCHETYPE")
        .value_parser(value_parser!(PathBuf))
        .required(true)
        .help("Archetype file (s-expression syntax tree)")
}

/// Compiled object file (positional).
pub fn object_path_arg() -> Arg {
    Arg::new("object_path")
        .value_name("OBJECT")
        .value_parser(value_parser!(PathBuf))
        .required(true)
        .help("Compiled object file")
}

/// Write output to file (-o/--output).
pub fn output_file_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help("Object file to write (default: input with .lyo extension)")
}

/// Module location (--location).
pub fn location_arg() -> Arg {
    Arg::new("location")
        .long("location")
        .value_name("LOCATION")
        .help("Module location, e.g. /app (default: `/` + file stem)")
}

/// System library directory (--system-dir).
pub fn system_dir_arg() -> Arg {
    Arg::new("system_dir")
        .long("system-dir")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .help("Directory holding lyric://bootstrap modules (default: built-in prelude)")
}

/// Local module directory (--local-dir).
pub fn local_dir_arg() -> Arg {
    Arg::new("local_dir")
        .long("local-dir")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .help("Directory holding the package's own modules")
}

/// Run the peephole optimizer (-O/--optimize).
pub fn optimize_arg() -> Arg {
    Arg::new("optimize")
        .short('O')
        .long("optimize")
        .action(ArgAction::SetTrue)
        .help("Optimize generated bytecode")
}

/// Execution fuel limit (--fuel).
pub fn fuel_arg() -> Arg {
    Arg::new("fuel")
        .long("fuel")
        .value_name("N")
        .default_value("1000000")
        .value_parser(value_parser!(u64))
        .help("Execution fuel limit")
}

/// Print an instruction trace (--trace).
pub fn trace_arg() -> Arg {
    Arg::new("trace")
        .long("trace")
        .action(ArgAction::SetTrue)
        .help("Print each executed instruction to stderr")
}

/// Verbosity level (-v).
pub fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .help("Also show the data stack after each traced instruction")
}

/// JSON output (--json).
pub fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print the result as JSON")
}

/// Color output control (--color).
pub fn color_arg() -> Arg {
    Arg::new("color")
        .long("color")
        .value_name("WHEN")
        .default_value("auto")
        .value_parser(["auto", "always", "never"])
        .help("Colorize diagnostics")
}
