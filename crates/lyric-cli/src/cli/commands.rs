//! Command builders for the CLI.

use clap::Command;

use super::args::*;

/// Build the complete CLI with all subcommands.
pub fn build_cli() -> Command {
    Command::new("lyric")
        .about("Compile Lyric archetypes, inspect objects and run them")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(compile_command())
        .subcommand(dump_command())
        .subcommand(exec_command())
}

/// Compile an archetype into an object file.
pub fn compile_command() -> Command {
    Command::new("compile")
        .about("Compile an archetype into an object file")
        .override_usage(
            "\
  lyric compile <ARCHETYPE>
  lyric compile <ARCHETYPE> -o <FILE> [--location <LOCATION>]",
        )
        .after_help(
            r#"EXAMPLES:
  lyric compile app.lya                      # writes app.lyo, location /app
  lyric compile app.lya -o out/main.lyo      # explicit output
  lyric compile lib.lya --location /util/lib # explicit module location
  lyric compile app.lya --system-dir sys/    # compile against a system library"#,
        )
        .arg(archetype_path_arg())
        .arg(output_file_arg())
        .arg(location_arg())
        .arg(system_dir_arg())
        .arg(local_dir_arg())
        .arg(optimize_arg())
        .arg(color_arg())
}

/// Show the contents of an object file.
pub fn dump_command() -> Command {
    Command::new("dump")
        .about("Show object header, symbols, links and disassembled procs")
        .after_help(
            r#"EXAMPLES:
  lyric dump app.lyo"#,
        )
        .arg(object_path_arg())
}

/// Run the `$entry` call of an object file.
pub fn exec_command() -> Command {
    Command::new("exec")
        .about("Run an object file and print its result")
        .override_usage(
            "\
  lyric exec <OBJECT>
  lyric exec <OBJECT> [--system-dir <DIR>] [--local-dir <DIR>] [--fuel <N>]",
        )
        .after_help(
            r#"EXAMPLES:
  lyric exec app.lyo                         # print the result
  lyric exec app.lyo --json                  # result as JSON
  lyric exec app.lyo --trace                 # instruction trace on stderr
  lyric exec app.lyo --local-dir build/      # resolve /... imports from build/"#,
        )
        .arg(object_path_arg())
        .arg(location_arg())
        .arg(system_dir_arg())
        .arg(local_dir_arg())
        .arg(fuel_arg())
        .arg(trace_arg())
        .arg(verbose_arg())
        .arg(json_arg())
}
