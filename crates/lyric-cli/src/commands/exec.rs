use std::fs;
use std::path::PathBuf;

use lyric_object::MemoryLoader;
use lyric_runtime::{
    BytecodeInterpreter, DataCell, Inspector, InterpreterError, PrintInspector, Verbosity,
};
use serde::Serialize;
use serde_json::Value;

use super::error::{CliError, Result};
use super::modules::{module_location, runtime_loader};

pub struct ExecArgs {
    pub object_path: PathBuf,
    pub location: Option<String>,
    pub system_dir: Option<PathBuf>,
    pub local_dir: Option<PathBuf>,
    pub fuel: u64,
    pub trace: bool,
    pub verbose: bool,
    pub json: bool,
}

/// A result value, rendered while its heap was still alive.
#[derive(Debug)]
pub struct ExecValue {
    pub text: String,
    pub json: Value,
}

#[derive(Debug)]
pub struct ExecReport {
    pub outcome: std::result::Result<ExecValue, InterpreterError>,
    pub instructions: u64,
    pub trace: Option<String>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    instructions: u64,
}

impl ExecReport {
    pub fn to_json(&self) -> Value {
        let (result, error) = match &self.outcome {
            Ok(value) => (Some(&value.json), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let report = JsonReport {
            result,
            error,
            instructions: self.instructions,
        };
        serde_json::to_value(report).unwrap_or(Value::Null)
    }
}

pub fn run(args: ExecArgs) {
    let report = match execute(&args) {
        Ok(report) => report,
        Err(err) => err.exit(),
    };

    if let Some(trace) = &report.trace {
        eprintln!("{trace}");
    }

    if args.json {
        match serde_json::to_string_pretty(&report.to_json()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: JSON serialization failed: {e}");
                std::process::exit(1);
            }
        }
        if report.outcome.is_err() {
            std::process::exit(1);
        }
        return;
    }

    match report.outcome {
        Ok(value) => println!("{}", value.text),
        Err(err) => CliError::from(err).exit(),
    }
}

/// Load the object and run its `$entry` call to completion.
///
/// Errors before execution starts (unreadable file, bad object, missing
/// `$entry`) are returned as `Err`; errors during execution end up in
/// [`ExecReport::outcome`] next to the trace that led to them.
pub fn execute(args: &ExecArgs) -> Result<ExecReport> {
    let bytes = fs::read(&args.object_path).map_err(|source| CliError::Read {
        path: args.object_path.display().to_string(),
        source,
    })?;
    let location = module_location(args.location.as_deref(), &args.object_path)?;
    let main = MemoryLoader::new().with_module(location.clone(), bytes);
    let loader = runtime_loader(main, args.system_dir.as_deref(), args.local_dir.as_deref())?;

    let builder = BytecodeInterpreter::builder(loader, location).exec_fuel(args.fuel);
    if args.trace {
        let verbosity = if args.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Default
        };
        let interpreter = builder
            .inspector(PrintInspector::new().verbosity(verbosity))
            .build()?;
        Ok(finish(interpreter, |inspector| Some(inspector.output())))
    } else {
        Ok(finish(builder.build()?, |_| None))
    }
}

fn finish<I: Inspector>(
    mut interpreter: BytecodeInterpreter<I>,
    trace: impl FnOnce(&I) -> Option<String>,
) -> ExecReport {
    let outcome = interpreter.run_until_done().map(|value| ExecValue {
        text: value.to_string(),
        json: to_json(&value),
    });
    // a failed unload only matters when the program itself succeeded
    let outcome = match (outcome, interpreter.shutdown()) {
        (Ok(_), Err(err)) => Err(err),
        (outcome, _) => outcome,
    };
    ExecReport {
        outcome,
        instructions: interpreter.instruction_count(),
        trace: trace(interpreter.inspector()),
    }
}

/// JSON form of a result; values without one are rendered as text.
pub fn to_json(value: &DataCell) -> Value {
    match value {
        DataCell::Nil | DataCell::Undef => Value::Null,
        DataCell::Bool(b) => Value::Bool(*b),
        DataCell::I64(i) => Value::from(*i),
        DataCell::Dbl(d) => serde_json::Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        DataCell::Chr(c) => Value::String(c.to_string()),
        other => match other.utf8_value() {
            Some(text) => Value::String(text),
            None => Value::String(other.to_string()),
        },
    }
}
