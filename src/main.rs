//! markprof command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `markprof replay <snapshot>` - Rebuild and summarize recorded marks
//! - `markprof config show [path]` - Print effective settings
//! - `markprof config validate <path>` - Check a settings file (exit 0/1)

use std::path::Path;
use std::process::ExitCode;

use markprof::cli::{run_replay, run_show, run_validate, ReplayOptions};
use markprof::telemetry::{init_logging, LogConfig};

fn main() -> ExitCode {
    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging disabled: {}", e);
    }

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "replay" => match ReplayOptions::parse(&args[2..]) {
            Ok(options) => exit(run_replay(&options)),
            Err(e) => {
                eprintln!("{}", e);
                print_command_help("replay");
                ExitCode::FAILURE
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let path = args.get(3).map(Path::new);
            match (subcommand, path) {
                ("show", path) => exit(run_show(path)),
                ("validate", Some(path)) => exit(run_validate(path)),
                ("validate", None) => {
                    eprintln!("config validate requires a settings file");
                    print_command_help("config");
                    ExitCode::FAILURE
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("markprof {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "markprof - in-process invocation profiler v{}

USAGE:
    markprof [COMMAND] [OPTIONS]

COMMANDS:
    replay       Replay a snapshot file and print per-mark totals
    config       Inspect profiler settings (show, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    markprof replay marks.bin            # Totals per mark
    markprof replay marks.bin --tree     # Totals plus invocation trees
    markprof config show                 # Effective settings
    markprof config validate my.properties

ENVIRONMENT:
    MARKPROF_CONFIG      Settings file (default: markprof.properties)
    MARKPROF_OUTPUT      Snapshot file used by start_recording_from_env
    MARKPROF_LOG         Log filter (default: warn)
    MARKPROF_LOG_FORMAT  Log format: pretty or json

EXIT CODES:
    0  Success
    1  Failure / invalid input
    2  Snapshot replayed partially
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "replay" => {
            eprintln!(
                "markprof replay - Rebuild invocation trees from a snapshot

USAGE:
    markprof replay <SNAPSHOT> [OPTIONS]

OPTIONS:
    --tree             Also print every invocation tree
    --json             Print totals as JSON
    --settings FILE    Apply include/exclude settings while replaying

DESCRIPTION:
    Reads mark events and tree collections written by a recording session.
    A '<SNAPSHOT>.count' file next to the snapshot enables progress logging.
"
            );
        }
        "config" => {
            eprintln!(
                "markprof config - Inspect profiler settings

USAGE:
    markprof config show [FILE]
    markprof config validate FILE

DESCRIPTION:
    'show' prints settings in property format, from FILE or the discovered
    settings file. 'validate' reports every invalid line and exits 1 if any.
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}
